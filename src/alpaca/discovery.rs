//! The Alpaca discovery stub (§4.3, §9 open question 1).
//!
//! Production installations discover Alpaca devices via a UDP broadcast
//! protocol, which is out of scope for this core (§1 Non-goals). This
//! stub instead fans out short-timeout TCP connect probes across a given
//! CIDR on the conventional Alpaca port 11111 — useful for smoke-testing a
//! known subnet, not a substitute for real discovery.

use std::net::Ipv4Addr;
use std::time::Duration;
use tokio::net::TcpStream;

/// The conventional Alpaca device-server port used by the discovery
/// stub (§4.3).
pub const DEFAULT_DISCOVERY_PORT: u16 = 11111;

/// How long to wait for each probe connection before giving up.
const PROBE_TIMEOUT: Duration = Duration::from_millis(250);

/// A host that accepted a TCP connection on the discovery port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveredHost {
    pub address: Ipv4Addr,
    pub port: u16,
}

/// Fans out parallel short-timeout TCP probes across `network` (a IPv4
/// `/24` expressed as its first three octets) and returns every host that
/// accepted a connection on `port` (§4.3 `discover_devices`).
///
/// This is deliberately a stub, not Alpaca's UDP discovery protocol
/// (§9 open question 1).
pub async fn discover_devices(network: Ipv4Addr, port: u16) -> Vec<DiscoveredHost> {
    let octets = network.octets();
    let probes = (1_u8..=254).map(|host_octet| {
        let address = Ipv4Addr::new(octets[0], octets[1], octets[2], host_octet);
        async move {
            let probe = tokio::time::timeout(PROBE_TIMEOUT, TcpStream::connect((address, port)));
            match probe.await {
                Ok(Ok(_stream)) => Some(DiscoveredHost { address, port }),
                _ => None,
            }
        }
    });

    futures::future::join_all(probes)
        .await
        .into_iter()
        .flatten()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn no_hosts_on_an_address_with_nothing_listening() {
        // 192.0.2.0/24 is TEST-NET-1 (RFC 5737); nothing should ever answer.
        let found = discover_devices(Ipv4Addr::new(192, 0, 2, 0), DEFAULT_DISCOVERY_PORT).await;
        assert!(found.is_empty());
    }
}
