//! Plain, already-parsed configuration structs for the Alpaca and PHD2
//! clients (§6 "Configuration inputs"). Parsing these from a file or the
//! environment is out of scope for the core; callers construct them in
//! code and pass them in.

use std::time::Duration;

/// Configuration for the Alpaca HTTP stack: pool, transport and retry
/// knobs. Numeric defaults match those named throughout §4.
#[derive(Debug, Clone)]
pub struct AlpacaClientConfig {
    /// `User-Agent` header sent on every request.
    pub user_agent: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Whether to keep TCP connections alive in the pool between requests.
    pub keep_alive: bool,
    /// Maximum number of pooled connections per process (§4.1).
    pub max_connections: usize,
    /// Maximum number of retries a caller should attempt for a failed
    /// request. Not enforced by the transport itself (§4.2: "creation
    /// errors are reported, not retried here").
    pub max_retries: u32,
    /// Whether to advertise `Accept-Encoding: gzip, deflate`.
    pub enable_compression: bool,
    /// Whether to verify TLS certificates when `tls` is set on a device.
    pub enable_ssl_verification: bool,
}

impl Default for AlpacaClientConfig {
    fn default() -> Self {
        Self {
            user_agent: concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_owned(),
            timeout: Duration::from_secs(10),
            keep_alive: true,
            max_connections: 10,
            max_retries: 3,
            enable_compression: false,
            enable_ssl_verification: true,
        }
    }
}

/// Configuration for the PHD2 transport: default endpoint and timeouts.
#[derive(Debug, Clone)]
pub struct Phd2ClientConfig {
    /// Default PHD2 host.
    pub host: String,
    /// Default PHD2 port, 4400 per the wire protocol (§6).
    pub port: u16,
    /// Timeout for the initial TCP dial.
    pub connect_timeout: Duration,
    /// Timeout for an individual RPC round-trip.
    pub rpc_timeout: Duration,
}

impl Default for Phd2ClientConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_owned(),
            port: 4400,
            connect_timeout: Duration::from_secs(10),
            rpc_timeout: Duration::from_secs(30),
        }
    }
}
