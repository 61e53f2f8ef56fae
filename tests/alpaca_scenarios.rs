//! End-to-end Alpaca scenarios (spec §8, E5-E6): a real Alpaca device
//! client talking HTTP/1.1 over a loopback `TcpListener` standing in for a
//! mount, the same "spin up a local listener, assert on the round trip"
//! shape the connection pool's own unit tests use.

use astro_device_plane::alpaca::{AlpacaDeviceClient, DeviceDescriptor, DeviceKind, Transport};
use astro_device_plane::config::AlpacaClientConfig;
use astro_device_plane::errors::ErrorKind;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

async fn serve_once(listener: TcpListener, error_number: u32, error_message: &str) -> String {
    let (mut socket, _) = listener.accept().await.expect("mock accept");
    let mut buf = [0_u8; 4096];
    let read = socket.read(&mut buf).await.expect("mock read");
    let request = String::from_utf8_lossy(&buf[..read]).into_owned();

    let body = format!(
        "{{\"ClientTransactionID\":1,\"ServerTransactionID\":100,\"ErrorNumber\":{error_number},\"ErrorMessage\":\"{error_message}\"}}"
    );
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
        body.len(),
        body,
    );
    socket
        .write_all(response.as_bytes())
        .await
        .expect("mock write");
    request
}

fn mount_descriptor(port: u16) -> DeviceDescriptor {
    DeviceDescriptor {
        name: "mount".to_owned(),
        kind: DeviceKind::Telescope,
        device_number: 0,
        host: "127.0.0.1".to_owned(),
        port,
        tls: false,
    }
}

#[tokio::test]
async fn e5_slew_to_coordinates_success_updates_metrics() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let server = tokio::spawn(serve_once(listener, 0, ""));

    let transport = Arc::new(Transport::new(AlpacaClientConfig::default()));
    let client = AlpacaDeviceClient::new(Arc::clone(&transport), mount_descriptor(addr.port()));

    let result = client.slew_to_coordinates(12.5, 45.0).await;
    assert!(result.is_ok(), "expected slew to succeed, got {result:?}");

    let request = server.await.expect("mock server task");
    assert!(request.starts_with("PUT /api/v3/telescope/0/slewtocoordinates"));
    assert!(request.contains("RightAscension=12.5"));
    assert!(request.contains("Declination=45"));

    assert_eq!(transport.metrics.requests_sent.load(Ordering::Relaxed), 1);
    assert_eq!(
        transport.metrics.requests_successful.load(Ordering::Relaxed),
        1
    );
}

#[tokio::test]
async fn e6_slew_while_parked_reports_invalid_while_parked_without_retry() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let server = tokio::spawn(serve_once(listener, 0x408, "Invalid while parked"));

    let transport = Arc::new(Transport::new(AlpacaClientConfig::default()));
    let client = AlpacaDeviceClient::new(Arc::clone(&transport), mount_descriptor(addr.port()));

    let result = client.slew_to_coordinates(12.5, 45.0).await;
    assert_eq!(result, Err(ErrorKind::InvalidWhileParked));

    server.await.expect("mock server task");

    // The pool/transport layer never retries a well-formed device-level
    // error on its own (§4.2); exactly one request reached the wire.
    assert_eq!(transport.metrics.requests_sent.load(Ordering::Relaxed), 1);
}
