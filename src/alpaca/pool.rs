//! The HTTP connection pool (§4.1): keep-alive `(host, port, tls)`-keyed
//! `TcpStream`/`TlsStream` reuse.
//!
//! Hand-rolled rather than delegated to an HTTP client crate's own pool —
//! the whole point of this layer is the explicit, testable contract in §8
//! (invariant 2: the pool never exceeds `max_connections` idle entries
//! after a reap pass).

use crate::errors::ErrorKind;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

/// A stream's key in the pool: remote endpoint plus whether it's TLS.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct StreamKey {
    pub(crate) host: String,
    pub(crate) port: u16,
    pub(crate) tls: bool,
}

/// Either side of the plain/TLS split, behind one `AsyncRead`/`AsyncWrite`
/// surface so the transport layer never has to branch on it.
pub(crate) enum RawConnection {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl RawConnection {
    fn tcp_ref(&self) -> &TcpStream {
        match self {
            Self::Plain(stream) => stream,
            Self::Tls(stream) => stream.get_ref().0,
        }
    }

    /// Best-effort liveness probe: a stream whose peer has sent EOF is
    /// stale (§4.1 point 2 of the liveness check). A `WouldBlock` result
    /// means no data is waiting, which is the expected steady state for an
    /// idle keep-alive connection, so it counts as open.
    fn is_open(&self) -> bool {
        let mut probe = [0_u8; 1];
        match self.tcp_ref().try_read(&mut probe) {
            Ok(0) => false,
            Ok(_) => true,
            Err(err) => err.kind() == io::ErrorKind::WouldBlock,
        }
    }
}

impl AsyncRead for RawConnection {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            Self::Tls(stream) => Pin::new(stream.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for RawConnection {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_write(cx, buf),
            Self::Tls(stream) => Pin::new(stream.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_flush(cx),
            Self::Tls(stream) => Pin::new(stream.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            Self::Tls(stream) => Pin::new(stream.as_mut()).poll_shutdown(cx),
        }
    }
}

/// An in-flight or idle keep-alive stream (§3 `PooledStream`).
pub(crate) struct PooledStream {
    pub(crate) key: StreamKey,
    conn: RawConnection,
    last_used: Instant,
}

impl PooledStream {
    pub(crate) fn conn_mut(&mut self) -> &mut RawConnection {
        &mut self.conn
    }

    fn is_stale(&self, max_age: Duration) -> bool {
        self.last_used.elapsed() > max_age || !self.conn.is_open()
    }
}

/// The shared mutable pool of idle streams (§5 "shared resources"). Only
/// idle streams live here; an acquired stream is owned by its caller until
/// [`Pool::release`] returns it.
pub struct Pool {
    idle: Mutex<Vec<PooledStream>>,
    max_connections: usize,
    max_idle_age: Duration,
    enable_ssl_verification: bool,
}

/// Stale-entry lifetime before a reap pass retires an idle stream (§3).
pub const MAX_IDLE_AGE: Duration = Duration::from_secs(5 * 60);

impl Pool {
    #[must_use]
    pub fn new(max_connections: usize, enable_ssl_verification: bool) -> Arc<Self> {
        Arc::new(Self {
            idle: Mutex::new(Vec::new()),
            max_connections,
            max_idle_age: MAX_IDLE_AGE,
            enable_ssl_verification,
        })
    }

    /// Acquire a stream matching `(host, port, tls)`: an existing live idle
    /// entry if one exists, otherwise a freshly dialed one (§4.1 algorithm).
    pub(crate) async fn acquire(
        self: &Arc<Self>,
        host: &str,
        port: u16,
        tls: bool,
    ) -> Result<PooledStream, ErrorKind> {
        let key = StreamKey {
            host: host.to_owned(),
            port,
            tls,
        };

        {
            let mut idle = self.idle.lock().await;

            // Reap pass: drop idle entries past their liveness window first.
            idle.retain(|stream| !stream.is_stale(self.max_idle_age));

            if let Some(index) = idle.iter().position(|stream| stream.key == key) {
                return Ok(idle.remove(index));
            }
        }

        // Below cap, or at cap with nothing idle: dial a fresh stream. The
        // caller's own concurrency ceiling (not this pool) bounds parallelism.
        let conn = dial(&key, self.enable_ssl_verification).await?;
        Ok(PooledStream {
            key,
            conn,
            last_used: Instant::now(),
        })
    }

    /// Return a stream to the idle set, refreshing its last-use timestamp.
    pub(crate) async fn release(self: &Arc<Self>, mut stream: PooledStream) {
        stream.last_used = Instant::now();
        let mut idle = self.idle.lock().await;
        if idle.len() >= self.max_connections {
            idle.retain(|stream| !stream.is_stale(self.max_idle_age));
        }
        idle.push(stream);
    }

    /// Number of idle entries currently held, for tests exercising
    /// invariant 2 (§8).
    #[cfg(test)]
    pub(crate) async fn idle_count(self: &Arc<Self>) -> usize {
        self.idle.lock().await.len()
    }
}

async fn dial(key: &StreamKey, enable_ssl_verification: bool) -> Result<RawConnection, ErrorKind> {
    let tcp = TcpStream::connect((key.host.as_str(), key.port))
        .await
        .map_err(|_| ErrorKind::NetworkError)?;
    if !key.tls {
        return Ok(RawConnection::Plain(tcp));
    }

    let tls_config = if enable_ssl_verification {
        let root_store = rustls_native_certs::load_native_certs()
            .certs
            .into_iter()
            .fold(rustls::RootCertStore::empty(), |mut store, cert| {
                let _ = store.add(cert);
                store
            });
        rustls::ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth()
    } else {
        rustls::ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoCertVerification))
            .with_no_client_auth()
    };
    let connector = TlsConnector::from(Arc::new(tls_config));
    let server_name = rustls_pki_types::ServerName::try_from(key.host.clone())
        .map_err(|_| ErrorKind::NetworkError)?;
    let tls_stream = connector
        .connect(server_name, tcp)
        .await
        .map_err(|_| ErrorKind::NetworkError)?;
    Ok(RawConnection::Tls(Box::new(tls_stream)))
}

/// Accepts any server certificate unconditionally. Wired in only when
/// `AlpacaClientConfig::enable_ssl_verification` is `false` — a caller
/// opting out of verification for a self-signed device endpoint on a
/// trusted local network, not a default.
#[derive(Debug)]
struct NoCertVerification;

impl rustls::client::danger::ServerCertVerifier for NoCertVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls_pki_types::CertificateDer<'_>,
        _intermediates: &[rustls_pki_types::CertificateDer<'_>],
        _server_name: &rustls_pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls_pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls_pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls_pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}
