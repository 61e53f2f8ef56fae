//! The Alpaca transport (§4.2): turns one logical operation into exactly
//! one HTTP round-trip over a pooled stream, with Alpaca v1 URL/form
//! framing, transaction-id accounting and response-time metrics.

use crate::alpaca::pool::Pool;
use crate::alpaca::transaction::TransactionCounter;
use crate::config::AlpacaClientConfig;
use crate::errors::ErrorKind;
use serde_json::Value;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// HTTP verb used for an Alpaca request: `GET` for property reads, `PUT`
/// for property writes and method invocations (§4.2, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Get,
    Put,
}

impl Verb {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Put => "PUT",
        }
    }
}

/// A single untyped request parameter, already in its wire representation.
#[derive(Debug, Clone)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl ParamValue {
    /// Form-encodes the value per §4.2: booleans lowercased, integers
    /// decimal, floats fixed to 6 decimal places, everything else as a
    /// string.
    fn encode(&self) -> String {
        match self {
            Self::Bool(value) => value.to_string(),
            Self::Int(value) => value.to_string(),
            Self::Float(value) => format!("{value:.6}"),
            Self::Str(value) => value.clone(),
        }
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}
impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}
impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}
impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}
impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}
impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_owned())
    }
}

/// A decoded Alpaca response (§3 `AlpacaResponse`).
#[derive(Debug, Clone)]
pub struct AlpacaResponse {
    pub value: Value,
    pub client_transaction_id: u32,
    pub server_transaction_id: Option<u32>,
    pub timestamp: SystemTime,
    pub error_number: u32,
    pub error_message: String,
}

impl AlpacaResponse {
    /// Whether the JSON envelope itself reports a nonzero `ErrorNumber`.
    #[must_use]
    pub fn has_error(&self) -> bool {
        self.error_number != 0
    }

    /// The device-level [`ErrorKind`] this response carries, `Success` if
    /// `ErrorNumber == 0`.
    #[must_use]
    pub fn error_kind(&self) -> ErrorKind {
        ErrorKind::from_error_number(self.error_number)
    }

    /// Extracts and coerces the `Value` field, reporting the body-level
    /// error if one is present (§4.2 "tie-breaks").
    pub fn extract<T: serde::de::DeserializeOwned>(&self) -> Result<T, ErrorKind> {
        if self.has_error() {
            return Err(self.error_kind());
        }
        serde_json::from_value(self.value.clone()).map_err(|_| ErrorKind::ParseError)
    }
}

/// Running request/response metrics, updated atomically on every request
/// (§4.2 "Response rules").
#[derive(Debug, Default)]
pub struct Metrics {
    pub requests_sent: AtomicU64,
    pub requests_successful: AtomicU64,
    pub bytes_sent: AtomicU64,
    pub bytes_received: AtomicU64,
    avg_response_time_micros: AtomicU64,
}

impl Metrics {
    fn record(&self, sent: u64, received: u64, success: bool, elapsed: Duration) {
        self.requests_sent.fetch_add(1, Ordering::Relaxed);
        if success {
            self.requests_successful.fetch_add(1, Ordering::Relaxed);
        }
        self.bytes_sent.fetch_add(sent, Ordering::Relaxed);
        self.bytes_received.fetch_add(received, Ordering::Relaxed);

        let sample = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        // EWMA per §4.2: avg <- (7*avg + sample) / 8.
        let _ = self
            .avg_response_time_micros
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |avg| {
                Some((7 * avg + sample) / 8)
            });
    }

    /// The current exponentially-weighted moving average response time.
    #[must_use]
    pub fn avg_response_time(&self) -> Duration {
        Duration::from_micros(self.avg_response_time_micros.load(Ordering::Relaxed))
    }
}

/// Builds Alpaca URLs and form bodies and drives one request over a
/// pooled stream (§4.2).
pub struct Transport {
    pool: Arc<Pool>,
    config: AlpacaClientConfig,
    transaction_counter: TransactionCounter,
    client_id: u32,
    pub metrics: Metrics,
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

impl Transport {
    #[must_use]
    pub fn new(config: AlpacaClientConfig) -> Self {
        Self {
            pool: Pool::new(config.max_connections, config.enable_ssl_verification),
            client_id: rand::random(),
            config,
            transaction_counter: TransactionCounter::new(),
            metrics: Metrics::default(),
        }
    }

    /// Sends one request and returns the decoded response (§4.2).
    ///
    /// `path` is the Alpaca API path after `/api/v3/`, e.g.
    /// `telescope/0/slewtocoordinates`.
    #[tracing::instrument(skip(self, params), fields(client_transaction_id))]
    pub async fn perform_request(
        &self,
        host: &str,
        port: u16,
        tls: bool,
        verb: Verb,
        path: &str,
        params: &[(&str, ParamValue)],
    ) -> Result<AlpacaResponse, ErrorKind> {
        let client_transaction_id = self.transaction_counter.next();
        tracing::Span::current().record("client_transaction_id", client_transaction_id);

        let mut form = format!(
            "ClientID={}&ClientTransactionID={}",
            self.client_id, client_transaction_id
        );
        for (key, value) in params {
            let _ = write!(
                form,
                "&{}={}",
                urlencode(key),
                urlencode(&value.encode())
            );
        }

        let (request_line_path, body) = match verb {
            Verb::Get => (format!("/api/v3/{path}?{form}"), String::new()),
            Verb::Put => (format!("/api/v3/{path}"), form),
        };

        let mut request = format!(
            "{method} {request_line_path} HTTP/1.1\r\n\
             Host: {host}\r\n\
             User-Agent: {user_agent}\r\n\
             Content-Type: application/x-www-form-urlencoded\r\n",
            method = verb.as_str(),
            user_agent = self.config.user_agent,
        );
        if self.config.enable_compression {
            request.push_str("Accept-Encoding: gzip, deflate\r\n");
        }
        if self.config.keep_alive {
            request.push_str("Connection: keep-alive\r\n");
        } else {
            request.push_str("Connection: close\r\n");
        }
        if verb == Verb::Put {
            let _ = write!(request, "Content-Length: {}\r\n", body.len());
        }
        request.push_str("\r\n");
        request.push_str(&body);

        let started = Instant::now();
        let timeout = self.config.timeout;
        let result = tokio::time::timeout(timeout, self.round_trip(host, port, tls, &request)).await;

        let outcome = match result {
            Ok(inner) => inner,
            Err(_) => Err(ErrorKind::TimeoutError),
        };

        let sent = u64::try_from(request.len()).unwrap_or(u64::MAX);
        match &outcome {
            Ok((response, received_bytes)) => {
                self.metrics.record(
                    sent,
                    *received_bytes,
                    response.error_kind().is_success(),
                    started.elapsed(),
                );
            }
            Err(_) => {
                self.metrics.record(sent, 0, false, started.elapsed());
            }
        }

        outcome.map(|(response, _)| response)
    }

    async fn round_trip(
        &self,
        host: &str,
        port: u16,
        tls: bool,
        request: &str,
    ) -> Result<(AlpacaResponse, u64), ErrorKind> {
        let (status, _content_type, headers_len, body) =
            self.raw_round_trip(host, port, tls, request).await?;

        let error_kind = ErrorKind::from_http_status(status);
        if !matches!(error_kind, ErrorKind::Success) {
            return Err(error_kind);
        }

        let value: Value = serde_json::from_slice(&body).map_err(|_| ErrorKind::ParseError)?;
        let response = decode_envelope(value)?;

        let total_bytes = u64::try_from(headers_len + body.len()).unwrap_or(u64::MAX);
        Ok((response, total_bytes))
    }

    async fn raw_round_trip(
        &self,
        host: &str,
        port: u16,
        tls: bool,
        request: &str,
    ) -> Result<(u16, String, usize, Vec<u8>), ErrorKind> {
        let mut stream = self.pool.acquire(host, port, tls).await?;

        let write_result = stream.conn_mut().write_all(request.as_bytes()).await;
        if write_result.is_err() {
            // Dirty stream; do not return it to the pool.
            return Err(ErrorKind::NetworkError);
        }

        let (status, content_type, headers_len, body) =
            match read_http_response(stream.conn_mut()).await {
                Ok(parsed) => parsed,
                Err(kind) => return Err(kind),
            };

        self.pool.release(stream).await;

        Ok((status, content_type, headers_len, body))
    }

    /// Performs a GET and returns the raw status, `Content-Type` header
    /// and body, bypassing JSON-envelope decoding. Used by the image-array
    /// codec (§4.4), which must branch on whether the server replied with
    /// `application/imagebytes` or a JSON `Value` array.
    pub(crate) async fn perform_raw_get(
        &self,
        host: &str,
        port: u16,
        tls: bool,
        path: &str,
    ) -> Result<(String, Vec<u8>), ErrorKind> {
        let client_transaction_id = self.transaction_counter.next();
        let form = format!(
            "ClientID={}&ClientTransactionID={}",
            self.client_id, client_transaction_id
        );
        let request = format!(
            "GET /api/v3/{path}?{form} HTTP/1.1\r\n\
             Host: {host}\r\n\
             User-Agent: {user_agent}\r\n\
             Connection: keep-alive\r\n\
             \r\n",
            user_agent = self.config.user_agent,
        );

        let started = Instant::now();
        let result = tokio::time::timeout(
            self.config.timeout,
            self.raw_round_trip(host, port, tls, &request),
        )
        .await;

        let outcome = match result {
            Ok(inner) => inner,
            Err(_) => Err(ErrorKind::TimeoutError),
        };

        let sent = u64::try_from(request.len()).unwrap_or(u64::MAX);
        match &outcome {
            Ok((status, _, headers_len, body)) => {
                let received = u64::try_from(headers_len + body.len()).unwrap_or(u64::MAX);
                self.metrics.record(
                    sent,
                    received,
                    ErrorKind::from_http_status(*status).is_success(),
                    started.elapsed(),
                );
            }
            Err(_) => self.metrics.record(sent, 0, false, started.elapsed()),
        }

        let (status, content_type, _headers_len, body) = outcome?;
        let error_kind = ErrorKind::from_http_status(status);
        if !matches!(error_kind, ErrorKind::Success) {
            return Err(error_kind);
        }
        Ok((content_type, body))
    }
}

fn decode_envelope(value: Value) -> Result<AlpacaResponse, ErrorKind> {
    let object = value.as_object().ok_or(ErrorKind::ParseError)?;
    let error_number = object
        .get("ErrorNumber")
        .and_then(Value::as_u64)
        .unwrap_or(0);
    let error_message = object
        .get("ErrorMessage")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned();
    let client_transaction_id = object
        .get("ClientTransactionID")
        .and_then(Value::as_u64)
        .and_then(|id| u32::try_from(id).ok())
        .unwrap_or(0);
    let server_transaction_id = object
        .get("ServerTransactionID")
        .and_then(Value::as_u64)
        .and_then(|id| u32::try_from(id).ok());
    let inner_value = object.get("Value").cloned().unwrap_or(Value::Null);

    Ok(AlpacaResponse {
        value: inner_value,
        client_transaction_id,
        server_transaction_id,
        timestamp: SystemTime::now(),
        error_number: u32::try_from(error_number).unwrap_or(u32::MAX),
        error_message,
    })
}

/// Reads an HTTP/1.1 response off `conn`: header section parsed with
/// `httparse`, body read per `Content-Length` (§4.2's "level of the
/// original's libcurl-based client", ported to a hand-rolled reader).
async fn read_http_response<S: AsyncReadExt + Unpin>(
    conn: &mut S,
) -> Result<(u16, String, usize, Vec<u8>), ErrorKind> {
    let mut buf = Vec::with_capacity(4096);
    let mut chunk = [0_u8; 4096];
    let headers_end = loop {
        let read = conn.read(&mut chunk).await.map_err(|_| ErrorKind::NetworkError)?;
        if read == 0 {
            return Err(ErrorKind::NetworkError);
        }
        buf.extend_from_slice(&chunk[..read]);

        let mut headers = [httparse::EMPTY_HEADER; 32];
        let mut response = httparse::Response::new(&mut headers);
        match response.parse(&buf).map_err(|_| ErrorKind::ParseError)? {
            httparse::Status::Complete(offset) => break offset,
            httparse::Status::Partial => {
                if buf.len() > 64 * 1024 {
                    return Err(ErrorKind::ParseError);
                }
            }
        }
    };

    let mut headers = [httparse::EMPTY_HEADER; 32];
    let mut response = httparse::Response::new(&mut headers);
    let _ = response.parse(&buf).map_err(|_| ErrorKind::ParseError)?;
    let status = response.code.ok_or(ErrorKind::ParseError)?;
    let content_length = response
        .headers
        .iter()
        .find(|header| header.name.eq_ignore_ascii_case("content-length"))
        .and_then(|header| std::str::from_utf8(header.value).ok())
        .and_then(|value| value.trim().parse::<usize>().ok())
        .unwrap_or(0);
    let content_type = response
        .headers
        .iter()
        .find(|header| header.name.eq_ignore_ascii_case("content-type"))
        .and_then(|header| std::str::from_utf8(header.value).ok())
        .unwrap_or("application/json")
        .to_owned();

    let mut body = buf[headers_end..].to_vec();
    while body.len() < content_length {
        let read = conn.read(&mut chunk).await.map_err(|_| ErrorKind::NetworkError)?;
        if read == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..read]);
    }
    if content_length > 0 && body.len() > content_length {
        body.truncate(content_length);
    }

    Ok((status, content_type, headers_end, body))
}

/// Percent-encodes per the RFC 3986 unreserved set (§4.2).
fn urlencode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(char::from(byte));
            }
            _ => {
                let _ = write!(out, "%{byte:02X}");
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urlencode_preserves_unreserved() {
        assert_eq!(urlencode("abcXYZ019-_.~"), "abcXYZ019-_.~");
        assert_eq!(urlencode("12.5 45.0"), "12.5%2045.0");
    }

    #[test]
    fn float_param_formats_six_decimals() {
        let value: ParamValue = 12.5_f64.into();
        assert_eq!(value.encode(), "12.500000");
    }

    #[test]
    fn bool_param_lowercased() {
        let value: ParamValue = true.into();
        assert_eq!(value.encode(), "true");
    }

    #[test]
    fn status_mapping_matches_fixed_table() {
        assert_eq!(ErrorKind::from_http_status(200), ErrorKind::Success);
        assert_eq!(ErrorKind::from_http_status(400), ErrorKind::InvalidValue);
        assert_eq!(
            ErrorKind::from_http_status(404),
            ErrorKind::ActionNotImplemented
        );
        assert_eq!(ErrorKind::from_http_status(408), ErrorKind::TimeoutError);
        assert_eq!(
            ErrorKind::from_http_status(500),
            ErrorKind::UnspecifiedError
        );
        assert_eq!(ErrorKind::from_http_status(502), ErrorKind::NetworkError);
    }
}
