//! PHD2-specific failures (§4.5-§4.6), kept distinct from the Alpaca
//! [`crate::errors::ErrorKind`] taxonomy since PHD2 speaks JSON-RPC rather
//! than the Alpaca error-number envelope.

use thiserror::Error;

/// A failure from the PHD2 transport or façade.
#[derive(Debug, Clone, Error)]
pub enum Phd2Error {
    #[error("not connected to PHD2")]
    NotConnected,

    #[error("connection to {0} failed: {1}")]
    ConnectionFailed(String, String),

    #[error("{0} timed out")]
    Timeout(String),

    #[error("PHD2 RPC error {code}: {message}")]
    Rpc { code: i32, message: String },

    #[error("a settle is already in progress")]
    SettleInProgress,

    #[error("malformed PHD2 message: {0}")]
    Parse(String),

    #[error("unexpected response shape for {0}")]
    InvalidResponse(&'static str),
}
