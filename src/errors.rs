//! The typed Alpaca error taxonomy (§3, §7).
//!
//! A closed, `Copy` error-code enumeration (`ASCOMErrorCode`) plus a
//! message, and the coarser `ErrorKind` workflows and tasks match on.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use thiserror::Error;

/// A closed enumeration of Alpaca/ASCOM error codes relevant to this core,
/// plus the transport-level kinds the spec adds (`NetworkError`,
/// `ParseError`, `TimeoutError`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ASCOMErrorCode(u32);

macro_rules! error_codes {
    ($(#[doc = $doc:literal] $name:ident = $value:literal,)*) => {
        impl ASCOMErrorCode {
            $(
                #[doc = $doc]
                pub const $name: Self = Self($value);
            )*
        }

        impl std::fmt::Display for ASCOMErrorCode {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match *self {
                    $(Self::$name => f.write_str(stringify!($name)),)*
                    Self(raw) => write!(f, "{raw:#X}"),
                }
            }
        }
    };
}

error_codes! {
    /// No error; call succeeded.
    OK = 0,
    /// `InvalidValue` — 0x401.
    INVALID_VALUE = 0x401,
    /// `ValueNotSet` — 0x402.
    VALUE_NOT_SET = 0x402,
    /// `NotConnected` — 0x407.
    NOT_CONNECTED = 0x407,
    /// `InvalidWhileParked` — 0x408.
    INVALID_WHILE_PARKED = 0x408,
    /// `InvalidWhileSlaved` — 0x409.
    INVALID_WHILE_SLAVED = 0x409,
    /// `InvalidOperation` — 0x40B.
    INVALID_OPERATION = 0x40B,
    /// `ActionNotImplemented` — 0x40C.
    ACTION_NOT_IMPLEMENTED = 0x40C,
    /// Catch-all for server errors reported as HTTP 500 with no more specific code.
    UNSPECIFIED = 0x500,
}

/// A device- or transport-level Alpaca error: a code plus a message.
#[derive(Debug, Clone, Serialize, Deserialize, Error)]
#[error("ASCOM error {code}: {message}")]
pub struct ASCOMError {
    /// The numeric error code, `ErrorNumber` in the wire envelope.
    pub code: ASCOMErrorCode,
    /// The human-readable message, `ErrorMessage` in the wire envelope.
    pub message: Cow<'static, str>,
}

impl ASCOMError {
    /// Construct an error with the given code and message.
    pub fn new(code: ASCOMErrorCode, message: impl std::fmt::Display) -> Self {
        Self {
            code,
            message: message.to_string().into(),
        }
    }

    pub(crate) fn unspecified(message: impl std::fmt::Display) -> Self {
        Self::new(ASCOMErrorCode::UNSPECIFIED, message)
    }
}

/// The closed `ErrorKind` enumeration from §3, distinguishing device-level
/// Alpaca errors from transport-level failures that never reach the wire
/// envelope at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The call succeeded.
    Success,
    /// `ErrorNumber == 0x401`.
    InvalidValue,
    /// `ErrorNumber == 0x402`.
    ValueNotSet,
    /// `ErrorNumber == 0x407`.
    NotConnected,
    /// `ErrorNumber == 0x408`.
    InvalidWhileParked,
    /// `ErrorNumber == 0x409`.
    InvalidWhileSlaved,
    /// `ErrorNumber == 0x40B`.
    InvalidOperation,
    /// `ErrorNumber == 0x40C`.
    ActionNotImplemented,
    /// `ErrorNumber` nonzero but not one of the above.
    UnspecifiedError,
    /// Request never produced a well-formed HTTP response (connect/dial
    /// failure, socket reset, TLS handshake failure, pool exhaustion).
    NetworkError,
    /// HTTP response body could not be parsed as the expected envelope.
    ParseError,
    /// The request's own deadline elapsed before a response arrived.
    TimeoutError,
}

impl ErrorKind {
    /// Maps an HTTP status code to an `ErrorKind` using the fixed table in
    /// §3: `200 -> Success, 400 -> InvalidValue, 404 -> ActionNotImplemented,
    /// 408 -> TimeoutError, 500 -> UnspecifiedError`, anything else is a
    /// `NetworkError`.
    #[must_use]
    pub const fn from_http_status(status: u16) -> Self {
        match status {
            200 => Self::Success,
            400 => Self::InvalidValue,
            404 => Self::ActionNotImplemented,
            408 => Self::TimeoutError,
            500 => Self::UnspecifiedError,
            _ => Self::NetworkError,
        }
    }

    /// Maps a nonzero Alpaca `ErrorNumber` to the closed subset of
    /// device-level `ErrorKind` variants. Unknown nonzero codes collapse to
    /// `UnspecifiedError`.
    #[must_use]
    pub const fn from_error_number(error_number: u32) -> Self {
        match error_number {
            0 => Self::Success,
            0x401 => Self::InvalidValue,
            0x402 => Self::ValueNotSet,
            0x407 => Self::NotConnected,
            0x408 => Self::InvalidWhileParked,
            0x409 => Self::InvalidWhileSlaved,
            0x40B => Self::InvalidOperation,
            0x40C => Self::ActionNotImplemented,
            _ => Self::UnspecifiedError,
        }
    }

    /// Whether this kind represents a successful call.
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

impl From<ErrorKind> for ASCOMError {
    fn from(kind: ErrorKind) -> Self {
        let code = match kind {
            ErrorKind::Success => ASCOMErrorCode::OK,
            ErrorKind::InvalidValue => ASCOMErrorCode::INVALID_VALUE,
            ErrorKind::ValueNotSet => ASCOMErrorCode::VALUE_NOT_SET,
            ErrorKind::NotConnected => ASCOMErrorCode::NOT_CONNECTED,
            ErrorKind::InvalidWhileParked => ASCOMErrorCode::INVALID_WHILE_PARKED,
            ErrorKind::InvalidWhileSlaved => ASCOMErrorCode::INVALID_WHILE_SLAVED,
            ErrorKind::InvalidOperation => ASCOMErrorCode::INVALID_OPERATION,
            ErrorKind::ActionNotImplemented => ASCOMErrorCode::ACTION_NOT_IMPLEMENTED,
            ErrorKind::UnspecifiedError
            | ErrorKind::NetworkError
            | ErrorKind::ParseError
            | ErrorKind::TimeoutError => ASCOMErrorCode::UNSPECIFIED,
        };
        Self::new(code, kind)
    }
}
