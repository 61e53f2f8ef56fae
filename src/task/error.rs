//! The task error taxonomy (§7).

use thiserror::Error;

/// The closed kind a task failure is classified under (§7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskErrorKind {
    /// Task inputs failed schema validation.
    InvalidParameter,
    /// An Alpaca/PHD2 call failed with a device- or transport-level error.
    DeviceError,
    /// The task's own deadline expired, or an explicit per-operation timeout.
    TimeoutError,
    /// A precondition/invariant failure not attributable to a single call.
    SystemError,
    /// A required process-wide resource was absent.
    DependencyError,
}

/// A task failure: its kind plus a human-readable message (§7
/// "Propagation").
#[derive(Debug, Clone, Error)]
#[error("{kind:?}: {message}")]
pub struct TaskError {
    pub kind: TaskErrorKind,
    pub message: String,
}

impl TaskError {
    pub fn new(kind: TaskErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<crate::errors::ErrorKind> for TaskError {
    fn from(kind: crate::errors::ErrorKind) -> Self {
        Self::new(TaskErrorKind::DeviceError, kind.to_string())
    }
}

impl From<crate::phd2::Phd2Error> for TaskError {
    fn from(error: crate::phd2::Phd2Error) -> Self {
        let kind = match error {
            crate::phd2::Phd2Error::Timeout(_) => TaskErrorKind::TimeoutError,
            _ => TaskErrorKind::DeviceError,
        };
        Self::new(kind, error.to_string())
    }
}
