//! Error types shared by the future table and the scheduler.

use crate::table::FutureHandle;

/// Failure reported by an asynchronous operation.
///
/// The code space belongs to whoever performs the operation; the framework
/// only reserves `0` to mean success and never interprets other values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("operation failed with code {code}: {message}")]
pub struct OperationError {
    /// Backend-defined error code. Never `0`.
    pub code: i32,
    /// Human readable description.
    pub message: String,
}

impl OperationError {
    /// Creates a new operation error.
    ///
    /// # Panics
    ///
    /// Panics if `code` is `0`, which is reserved for success.
    #[must_use]
    #[track_caller]
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        assert_ne!(code, 0, "error code 0 is reserved for success");
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Errors returned when reading a [`Future`](crate::Future).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FutureError {
    /// The handle was never allocated, was already reclaimed, or does not
    /// name a result of the requested type.
    #[error("invalid future handle {0}")]
    InvalidHandle(FutureHandle),
    /// The operation has not completed yet.
    #[error("result is not ready")]
    ResultNotReady,
    /// The operation completed with an error.
    #[error("operation failed with code {code}: {message}")]
    OperationFailed {
        /// Backend-defined error code.
        code: i32,
        /// Human readable description.
        message: String,
    },
}

impl From<OperationError> for FutureError {
    fn from(err: OperationError) -> Self {
        Self::OperationFailed {
            code: err.code,
            message: err.message,
        }
    }
}

/// Errors returned when submitting work to a [`Scheduler`](crate::Scheduler).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ScheduleError {
    /// The scheduler is draining or stopped and accepts no new tasks.
    #[error("scheduler is stopped")]
    Stopped,
}
