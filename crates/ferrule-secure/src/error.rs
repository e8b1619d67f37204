//! Storage errors and the numeric codes futures carry for them.

use std::io;

use ferrule::OperationError;

/// Error codes delivered through a failed [`Future`](ferrule::Future).
///
/// Read them back with [`Future::error`](ferrule::Future::error) and
/// [`SecureErrorCode::from_i32`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum SecureErrorCode {
    /// Nothing is stored under the requested app name.
    NoEntry = 1,
    /// The request was rejected before reaching the backend.
    InvalidArgument = 2,
    /// The backend failed to read or write.
    Backend = 3,
    /// Stored data could not be decoded.
    InvalidData = 4,
    /// The manager's scheduler no longer accepts work.
    Unavailable = 5,
}

impl SecureErrorCode {
    /// Returns the raw code.
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self as i32
    }

    /// Maps a raw code back, if it is one of ours.
    #[must_use]
    pub const fn from_i32(code: i32) -> Option<Self> {
        match code {
            1 => Some(Self::NoEntry),
            2 => Some(Self::InvalidArgument),
            3 => Some(Self::Backend),
            4 => Some(Self::InvalidData),
            5 => Some(Self::Unavailable),
            _ => None,
        }
    }

    pub(crate) fn error(self, message: impl Into<String>) -> OperationError {
        OperationError::new(self.as_i32(), message)
    }
}

/// Failure reported by a [`SecureStore`](crate::SecureStore) backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Nothing is stored under the key.
    #[error("no data stored under {0:?}")]
    NotFound(String),
    /// The key cannot be stored by this backend.
    #[error("invalid key {key:?}: {reason}")]
    InvalidKey {
        /// The rejected key.
        key: String,
        /// Why it was rejected.
        reason: &'static str,
    },
    /// The stored bytes are not valid user data.
    #[error("stored data is invalid: {0}")]
    InvalidData(String),
    /// The underlying filesystem operation failed.
    #[error("storage I/O failed: {0}")]
    Io(#[from] io::Error),
}

impl StoreError {
    /// Returns the code this error is reported with.
    #[must_use]
    pub const fn code(&self) -> SecureErrorCode {
        match self {
            Self::NotFound(_) => SecureErrorCode::NoEntry,
            Self::InvalidKey { .. } => SecureErrorCode::InvalidArgument,
            Self::InvalidData(_) => SecureErrorCode::InvalidData,
            Self::Io(_) => SecureErrorCode::Backend,
        }
    }
}

impl From<StoreError> for OperationError {
    fn from(err: StoreError) -> Self {
        err.code().error(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_round_trip() {
        for code in [
            SecureErrorCode::NoEntry,
            SecureErrorCode::InvalidArgument,
            SecureErrorCode::Backend,
            SecureErrorCode::InvalidData,
            SecureErrorCode::Unavailable,
        ] {
            assert_eq!(SecureErrorCode::from_i32(code.as_i32()), Some(code));
            assert_ne!(code.as_i32(), 0);
        }
        assert_eq!(SecureErrorCode::from_i32(0), None);
    }

    #[test]
    fn test_store_error_maps_to_operation_error() {
        let err = OperationError::from(StoreError::NotFound("app1".to_string()));
        assert_eq!(err.code, SecureErrorCode::NoEntry.as_i32());
        assert_eq!(err.message, "no data stored under \"app1\"");

        let io = StoreError::from(io::Error::new(io::ErrorKind::PermissionDenied, "denied"));
        assert_eq!(io.code(), SecureErrorCode::Backend);
    }
}
