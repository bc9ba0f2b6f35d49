//! Error types for engine operations.

use std::io;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur inside a storage engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The requested key does not exist.
    ///
    /// Absence of a key is reported as an error by the engine so that the
    /// layer above can classify it separately from I/O failures; it is not
    /// an exceptional condition.
    #[error("key not found")]
    NotFound,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// On-disk data failed validation.
    #[error("corruption: {message}")]
    Corruption {
        /// Description of the corruption.
        message: String,
    },

    /// Another process holds the database lock.
    #[error("database locked: another process has exclusive access")]
    Locked,

    /// A request was malformed before reaching the engine.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the problem.
        message: String,
    },
}

impl EngineError {
    /// Creates a corruption error.
    pub fn corruption(message: impl Into<String>) -> Self {
        Self::Corruption {
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Returns true if this error reports an absent key.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_predicate() {
        assert!(EngineError::NotFound.is_not_found());
        assert!(!EngineError::corruption("bad frame").is_not_found());
    }

    #[test]
    fn display_messages() {
        let err = EngineError::corruption("checksum mismatch");
        assert_eq!(format!("{err}"), "corruption: checksum mismatch");

        let err = EngineError::invalid_argument("empty key");
        assert_eq!(format!("{err}"), "invalid argument: empty key");
    }

    #[test]
    fn io_error_conversion() {
        let io = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        let err: EngineError = io.into();
        assert!(matches!(err, EngineError::Io(_)));
    }
}
