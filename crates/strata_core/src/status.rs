//! Classified operation outcomes.
//!
//! Every failure surfaced by the dispatch layer is a [`Status`]: a single
//! category plus a human-readable message. Success is the `Ok` arm of
//! [`StoreResult`], so a `Status` value always denotes failure and the
//! category predicates are mutually exclusive by construction.

use strata_engine::EngineError;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, Status>;

/// The category of a classified failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusKind {
    /// Disk or filesystem failure.
    IoError,
    /// The requested key is absent. A normal negative result, not an
    /// exceptional condition.
    NotFound,
    /// On-disk data inconsistency detected by the engine. Fatal to the
    /// affected read, not to the handle.
    Corruption,
    /// Illegal call given the handle's current lifecycle state.
    InvalidState,
    /// Malformed request, rejected before any engine call.
    InvalidArgument,
}

/// A classified failure with a human-readable message.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{}: {message}", kind_name(.kind))]
pub struct Status {
    /// The failure category.
    kind: StatusKind,
    /// Description of the failure.
    message: String,
}

fn kind_name(kind: &StatusKind) -> &'static str {
    match kind {
        StatusKind::IoError => "I/O error",
        StatusKind::NotFound => "not found",
        StatusKind::Corruption => "corruption",
        StatusKind::InvalidState => "invalid state",
        StatusKind::InvalidArgument => "invalid argument",
    }
}

impl Status {
    /// Creates a status with an explicit category.
    pub fn new(kind: StatusKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Creates an I/O error status.
    pub fn io(message: impl Into<String>) -> Self {
        Self::new(StatusKind::IoError, message)
    }

    /// Creates a not-found status.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusKind::NotFound, message)
    }

    /// Creates a corruption status.
    pub fn corruption(message: impl Into<String>) -> Self {
        Self::new(StatusKind::Corruption, message)
    }

    /// Creates an invalid-state status.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::new(StatusKind::InvalidState, message)
    }

    /// Creates an invalid-argument status.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(StatusKind::InvalidArgument, message)
    }

    /// Returns the failure category.
    #[must_use]
    pub fn kind(&self) -> StatusKind {
        self.kind
    }

    /// Returns the human-readable message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns true for disk or filesystem failures.
    #[must_use]
    pub fn is_io_error(&self) -> bool {
        self.kind == StatusKind::IoError
    }

    /// Returns true when the requested key was absent.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.kind == StatusKind::NotFound
    }

    /// Returns true for on-disk data inconsistencies.
    #[must_use]
    pub fn is_corruption(&self) -> bool {
        self.kind == StatusKind::Corruption
    }

    /// Returns true for lifecycle violations.
    #[must_use]
    pub fn is_invalid_state(&self) -> bool {
        self.kind == StatusKind::InvalidState
    }

    /// Returns true for malformed requests.
    #[must_use]
    pub fn is_invalid_argument(&self) -> bool {
        self.kind == StatusKind::InvalidArgument
    }
}

impl From<EngineError> for Status {
    /// Classifies an engine failure.
    ///
    /// Absence of a key from a read path is always classified as
    /// not-found, never as an I/O error. Lock contention is an I/O-level
    /// concern of the environment, not corruption.
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::NotFound => Self::not_found("key not found"),
            EngineError::Io(io) => Self::io(io.to_string()),
            EngineError::Corruption { message } => Self::corruption(message),
            EngineError::Locked => Self::io(err.to_string()),
            EngineError::InvalidArgument { message } => Self::invalid_argument(message),
        }
    }
}
