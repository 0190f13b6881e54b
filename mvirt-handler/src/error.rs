//! Error types surfaced by the handlers and their collaborators.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure class reported to the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    InvalidInput,
    NotFound,
    AlreadyExists,
    Conflict,
    NotStabilized,
    InternalServiceError,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::InvalidInput => "InvalidInput",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::AlreadyExists => "AlreadyExists",
            ErrorKind::Conflict => "Conflict",
            ErrorKind::NotStabilized => "NotStabilized",
            ErrorKind::InternalServiceError => "InternalServiceError",
        };
        f.write_str(s)
    }
}

/// Terminal handler failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerError {
    /// Request failed validation. Never retried.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Resource absent when the operation required it.
    #[error("not found: {0}")]
    NotFound(String),

    /// Create target already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Remote rejected a mutating call because of concurrent state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Retry or timeout-retry budget exhausted while polling.
    #[error("not stabilized: {0}")]
    NotStabilized(String),

    /// Remote reported an unexpected failure.
    #[error("internal service error: {0}")]
    InternalServiceError(String),
}

impl HandlerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            HandlerError::InvalidInput(_) => ErrorKind::InvalidInput,
            HandlerError::NotFound(_) => ErrorKind::NotFound,
            HandlerError::AlreadyExists(_) => ErrorKind::AlreadyExists,
            HandlerError::Conflict(_) => ErrorKind::Conflict,
            HandlerError::NotStabilized(_) => ErrorKind::NotStabilized,
            HandlerError::InternalServiceError(_) => ErrorKind::InternalServiceError,
        }
    }

    /// Message without the kind prefix.
    pub fn message(&self) -> &str {
        match self {
            HandlerError::InvalidInput(m)
            | HandlerError::NotFound(m)
            | HandlerError::AlreadyExists(m)
            | HandlerError::Conflict(m)
            | HandlerError::NotStabilized(m)
            | HandlerError::InternalServiceError(m) => m,
        }
    }
}

/// Outcome of a failed remote call.
///
/// Expected conditions such as "not found" are plain variants so callers
/// branch on them with `match` instead of treating them as exceptional.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum RemoteError {
    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("resource already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid request: {0}")]
    InvalidInput(String),

    #[error("throttled: {0}")]
    Throttled(String),

    #[error("remote failure: {0}")]
    Internal(String),
}

impl From<RemoteError> for HandlerError {
    fn from(e: RemoteError) -> Self {
        match e {
            RemoteError::NotFound(m) => HandlerError::NotFound(m),
            RemoteError::Conflict(m) => HandlerError::Conflict(m),
            RemoteError::AlreadyExists(m) => HandlerError::AlreadyExists(m),
            RemoteError::InvalidInput(m) => HandlerError::InvalidInput(m),
            RemoteError::Throttled(m) => {
                HandlerError::InternalServiceError(format!("throttled: {}", m))
            }
            RemoteError::Internal(m) => HandlerError::InternalServiceError(m),
        }
    }
}

/// Result type for remote client calls.
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Result type for handler operations.
pub type Result<T> = std::result::Result<T, HandlerError>;
