//! Transport error types.

use thiserror::Error;

/// Result type alias for transport operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors raised by a [`crate::SonicClient`] implementation.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The client has no live connection.
    #[error("transport not connected")]
    NotConnected,

    /// An underlying Redis operation failed.
    #[error("redis {operation} failed: {message}")]
    Redis {
        operation: &'static str,
        message: String,
    },

    /// The advisory lock is held by someone else.
    #[error("device lock held by '{holder}'")]
    LockHeld { holder: String },

    /// The operation was cancelled between entries.
    #[error("operation cancelled")]
    Cancelled,

    /// The operation is not available on this transport.
    #[error("{operation} is not supported by this transport")]
    Unsupported { operation: &'static str },

    /// Injected failure (mock transport only).
    #[error("injected failure: {0}")]
    Injected(String),
}

impl ClientError {
    pub fn redis(operation: &'static str, err: redis::RedisError) -> Self {
        ClientError::Redis {
            operation,
            message: err.to_string(),
        }
    }
}

/// An apply that stopped partway: `applied` entries were definitely
/// written before `source` aborted the batch. Callers feed `applied`
/// into rollback.
#[derive(Debug, Error)]
#[error("apply aborted after {applied} of {total} changes: {source}")]
pub struct ApplyError {
    pub applied: usize,
    pub total: usize,
    #[source]
    pub source: ClientError,
}
