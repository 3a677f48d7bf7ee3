//! Error types for the sync core.

use thiserror::Error;

use crate::log::{LogError, StorageError};
use crate::remote::RemoteError;

/// Result type for sync core operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors surfaced by the sync core.
///
/// The taxonomy follows how each failure is handled: retryable failures are
/// backed off and retried, terminal ones wait for the user, capacity evicts,
/// and corruption resets the queue rather than blocking the app.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A transient remote failure; the engine retries with backoff.
    #[error("retryable: {0}")]
    Retryable(String),

    /// The server rejected the mutation; requires user intervention.
    #[error("terminal: {0}")]
    Terminal(String),

    /// Local storage is exhausted and nothing could be evicted.
    #[error("local queue at capacity")]
    Capacity,

    /// The persisted queue failed to parse and was reset; unsynced data was
    /// lost.
    #[error("persisted queue was corrupt and has been reset")]
    Corruption,

    /// The queue operation itself failed.
    #[error("queue error: {0}")]
    Queue(String),

    /// The storage backend failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl From<LogError> for SyncError {
    fn from(e: LogError) -> Self {
        match e {
            LogError::Capacity => Self::Capacity,
            LogError::Storage(s) => Self::Storage(s),
            other => Self::Queue(other.to_string()),
        }
    }
}

impl From<RemoteError> for SyncError {
    fn from(e: RemoteError) -> Self {
        if e.is_retryable() {
            Self::Retryable(e.to_string())
        } else {
            Self::Terminal(e.to_string())
        }
    }
}
