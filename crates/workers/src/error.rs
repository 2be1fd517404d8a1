//! Worker error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("storage error: {0}")]
    Storage(#[from] storage::StorageError),

    /// A publish attempt exhausted its retries.
    #[error("publish failed: {0}")]
    Publish(String),
}

pub type Result<T> = std::result::Result<T, WorkerError>;
