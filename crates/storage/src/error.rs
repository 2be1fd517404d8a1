use domain::OmsError;
use thiserror::Error;

/// Errors that can occur when interacting with a repository.
///
/// Mirrors `domain::OmsError`'s kind set at the granularity storage needs;
/// the `From` impl below is the single place the two taxonomies meet.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("not found: {0}")]
    NotFound(String),

    /// A conditional write lost the optimistic-concurrency race.
    #[error("version conflict: {0}")]
    Conflict(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// An idempotency key exists with a request hash that does not match
    /// the current request.
    #[error("idempotency hash mismatch for key {0}")]
    HashMismatch(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StorageError>;

impl From<StorageError> for OmsError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(msg) => OmsError::NotFound(msg),
            StorageError::Conflict(msg) => OmsError::Aborted(msg),
            StorageError::AlreadyExists(msg) => OmsError::AlreadyExists(msg),
            StorageError::HashMismatch(msg) => {
                OmsError::AlreadyExists(format!("idempotency hash mismatch: {msg}"))
            }
            StorageError::Database(e) => OmsError::Internal(format!("database error: {e}")),
            StorageError::Migration(e) => OmsError::Internal(format!("migration error: {e}")),
            StorageError::Serialization(e) => {
                OmsError::Internal(format!("serialization error: {e}"))
            }
        }
    }
}
