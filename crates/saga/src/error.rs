//! Saga error types.
//!
//! The orchestrator speaks `OmsError` at its boundary like everything
//! else in this service (§7); `SagaError` only exists to carry the few
//! saga-specific conditions (retry exhaustion, step reporting) before
//! they are folded into an `OmsError` for the caller.

use domain::OmsError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SagaError {
    /// The `updateStatus` protocol exhausted its retries on a conflicting
    /// write (§4.6).
    #[error("version conflict on order {0} after exhausting retries")]
    RetriesExhausted(common::OrderId),

    /// A storage operation failed.
    #[error("storage error: {0}")]
    Storage(#[from] storage::StorageError),

    /// A port (inventory/payment) reported a domain-level failure.
    #[error("domain error: {0}")]
    Domain(#[from] OmsError),
}

impl From<SagaError> for OmsError {
    fn from(err: SagaError) -> Self {
        match err {
            SagaError::RetriesExhausted(id) => {
                OmsError::Aborted(format!("version conflict on order {id} after retries"))
            }
            SagaError::Storage(e) => e.into(),
            SagaError::Domain(e) => e,
        }
    }
}

pub type Result<T> = std::result::Result<T, SagaError>;
