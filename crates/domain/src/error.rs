//! The error kind taxonomy shared across the whole service (§7).
//!
//! `OmsError` is not layered per-crate the way an event-sourced domain
//! error would wrap a storage error wrapping a driver error — the spec
//! names eight *kinds*, not a type hierarchy, so one enum carries them
//! end to end and every layer (storage, saga, api) maps its own failures
//! onto these variants instead of inventing new ones.

use thiserror::Error;

/// A service-wide error, tagged with the kind the RPC facade and the
/// idempotency middleware need to pick a response code.
#[derive(Debug, Error)]
pub enum OmsError {
    /// Malformed request: bad currency, non-positive quantity, missing
    /// metadata, and similar caller mistakes.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The referenced order (or other resource) does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A create or idempotency-key operation collided with an existing
    /// record that does not match the request.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// The request is well-formed but the resource is not in a state
    /// that permits it (e.g. refund on a Pending order).
    #[error("failed precondition: {0}")]
    FailedPrecondition(String),

    /// A conditional write lost a race after exhausting its retries, or
    /// a duplicate request arrived while the original was still
    /// Processing.
    #[error("aborted: {0}")]
    Aborted(String),

    /// Storage, transport, or marshalling failure with no narrower kind.
    #[error("internal error: {0}")]
    Internal(String),

    /// A downstream dependency is transiently unavailable; safe to retry.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// Reserved for future use; the core does not perform
    /// authentication.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),
}

impl OmsError {
    /// The stable kind name used in structured failure payloads (§4.8,
    /// §7) and logged/cached verbatim so a replayed failure matches the
    /// original byte for byte.
    pub fn kind(&self) -> &'static str {
        match self {
            OmsError::InvalidArgument(_) => "INVALID_ARGUMENT",
            OmsError::NotFound(_) => "NOT_FOUND",
            OmsError::AlreadyExists(_) => "ALREADY_EXISTS",
            OmsError::FailedPrecondition(_) => "FAILED_PRECONDITION",
            OmsError::Aborted(_) => "ABORTED",
            OmsError::Internal(_) => "INTERNAL",
            OmsError::Unavailable(_) => "UNAVAILABLE",
            OmsError::Unauthenticated(_) => "UNAUTHENTICATED",
        }
    }

    pub fn message(&self) -> String {
        self.to_string()
    }
}

impl From<serde_json::Error> for OmsError {
    fn from(err: serde_json::Error) -> Self {
        OmsError::Internal(format!("serialization error: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, OmsError>;
