//! Idempotency repository (§4.4): the per-client-key dedup store behind
//! the RPC idempotency middleware.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdempotencyStatus {
    Processing,
    Done,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub key: String,
    pub request_hash: String,
    pub status: IdempotencyStatus,
    pub response_body: Option<Vec<u8>>,
    pub http_status: Option<i32>,
    pub ttl_at: DateTime<Utc>,
}

/// Distinguishes the three outcomes `create_processing` can produce
/// (§4.4): a fresh insertion, a replay of an identical in-flight/completed
/// request, or a collision with a different request under the same key.
#[derive(Debug, Clone)]
pub enum CreateProcessingOutcome {
    Inserted(IdempotencyRecord),
    Replayed(IdempotencyRecord),
    HashMismatch,
}

#[async_trait]
pub trait IdempotencyRepository: Send + Sync {
    async fn create_processing(
        &self,
        key: &str,
        request_hash: &str,
        ttl_at: DateTime<Utc>,
    ) -> Result<CreateProcessingOutcome>;

    async fn mark_done(&self, key: &str, body: Vec<u8>, http_status: i32) -> Result<()>;

    async fn mark_failed(&self, key: &str, body: Vec<u8>, http_status: i32) -> Result<()>;

    /// Returns the number of rows deleted.
    async fn delete_expired(&self, before: DateTime<Utc>, limit: i64) -> Result<i64>;
}
