//! Outbox repository (§4.2): the durable event queue the publisher worker
//! drains. The only append-only log in this system — there is no
//! event-sourced aggregate history to model here.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutboxStatus {
    Pending,
    Sent,
    Failed,
}

/// A message not yet assigned an id or timestamp — what callers enqueue.
#[derive(Debug, Clone)]
pub struct NewOutboxMessage {
    pub aggregate_type: String,
    pub aggregate_id: Uuid,
    pub event_type: String,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxMessage {
    pub id: i64,
    pub aggregate_type: String,
    pub aggregate_id: Uuid,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub status: OutboxStatus,
    pub attempts: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
pub struct OutboxStats {
    pub pending_count: i64,
    pub oldest_pending_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait OutboxRepository: Send + Sync {
    /// Returns the assigned id. Must be callable within the same atomic
    /// unit as the aggregate write that emits the message; see
    /// `StorageBackend::commit_order_transition`.
    async fn enqueue(&self, message: NewOutboxMessage) -> Result<i64>;

    /// Oldest-first batch, at most `limit` messages. Must not hand the
    /// same message to two concurrent pulls (lease-by-update or
    /// single-worker discipline).
    async fn pull_pending(&self, limit: i64) -> Result<Vec<OutboxMessage>>;

    async fn mark_sent(&self, id: i64) -> Result<()>;

    /// Increments `attempts`; callers decide whether to retry or route to
    /// a DLQ once `attempts` reaches the configured max.
    async fn mark_failed(&self, id: i64) -> Result<()>;

    async fn stats(&self) -> Result<OutboxStats>;
}
