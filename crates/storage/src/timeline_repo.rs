//! Timeline repository (§4.3): the append-only per-order audit log.

use async_trait::async_trait;
use common::OrderId;
use domain::TimelineEvent;

use crate::error::Result;

#[async_trait]
pub trait TimelineRepository: Send + Sync {
    async fn append(&self, event: TimelineEvent) -> Result<()>;

    /// Ordered by `occurred_at` ascending, then insertion order for ties.
    async fn list(&self, order_id: OrderId) -> Result<Vec<TimelineEvent>>;
}
