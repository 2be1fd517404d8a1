//! The combined storage backend the saga orchestrator is generic over.
//!
//! `commit_order_transition` is the transactional boundary §4.2 requires:
//! the order status write and the outbox/timeline writes it emits commit
//! together. The in-memory driver satisfies this by holding one lock for
//! the duration of all three mutations (advisory — no rollback on a later
//! failure); the Postgres driver wraps them in one `pool.begin()`/`commit()`.

use async_trait::async_trait;
use domain::{Order, TimelineEvent};

use crate::error::Result;
use crate::idempotency::IdempotencyRepository;
use crate::order_repo::OrderRepository;
use crate::outbox::{NewOutboxMessage, OutboxRepository};
use crate::timeline_repo::TimelineRepository;

#[async_trait]
pub trait StorageBackend:
    OrderRepository + OutboxRepository + TimelineRepository + IdempotencyRepository
{
    async fn commit_order_transition(
        &self,
        order: Order,
        outbox: Vec<NewOutboxMessage>,
        timeline: Vec<TimelineEvent>,
    ) -> Result<Order>;
}
