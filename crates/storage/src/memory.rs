//! In-memory storage backend: a single `tokio::sync::Mutex`-guarded state
//! (one lock, `Arc`-shared, `Vec`/`HashMap` storage) shared by all four
//! repositories so `commit_order_transition` can hold it across all
//! three writes.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::{CustomerId, OrderId};
use domain::{Order, TimelineEvent};
use tokio::sync::Mutex;

use crate::backend::StorageBackend;
use crate::error::{Result, StorageError};
use crate::idempotency::{
    CreateProcessingOutcome, IdempotencyRecord, IdempotencyRepository, IdempotencyStatus,
};
use crate::order_repo::OrderRepository;
use crate::outbox::{NewOutboxMessage, OutboxMessage, OutboxRepository, OutboxStats, OutboxStatus};
use crate::timeline_repo::TimelineRepository;

#[derive(Default)]
struct State {
    orders: HashMap<OrderId, Order>,
    outbox: Vec<OutboxMessage>,
    next_outbox_id: i64,
    timeline: HashMap<OrderId, Vec<TimelineEvent>>,
    idempotency: HashMap<String, IdempotencyRecord>,
}

#[derive(Clone, Default)]
pub struct InMemoryStorage {
    state: Arc<Mutex<State>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn enqueue_locked(state: &mut State, message: NewOutboxMessage) -> i64 {
        state.next_outbox_id += 1;
        let id = state.next_outbox_id;
        state.outbox.push(OutboxMessage {
            id,
            aggregate_type: message.aggregate_type,
            aggregate_id: message.aggregate_id,
            event_type: message.event_type,
            payload: message.payload,
            status: OutboxStatus::Pending,
            attempts: 0,
            created_at: Utc::now(),
        });
        id
    }

    fn append_timeline_locked(state: &mut State, event: TimelineEvent) {
        state.timeline.entry(event.order_id).or_default().push(event);
    }
}

#[async_trait]
impl OrderRepository for InMemoryStorage {
    async fn create(&self, order: Order) -> Result<Order> {
        let mut state = self.state.lock().await;
        if state.orders.contains_key(&order.id) {
            return Err(StorageError::AlreadyExists(order.id.to_string()));
        }
        state.orders.insert(order.id, order.clone());
        Ok(order)
    }

    async fn get(&self, id: OrderId) -> Result<Order> {
        let state = self.state.lock().await;
        state
            .orders
            .get(&id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(id.to_string()))
    }

    async fn list_by_customer(&self, customer_id: CustomerId, limit: i64) -> Result<Vec<Order>> {
        let state = self.state.lock().await;
        Ok(state
            .orders
            .values()
            .filter(|o| o.customer_id == customer_id)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn save(&self, mut order: Order) -> Result<Order> {
        let mut state = self.state.lock().await;
        let current = state
            .orders
            .get(&order.id)
            .ok_or_else(|| StorageError::NotFound(order.id.to_string()))?;

        if current.version != order.version {
            return Err(StorageError::Conflict(format!(
                "order {} expected version {}, found {}",
                order.id, order.version, current.version
            )));
        }

        order.version += 1;
        order.updated_at = Utc::now();
        state.orders.insert(order.id, order.clone());
        Ok(order)
    }
}

#[async_trait]
impl OutboxRepository for InMemoryStorage {
    async fn enqueue(&self, message: NewOutboxMessage) -> Result<i64> {
        let mut state = self.state.lock().await;
        Ok(Self::enqueue_locked(&mut state, message))
    }

    async fn pull_pending(&self, limit: i64) -> Result<Vec<OutboxMessage>> {
        let state = self.state.lock().await;
        let mut pending: Vec<_> = state
            .outbox
            .iter()
            .filter(|m| m.status == OutboxStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by_key(|m| m.id);
        pending.truncate(limit.max(0) as usize);
        Ok(pending)
    }

    async fn mark_sent(&self, id: i64) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(m) = state.outbox.iter_mut().find(|m| m.id == id) {
            m.status = OutboxStatus::Sent;
        }
        Ok(())
    }

    async fn mark_failed(&self, id: i64) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(m) = state.outbox.iter_mut().find(|m| m.id == id) {
            m.attempts += 1;
            m.status = OutboxStatus::Failed;
        }
        Ok(())
    }

    async fn stats(&self) -> Result<OutboxStats> {
        let state = self.state.lock().await;
        let pending: Vec<_> = state
            .outbox
            .iter()
            .filter(|m| m.status == OutboxStatus::Pending)
            .collect();
        Ok(OutboxStats {
            pending_count: pending.len() as i64,
            oldest_pending_at: pending.iter().map(|m| m.created_at).min(),
        })
    }
}

#[async_trait]
impl TimelineRepository for InMemoryStorage {
    async fn append(&self, event: TimelineEvent) -> Result<()> {
        let mut state = self.state.lock().await;
        Self::append_timeline_locked(&mut state, event);
        Ok(())
    }

    async fn list(&self, order_id: OrderId) -> Result<Vec<TimelineEvent>> {
        let state = self.state.lock().await;
        let mut events = state.timeline.get(&order_id).cloned().unwrap_or_default();
        events.sort_by_key(|e| e.occurred_at);
        Ok(events)
    }
}

#[async_trait]
impl IdempotencyRepository for InMemoryStorage {
    async fn create_processing(
        &self,
        key: &str,
        request_hash: &str,
        ttl_at: chrono::DateTime<Utc>,
    ) -> Result<CreateProcessingOutcome> {
        let mut state = self.state.lock().await;
        if let Some(existing) = state.idempotency.get(key) {
            return Ok(if existing.request_hash == request_hash {
                CreateProcessingOutcome::Replayed(existing.clone())
            } else {
                CreateProcessingOutcome::HashMismatch
            });
        }

        let record = IdempotencyRecord {
            key: key.to_string(),
            request_hash: request_hash.to_string(),
            status: IdempotencyStatus::Processing,
            response_body: None,
            http_status: None,
            ttl_at,
        };
        state.idempotency.insert(key.to_string(), record.clone());
        Ok(CreateProcessingOutcome::Inserted(record))
    }

    async fn mark_done(&self, key: &str, body: Vec<u8>, http_status: i32) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(record) = state.idempotency.get_mut(key) {
            record.status = IdempotencyStatus::Done;
            record.response_body = Some(body);
            record.http_status = Some(http_status);
        }
        Ok(())
    }

    async fn mark_failed(&self, key: &str, body: Vec<u8>, http_status: i32) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(record) = state.idempotency.get_mut(key) {
            record.status = IdempotencyStatus::Failed;
            record.response_body = Some(body);
            record.http_status = Some(http_status);
        }
        Ok(())
    }

    async fn delete_expired(&self, before: chrono::DateTime<Utc>, limit: i64) -> Result<i64> {
        let mut state = self.state.lock().await;
        let expired: Vec<String> = state
            .idempotency
            .iter()
            .filter(|(_, r)| r.ttl_at < before)
            .take(limit.max(0) as usize)
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            state.idempotency.remove(key);
        }
        Ok(expired.len() as i64)
    }
}

#[async_trait]
impl StorageBackend for InMemoryStorage {
    async fn commit_order_transition(
        &self,
        mut order: Order,
        outbox: Vec<NewOutboxMessage>,
        timeline: Vec<TimelineEvent>,
    ) -> Result<Order> {
        let mut state = self.state.lock().await;

        let current = state
            .orders
            .get(&order.id)
            .ok_or_else(|| StorageError::NotFound(order.id.to_string()))?;
        if current.version != order.version {
            return Err(StorageError::Conflict(format!(
                "order {} expected version {}, found {}",
                order.id, order.version, current.version
            )));
        }

        order.version += 1;
        order.updated_at = Utc::now();
        state.orders.insert(order.id, order.clone());

        for message in outbox {
            Self::enqueue_locked(&mut state, message);
        }
        for event in timeline {
            Self::append_timeline_locked(&mut state, event);
        }

        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use domain::{OrderItemInput, OrderStatus};

    fn sample_order() -> Order {
        Order::create(
            CustomerId::new(),
            "USD",
            vec![OrderItemInput {
                sku: "SKU-1".into(),
                qty: 1,
                price_minor: 1000,
            }],
            Utc::now(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let storage = InMemoryStorage::new();
        let order = sample_order();
        storage.create(order.clone()).await.unwrap();

        let fetched = storage.get(order.id).await.unwrap();
        assert_eq!(fetched.id, order.id);
    }

    #[tokio::test]
    async fn create_twice_fails_already_exists() {
        let storage = InMemoryStorage::new();
        let order = sample_order();
        storage.create(order.clone()).await.unwrap();
        let err = storage.create(order).await.unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn save_increments_version_on_match() {
        let storage = InMemoryStorage::new();
        let mut order = sample_order();
        storage.create(order.clone()).await.unwrap();

        order.status = OrderStatus::Reserved;
        let saved = storage.save(order).await.unwrap();
        assert_eq!(saved.version, 1);
        assert_eq!(saved.status, OrderStatus::Reserved);
    }

    #[tokio::test]
    async fn save_with_stale_version_conflicts() {
        let storage = InMemoryStorage::new();
        let mut order = sample_order();
        storage.create(order.clone()).await.unwrap();

        order.status = OrderStatus::Reserved;
        storage.save(order.clone()).await.unwrap();

        let err = storage.save(order).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict(_)));
    }

    #[tokio::test]
    async fn get_unknown_order_is_not_found() {
        let storage = InMemoryStorage::new();
        let err = storage.get(OrderId::new()).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[tokio::test]
    async fn outbox_enqueue_pull_mark_sent() {
        let storage = InMemoryStorage::new();
        let id = storage
            .enqueue(NewOutboxMessage {
                aggregate_type: "Order".into(),
                aggregate_id: uuid::Uuid::new_v4(),
                event_type: "StatusChanged".into(),
                payload: serde_json::json!({"order_id": "x"}),
            })
            .await
            .unwrap();

        let pending = storage.pull_pending(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, id);

        storage.mark_sent(id).await.unwrap();
        let pending = storage.pull_pending(10).await.unwrap();
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn idempotency_replay_vs_hash_mismatch() {
        let storage = InMemoryStorage::new();
        let ttl = Utc::now() + chrono::Duration::hours(24);

        let first = storage.create_processing("k1", "hash-a", ttl).await.unwrap();
        assert!(matches!(first, CreateProcessingOutcome::Inserted(_)));

        let replay = storage.create_processing("k1", "hash-a", ttl).await.unwrap();
        assert!(matches!(replay, CreateProcessingOutcome::Replayed(_)));

        let mismatch = storage.create_processing("k1", "hash-b", ttl).await.unwrap();
        assert!(matches!(mismatch, CreateProcessingOutcome::HashMismatch));
    }

    #[tokio::test]
    async fn commit_order_transition_applies_all_three_writes() {
        let storage = InMemoryStorage::new();
        let mut order = sample_order();
        storage.create(order.clone()).await.unwrap();
        order.status = OrderStatus::Reserved;

        let order_id = order.id;
        let committed = storage
            .commit_order_transition(
                order,
                vec![NewOutboxMessage {
                    aggregate_type: "Order".into(),
                    aggregate_id: order_id.as_uuid(),
                    event_type: "StatusChanged".into(),
                    payload: serde_json::json!({"order_id": order_id.to_string()}),
                }],
                vec![TimelineEvent::status_changed(order_id, "RESERVED", Utc::now())],
            )
            .await
            .unwrap();

        assert_eq!(committed.version, 1);
        assert_eq!(storage.stats().await.unwrap().pending_count, 1);
        assert_eq!(storage.list(order_id).await.unwrap().len(), 1);
    }
}
