//! The RPC facade (§4.10): validates requests, loads/persists orders, and
//! dispatches saga work onto a tracked background task set. Analogous in
//! role to the host's `AppState`/`OrderService<S>`, but exposing the six
//! order-lifecycle operations instead of per-event mutation methods.

use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use common::{CustomerId, OrderId};
use domain::{
    InMemoryInventoryService, InMemoryPaymentService, Order, OrderItemInput, OrderStatus,
    TimelineEvent,
};
use saga::{LogBrokerProducer, SagaOrchestrator};
use storage::{NewOutboxMessage, StorageBackend};
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::error::ApiError;

const DEFAULT_LIST_LIMIT: i64 = 100;

pub struct CreateOrderInput {
    pub customer_id: String,
    pub currency: String,
    pub items: Vec<OrderItemInput>,
}

pub struct RefundInput {
    pub amount_minor: Option<i64>,
    pub reason: String,
}

/// Wraps the storage backend and an optional saga orchestrator behind the
/// six spec-named operations. When no orchestrator is wired, Cancel/Refund
/// apply their transition inline instead of dispatching a saga.
pub struct OrderService<S: StorageBackend + Clone + 'static> {
    storage: S,
    saga: Option<
        Arc<SagaOrchestrator<S, InMemoryInventoryService, InMemoryPaymentService, LogBrokerProducer>>,
    >,
    tasks: Mutex<JoinSet<()>>,
    closed: Arc<AtomicBool>,
}

impl<S: StorageBackend + Clone + 'static> OrderService<S> {
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            saga: None,
            tasks: Mutex::new(JoinSet::new()),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_saga(
        storage: S,
        saga: Arc<
            SagaOrchestrator<S, InMemoryInventoryService, InMemoryPaymentService, LogBrokerProducer>,
        >,
    ) -> Self {
        Self {
            storage,
            saga: Some(saga),
            tasks: Mutex::new(JoinSet::new()),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Create: validates and persists a new order, appending the initial
    /// `OrderStatusChanged(Pending)` timeline event.
    #[tracing::instrument(skip(self, input))]
    pub async fn create(&self, input: CreateOrderInput) -> Result<Order, ApiError> {
        if input.customer_id.trim().is_empty() {
            return Err(ApiError::invalid_argument("customer_id is required"));
        }
        let customer_uuid = Uuid::parse_str(input.customer_id.trim())
            .map_err(|e| ApiError::invalid_argument(format!("invalid customer_id: {e}")))?;
        let customer_id = CustomerId::from_uuid(customer_uuid);

        let now = Utc::now();
        let order = Order::create(customer_id, input.currency, input.items, now)?;

        let timeline = vec![TimelineEvent::status_changed(
            order.id,
            OrderStatus::Pending.as_str(),
            now,
        )];
        let outbox = vec![status_event(&order, "OrderStatusChanged", now, order.status.as_str())];

        let created = self.storage.create(order).await?;
        for event in timeline {
            self.storage.append(event).await?;
        }
        for message in outbox {
            self.storage.enqueue(message).await?;
        }
        Ok(created)
    }

    /// Pay: dispatches `saga.start` on a tracked background task if a saga
    /// is wired; responds with the order's current (pre-dispatch) status.
    /// The terminal outcome is observed via `get`.
    #[tracing::instrument(skip(self))]
    pub async fn pay(&self, order_id: OrderId) -> Result<Order, ApiError> {
        let order = self.storage.get(order_id).await?;

        if let Some(saga) = self.saga.clone() {
            self.dispatch(async move {
                if let Err(e) = saga.start(order_id).await {
                    tracing::error!(%order_id, error = %e, "saga start failed");
                }
            })
            .await;
        }

        Ok(order)
    }

    /// Cancel: dispatches `saga.cancel` if wired, otherwise applies a
    /// direct Pending/Reserved→Canceled transition with no inventory or
    /// payment calls. Returns the reloaded order.
    #[tracing::instrument(skip(self))]
    pub async fn cancel(&self, order_id: OrderId, reason: String) -> Result<Order, ApiError> {
        let order = self.storage.get(order_id).await?;

        match self.saga.clone() {
            Some(saga) => {
                self.dispatch(async move {
                    if let Err(e) = saga.cancel(order_id, reason).await {
                        tracing::error!(%order_id, error = %e, "saga cancel failed");
                    }
                })
                .await;
            }
            None => {
                self.apply_direct_cancel(order, reason).await?;
            }
        }

        Ok(self.storage.get(order_id).await?)
    }

    /// Refund: rejects orders not in {Paid, Confirmed} with
    /// FailedPrecondition; otherwise dispatches `saga.refund` if wired, or
    /// applies a direct transition to Refunded. Returns the reloaded
    /// order.
    #[tracing::instrument(skip(self, input))]
    pub async fn refund(&self, order_id: OrderId, input: RefundInput) -> Result<Order, ApiError> {
        if let Some(amount) = input.amount_minor {
            if amount < 0 {
                return Err(ApiError::invalid_argument("refund amount must be non-negative"));
            }
        }

        let order = self.storage.get(order_id).await?;
        if order.status != OrderStatus::Refunded && !order.status.can_refund() {
            return Err(ApiError(domain::OmsError::FailedPrecondition(format!(
                "order {order_id} is not refundable from status {}",
                order.status
            ))));
        }
        if order.status == OrderStatus::Refunded {
            return Ok(order);
        }

        let amount = match input.amount_minor {
            Some(a) if a > 0 && a <= order.amount_minor => a,
            _ => order.amount_minor,
        };

        match self.saga.clone() {
            Some(saga) => {
                let reason = input.reason.clone();
                self.dispatch(async move {
                    if let Err(e) = saga.refund(order_id, amount, reason).await {
                        tracing::error!(%order_id, error = %e, "saga refund failed");
                    }
                })
                .await;
            }
            None => {
                self.apply_direct_refund(order, amount, input.reason).await?;
            }
        }

        Ok(self.storage.get(order_id).await?)
    }

    /// Get: loads the order and its timeline.
    #[tracing::instrument(skip(self))]
    pub async fn get(&self, order_id: OrderId) -> Result<(Order, Vec<TimelineEvent>), ApiError> {
        let order = self.storage.get(order_id).await?;
        let timeline = self.storage.list(order_id).await?;
        Ok((order, timeline))
    }

    /// List: orders for a customer, paged (default limit 100).
    #[tracing::instrument(skip(self))]
    pub async fn list(&self, customer_id: &str, limit: Option<i64>) -> Result<Vec<Order>, ApiError> {
        let customer_id = CustomerId::from_uuid(
            Uuid::from_str(customer_id.trim())
                .map_err(|e| ApiError::invalid_argument(format!("invalid customer_id: {e}")))?,
        );
        let limit = limit.filter(|l| *l > 0).unwrap_or(DEFAULT_LIST_LIMIT);
        Ok(self.storage.list_by_customer(customer_id, limit).await?)
    }

    /// Stops accepting new background dispatches and waits (up to
    /// `deadline`) for in-flight saga tasks to drain (§5).
    pub async fn shutdown(&self, deadline: Duration) {
        self.closed.store(true, Ordering::SeqCst);
        let mut tasks = self.tasks.lock().await;
        let drain = async {
            while tasks.join_next().await.is_some() {}
        };
        if tokio::time::timeout(deadline, drain).await.is_err() {
            tracing::warn!("saga task set did not drain within the shutdown deadline");
        }
    }

    async fn dispatch<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.closed.load(Ordering::SeqCst) {
            tracing::warn!("dispatch rejected: service is shutting down");
            return;
        }
        let mut tasks = self.tasks.lock().await;
        tasks.spawn(fut);
    }

    async fn apply_direct_cancel(&self, order: Order, reason: String) -> Result<(), ApiError> {
        if matches!(order.status, OrderStatus::Canceled | OrderStatus::Refunded) {
            return Ok(());
        }
        let now = Utc::now();
        let mut mutated = order.clone();
        mutated.status = OrderStatus::Canceled;
        mutated.updated_at = now;
        let outbox = vec![status_event(&mutated, "OrderCanceled", now, &reason)];
        let timeline = vec![TimelineEvent::canceled(mutated.id, reason, now)];
        self.storage
            .commit_order_transition(mutated, outbox, timeline)
            .await?;
        Ok(())
    }

    async fn apply_direct_refund(
        &self,
        order: Order,
        amount_minor: i64,
        reason: String,
    ) -> Result<(), ApiError> {
        let now = Utc::now();
        let mut mutated = order.clone();
        mutated.status = OrderStatus::Refunded;
        mutated.updated_at = now;
        let outbox = vec![status_event_with_amount(
            &mutated,
            "OrderRefunded",
            now,
            &reason,
            Some(amount_minor),
        )];
        let timeline = vec![TimelineEvent::refunded(mutated.id, reason, now)];
        self.storage
            .commit_order_transition(mutated, outbox, timeline)
            .await?;
        Ok(())
    }
}

fn status_event(order: &Order, event_type: &str, ts: chrono::DateTime<Utc>, reason: &str) -> NewOutboxMessage {
    status_event_with_amount(order, event_type, ts, reason, None)
}

fn status_event_with_amount(
    order: &Order,
    event_type: &str,
    ts: chrono::DateTime<Utc>,
    reason: &str,
    amount_minor: Option<i64>,
) -> NewOutboxMessage {
    let mut payload = serde_json::json!({
        "order_id": order.id.to_string(),
        "ts": ts.to_rfc3339(),
        "status": order.status.as_str(),
        "updated_at": order.updated_at.to_rfc3339(),
        "reason": reason,
    });
    if let Some(amount_minor) = amount_minor {
        payload["amount_minor"] = serde_json::json!(amount_minor);
    }
    NewOutboxMessage {
        aggregate_type: "Order".into(),
        aggregate_id: order.id.as_uuid(),
        event_type: event_type.into(),
        payload,
    }
}
