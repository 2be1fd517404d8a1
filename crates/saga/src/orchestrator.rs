//! The saga orchestrator (§4.6): drives an order through
//! Pending→Reserved→Paid→Confirmed, compensating in reverse on failure.
//!
//! There is no persisted saga instance to replay — progress is observed
//! entirely through `Order.status` and the timeline. `start`/`cancel`/
//! `refund` are the three public entry points, each driving its own
//! compensating path; there is no shipping step.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use common::OrderId;
use domain::{InventoryService, Order, OrderStatus, PaymentService, RefundOutcome, TimelineEvent};
use storage::{NewOutboxMessage, StorageBackend, StorageError};

use crate::broker::{BrokerProducer, NoopBrokerProducer, SagaEvent};
use crate::error::{Result, SagaError};

const BASE_DELAY: Duration = Duration::from_millis(10);
const MAX_RETRIES: u32 = 3;

/// Orchestrates the inventory-reservation / payment-capture saga for a
/// single order.
pub struct SagaOrchestrator<S, I, P, B = NoopBrokerProducer>
where
    S: StorageBackend,
    I: InventoryService,
    P: PaymentService,
    B: BrokerProducer,
{
    storage: S,
    inventory: I,
    payment: P,
    broker: B,
}

impl<S, I, P> SagaOrchestrator<S, I, P, NoopBrokerProducer>
where
    S: StorageBackend,
    I: InventoryService,
    P: PaymentService,
{
    /// Creates an orchestrator with no broker-side publication wired.
    pub fn new(storage: S, inventory: I, payment: P) -> Self {
        Self {
            storage,
            inventory,
            payment,
            broker: NoopBrokerProducer,
        }
    }
}

impl<S, I, P, B> SagaOrchestrator<S, I, P, B>
where
    S: StorageBackend,
    I: InventoryService,
    P: PaymentService,
    B: BrokerProducer,
{
    /// Creates an orchestrator that also publishes high-level saga events
    /// to `broker` (advisory only; the outbox remains the source of
    /// truth).
    pub fn with_broker(storage: S, inventory: I, payment: P, broker: B) -> Self {
        Self {
            storage,
            inventory,
            payment,
            broker,
        }
    }

    /// Drives the forward path for `order_id`. A no-op if the order is
    /// already terminal.
    #[tracing::instrument(skip(self))]
    pub async fn start(&self, order_id: OrderId) -> Result<()> {
        metrics::counter!("sagas_started").increment(1);
        metrics::gauge!("active_sagas").increment(1.0);
        let saga_start = Instant::now();

        let result = self.start_inner(order_id).await;

        metrics::histogram!("saga_duration_seconds").record(saga_start.elapsed().as_secs_f64());
        metrics::gauge!("active_sagas").decrement(1.0);
        result
    }

    async fn start_inner(&self, order_id: OrderId) -> Result<()> {
        let mut order = self.storage.get(order_id).await?;
        if order.status.is_terminal() {
            return Ok(());
        }

        if order.status == OrderStatus::Pending {
            let step_start = Instant::now();
            if let Err(e) = self.inventory.reserve(order_id, &order.items).await {
                tracing::warn!(%order_id, error = %e, "inventory reservation failed");
                self.fail_order(order, format!("inventory reserve failed: {e}"))
                    .await?;
                metrics::counter!("sagas_failed").increment(1);
                return Ok(());
            }
            metrics::histogram!("step_duration_seconds", "step" => "reserve_inventory")
                .record(step_start.elapsed().as_secs_f64());

            order = self.update_status(order, OrderStatus::Reserved).await?;
            self.broker.publish(order_id, SagaEvent::StepReserved).await;
        }

        if order.status == OrderStatus::Reserved {
            let step_start = Instant::now();
            let pay_result = self
                .payment
                .pay(order_id, order.amount_minor, &order.currency)
                .await;

            let authorized = matches!(&pay_result, Ok(outcome) if outcome.is_success());
            if !authorized {
                let reason = match pay_result {
                    Ok(outcome) => format!("payment not authorized: {outcome:?}"),
                    Err(e) => format!("payment service error: {e}"),
                };
                tracing::warn!(%order_id, %reason, "payment capture failed");
                let _ = self.inventory.release(order_id, &order.items).await;
                self.fail_order(order, reason).await?;
                metrics::counter!("sagas_failed").increment(1);
                return Ok(());
            }
            metrics::histogram!("step_duration_seconds", "step" => "process_payment")
                .record(step_start.elapsed().as_secs_f64());

            order = self.update_status(order, OrderStatus::Paid).await?;
            self.broker.publish(order_id, SagaEvent::StepPaid).await;
        }

        if order.status == OrderStatus::Paid {
            self.update_status(order, OrderStatus::Confirmed).await?;
            self.broker.publish(order_id, SagaEvent::Completed).await;
            metrics::counter!("sagas_completed").increment(1);
        }

        Ok(())
    }

    /// Cancels `order_id`. A no-op on an already-Canceled or Refunded
    /// order. Releases any held reservation and refunds any captured
    /// payment before transitioning; if the refund fails the order is
    /// left untouched (§4.6).
    #[tracing::instrument(skip(self))]
    pub async fn cancel(&self, order_id: OrderId, reason: String) -> Result<()> {
        let order = self.storage.get(order_id).await?;
        if matches!(order.status, OrderStatus::Canceled | OrderStatus::Refunded) {
            return Ok(());
        }

        if order.status.holds_reservation() {
            let _ = self.inventory.release(order_id, &order.items).await;
        }

        if order.status.holds_payment() {
            match self
                .payment
                .refund(order_id, order.amount_minor, &order.currency)
                .await
            {
                Ok(RefundOutcome::Refunded) => {}
                Ok(RefundOutcome::Failed) | Err(_) => {
                    tracing::warn!(%order_id, "refund failed during cancel; order left unchanged");
                    return Ok(());
                }
            }
        }

        let now = Utc::now();
        self.commit_with_retry(order, move |o| {
            let mut mutated = o.clone();
            mutated.status = OrderStatus::Canceled;
            mutated.updated_at = now;
            let outbox = vec![status_event(&mutated, "OrderCanceled", now, &reason)];
            let timeline = vec![TimelineEvent::canceled(mutated.id, reason.clone(), now)];
            (mutated, outbox, timeline)
        })
        .await?;

        self.broker.publish(order_id, SagaEvent::Canceled).await;
        metrics::counter!("sagas_canceled").increment(1);
        Ok(())
    }

    /// Refunds `order_id` for `amount_minor` (clamped to `[1,
    /// order.amount_minor]`, defaulting to the full order amount when out
    /// of range). A no-op if already Refunded or not in {Paid, Confirmed}.
    #[tracing::instrument(skip(self))]
    pub async fn refund(&self, order_id: OrderId, amount_minor: i64, reason: String) -> Result<()> {
        let order = self.storage.get(order_id).await?;
        if order.status == OrderStatus::Refunded {
            return Ok(());
        }
        if !order.status.can_refund() {
            tracing::warn!(%order_id, status = %order.status, "refund requested on a non-refundable order");
            return Ok(());
        }

        let amount = if amount_minor <= 0 || amount_minor > order.amount_minor {
            order.amount_minor
        } else {
            amount_minor
        };

        match self.payment.refund(order_id, amount, &order.currency).await {
            Ok(RefundOutcome::Refunded) => {}
            Ok(RefundOutcome::Failed) | Err(_) => {
                tracing::warn!(%order_id, "refund rejected by payment service; order left unchanged");
                return Ok(());
            }
        }

        let _ = self.inventory.release(order_id, &order.items).await;

        let now = Utc::now();
        self.commit_with_retry(order, move |o| {
            let mut mutated = o.clone();
            mutated.status = OrderStatus::Refunded;
            mutated.updated_at = now;
            let outbox = vec![status_event_with_amount(
                &mutated,
                "OrderRefunded",
                now,
                &reason,
                Some(amount),
            )];
            let timeline = vec![TimelineEvent::refunded(mutated.id, reason.clone(), now)];
            (mutated, outbox, timeline)
        })
        .await?;

        self.broker.publish(order_id, SagaEvent::Refunded).await;
        metrics::counter!("sagas_refunded").increment(1);
        Ok(())
    }

    async fn fail_order(&self, order: Order, reason: String) -> Result<Order> {
        let now = Utc::now();
        let saved = self
            .commit_with_retry(order, move |o| {
                let mut mutated = o.clone();
                mutated.status = OrderStatus::Canceled;
                mutated.updated_at = now;
                let outbox = vec![status_event(&mutated, "OrderSagaFailed", now, &reason)];
                let timeline = vec![TimelineEvent::saga_failed(mutated.id, reason.clone(), now)];
                (mutated, outbox, timeline)
            })
            .await?;
        self.broker.publish(saved.id, SagaEvent::Failed).await;
        Ok(saved)
    }

    /// Advances `order` to `new_status`, emitting a commit-coupled
    /// `OrderStatusChanged` outbox message and timeline entry.
    async fn update_status(&self, order: Order, new_status: OrderStatus) -> Result<Order> {
        let now = Utc::now();
        self.commit_with_retry(order, move |o| {
            let mut mutated = o.clone();
            mutated.status = new_status;
            mutated.updated_at = now;
            let outbox = vec![status_event(&mutated, "OrderStatusChanged", now, new_status.as_str())];
            let timeline = vec![TimelineEvent::status_changed(mutated.id, new_status.as_str(), now)];
            (mutated, outbox, timeline)
        })
        .await
    }

    /// The `updateStatus` retry protocol (§4.6): attempt the
    /// commit-coupled write `build` describes; on a version conflict,
    /// reload the order and retry with exponential backoff starting at
    /// `BASE_DELAY`, up to `MAX_RETRIES` additional attempts.
    async fn commit_with_retry<F>(&self, mut order: Order, mut build: F) -> Result<Order>
    where
        F: FnMut(&Order) -> (Order, Vec<NewOutboxMessage>, Vec<TimelineEvent>),
    {
        for attempt in 0..=MAX_RETRIES {
            let (mutated, outbox, timeline) = build(&order);
            match self
                .storage
                .commit_order_transition(mutated, outbox, timeline)
                .await
            {
                Ok(saved) => return Ok(saved),
                Err(StorageError::Conflict(_)) if attempt < MAX_RETRIES => {
                    tokio::time::sleep(BASE_DELAY * 2u32.pow(attempt)).await;
                    order = self.storage.get(order.id).await?;
                }
                Err(StorageError::Conflict(_)) => {
                    return Err(SagaError::RetriesExhausted(order.id));
                }
                Err(e) => return Err(e.into()),
            }
        }
        unreachable!("loop always returns within MAX_RETRIES + 1 iterations")
    }
}

fn status_event(order: &Order, event_type: &str, ts: DateTime<Utc>, reason: &str) -> NewOutboxMessage {
    status_event_with_amount(order, event_type, ts, reason, None)
}

/// Like `status_event`, but carries the refunded amount for
/// `OrderRefunded` (§4.6, §6's envelope).
fn status_event_with_amount(
    order: &Order,
    event_type: &str,
    ts: DateTime<Utc>,
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

#[cfg(test)]
mod tests {
    use super::*;
    use common::CustomerId;
    use domain::{InMemoryInventoryService, InMemoryPaymentService, OrderItemInput};
    use storage::InMemoryStorage;

    fn orchestrator() -> (
        SagaOrchestrator<InMemoryStorage, InMemoryInventoryService, InMemoryPaymentService>,
        InMemoryStorage,
        InMemoryInventoryService,
        InMemoryPaymentService,
    ) {
        let storage = InMemoryStorage::new();
        let inventory = InMemoryInventoryService::new();
        let payment = InMemoryPaymentService::new();
        let orchestrator =
            SagaOrchestrator::new(storage.clone(), inventory.clone(), payment.clone());
        (orchestrator, storage, inventory, payment)
    }

    async fn seed_order(storage: &InMemoryStorage) -> OrderId {
        let order = Order::create(
            CustomerId::new(),
            "USD",
            vec![OrderItemInput {
                sku: "SKU-001".into(),
                qty: 2,
                price_minor: 1000,
            }],
            Utc::now(),
        )
        .unwrap();
        let id = order.id;
        storage.create(order).await.unwrap();
        id
    }

    #[tokio::test]
    async fn happy_path_reaches_confirmed() {
        let (orchestrator, storage, inventory, payment) = orchestrator();
        let order_id = seed_order(&storage).await;

        orchestrator.start(order_id).await.unwrap();

        let order = storage.get(order_id).await.unwrap();
        assert_eq!(order.status, OrderStatus::Confirmed);
        assert_eq!(inventory.reservation_count(), 1);
        assert_eq!(payment.payment_count(), 1);
    }

    #[tokio::test]
    async fn inventory_failure_cancels_order() {
        let (orchestrator, storage, inventory, payment) = orchestrator();
        let order_id = seed_order(&storage).await;
        inventory.set_fail_on_reserve(true);

        orchestrator.start(order_id).await.unwrap();

        let order = storage.get(order_id).await.unwrap();
        assert_eq!(order.status, OrderStatus::Canceled);
        assert_eq!(payment.payment_count(), 0);
    }

    #[tokio::test]
    async fn payment_failure_releases_reservation_and_cancels() {
        let (orchestrator, storage, inventory, payment) = orchestrator();
        let order_id = seed_order(&storage).await;
        payment.set_fail_on_pay(true);

        orchestrator.start(order_id).await.unwrap();

        let order = storage.get(order_id).await.unwrap();
        assert_eq!(order.status, OrderStatus::Canceled);
        assert_eq!(inventory.reservation_count(), 0);
    }

    #[tokio::test]
    async fn start_on_terminal_order_is_a_noop() {
        let (orchestrator, storage, _inventory, _payment) = orchestrator();
        let order_id = seed_order(&storage).await;
        orchestrator.start(order_id).await.unwrap();
        orchestrator.start(order_id).await.unwrap();

        let order = storage.get(order_id).await.unwrap();
        assert_eq!(order.status, OrderStatus::Confirmed);
    }

    #[tokio::test]
    async fn cancel_on_pending_order_releases_nothing_but_transitions() {
        let (orchestrator, storage, inventory, payment) = orchestrator();
        let order_id = seed_order(&storage).await;

        orchestrator.cancel(order_id, "changed my mind".into()).await.unwrap();

        let order = storage.get(order_id).await.unwrap();
        assert_eq!(order.status, OrderStatus::Canceled);
        assert_eq!(inventory.reservation_count(), 0);
        assert_eq!(payment.payment_count(), 0);
    }

    #[tokio::test]
    async fn cancel_on_already_canceled_order_is_a_noop() {
        let (orchestrator, storage, _inventory, _payment) = orchestrator();
        let order_id = seed_order(&storage).await;
        orchestrator.cancel(order_id, "first".into()).await.unwrap();
        let before = storage.get(order_id).await.unwrap();

        orchestrator.cancel(order_id, "second".into()).await.unwrap();
        let after = storage.get(order_id).await.unwrap();
        assert_eq!(before.version, after.version);
    }

    #[tokio::test]
    async fn cancel_after_confirm_releases_nothing_and_refunds() {
        let (orchestrator, storage, inventory, payment) = orchestrator();
        let order_id = seed_order(&storage).await;
        orchestrator.start(order_id).await.unwrap();

        orchestrator.cancel(order_id, "too late".into()).await.unwrap();

        let order = storage.get(order_id).await.unwrap();
        assert_eq!(order.status, OrderStatus::Canceled);
        assert_eq!(inventory.reservation_count(), 0);
        assert_eq!(payment.payment_count(), 0);
    }

    #[tokio::test]
    async fn refund_after_confirm_transitions_to_refunded() {
        let (orchestrator, storage, inventory, payment) = orchestrator();
        let order_id = seed_order(&storage).await;
        orchestrator.start(order_id).await.unwrap();

        orchestrator.refund(order_id, 2000, "customer request".into()).await.unwrap();

        let order = storage.get(order_id).await.unwrap();
        assert_eq!(order.status, OrderStatus::Refunded);
        assert_eq!(payment.payment_count(), 0);
        assert_eq!(inventory.reservation_count(), 0);
    }

    #[tokio::test]
    async fn refund_clamps_out_of_range_amount_to_full_total() {
        let (orchestrator, storage, _inventory, payment) = orchestrator();
        let order_id = seed_order(&storage).await;
        orchestrator.start(order_id).await.unwrap();

        orchestrator.refund(order_id, 0, "clamp to full".into()).await.unwrap();

        let order = storage.get(order_id).await.unwrap();
        assert_eq!(order.status, OrderStatus::Refunded);
        assert_eq!(payment.payment_count(), 0);
    }

    #[tokio::test]
    async fn refund_on_pending_order_is_a_noop() {
        let (orchestrator, storage, _inventory, _payment) = orchestrator();
        let order_id = seed_order(&storage).await;

        orchestrator.refund(order_id, 100, "too early".into()).await.unwrap();

        let order = storage.get(order_id).await.unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
    }

    #[tokio::test]
    async fn refund_on_already_refunded_order_is_a_noop() {
        let (orchestrator, storage, _inventory, _payment) = orchestrator();
        let order_id = seed_order(&storage).await;
        orchestrator.start(order_id).await.unwrap();
        orchestrator.refund(order_id, 2000, "first".into()).await.unwrap();
        let before = storage.get(order_id).await.unwrap();

        orchestrator.refund(order_id, 2000, "second".into()).await.unwrap();
        let after = storage.get(order_id).await.unwrap();
        assert_eq!(before.version, after.version);
    }
}
