//! Optional broker-side publication of high-level saga events (§4.6).
//!
//! Advisory only: the outbox is the source of truth, this is a best-effort
//! side channel for consumers that want saga-level events (`Started`,
//! `StepReserved`, ...) rather than raw order status changes. Defaults to
//! a no-op so wiring a real broker is opt-in.

use async_trait::async_trait;
use common::OrderId;

/// A high-level saga lifecycle event, distinct from the order timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SagaEvent {
    Started,
    StepReserved,
    StepPaid,
    Completed,
    Canceled,
    Refunded,
    Failed,
}

impl SagaEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaEvent::Started => "Started",
            SagaEvent::StepReserved => "StepReserved",
            SagaEvent::StepPaid => "StepPaid",
            SagaEvent::Completed => "Completed",
            SagaEvent::Canceled => "Canceled",
            SagaEvent::Refunded => "Refunded",
            SagaEvent::Failed => "Failed",
        }
    }
}

#[async_trait]
pub trait BrokerProducer: Send + Sync {
    async fn publish(&self, order_id: OrderId, event: SagaEvent);
}

/// Default producer: does nothing. Used when no broker is wired.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopBrokerProducer;

#[async_trait]
impl BrokerProducer for NoopBrokerProducer {
    async fn publish(&self, _order_id: OrderId, _event: SagaEvent) {}
}

/// Logs each saga event when `broker-brokers` (§6) names at least one
/// broker; otherwise behaves exactly like `NoopBrokerProducer`. Kept as a
/// single concrete type (rather than a second `BrokerProducer` impl
/// selected at the type level) so callers can pick the behavior from a
/// runtime config value without threading an extra generic parameter
/// through `SagaOrchestrator`'s callers.
#[derive(Debug, Clone, Default)]
pub struct LogBrokerProducer {
    brokers: Option<Vec<String>>,
}

impl LogBrokerProducer {
    /// No brokers configured: publish is a no-op, same as
    /// `NoopBrokerProducer`.
    pub fn disabled() -> Self {
        Self { brokers: None }
    }

    /// At least one broker configured: publish logs the event.
    pub fn enabled(brokers: Vec<String>) -> Self {
        Self { brokers: Some(brokers) }
    }
}

#[async_trait]
impl BrokerProducer for LogBrokerProducer {
    async fn publish(&self, order_id: OrderId, event: SagaEvent) {
        let Some(brokers) = &self.brokers else {
            return;
        };
        tracing::info!(
            %order_id,
            event = event.as_str(),
            brokers = %brokers.join(","),
            "publishing saga event to broker"
        );
    }
}
