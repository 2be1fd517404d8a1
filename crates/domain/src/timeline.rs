//! The per-order audit log (§3, §4.3).

use chrono::{DateTime, Utc};
use common::OrderId;
use serde::{Deserialize, Serialize};

/// The kind of timeline entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimelineEventType {
    OrderStatusChanged,
    OrderCanceled,
    OrderRefunded,
    OrderSagaFailed,
}

impl TimelineEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimelineEventType::OrderStatusChanged => "OrderStatusChanged",
            TimelineEventType::OrderCanceled => "OrderCanceled",
            TimelineEventType::OrderRefunded => "OrderRefunded",
            TimelineEventType::OrderSagaFailed => "OrderSagaFailed",
        }
    }
}

/// A single append-only entry in an order's audit trail.
///
/// Ordered by `occurred_at` ascending, then insertion order for ties
/// (§4.3) — the storage layer assigns a monotonic `seq` per order to
/// make that tie-break concrete (see the `timeline` table in §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub order_id: OrderId,
    pub event_type: TimelineEventType,
    /// Free-form reason: the status name for status-change entries, or
    /// the caller-supplied reason for cancel/refund/fail entries (§4.6).
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

impl TimelineEvent {
    pub fn status_changed(order_id: OrderId, status: &str, occurred_at: DateTime<Utc>) -> Self {
        Self {
            order_id,
            event_type: TimelineEventType::OrderStatusChanged,
            reason: status.to_string(),
            occurred_at,
        }
    }

    pub fn canceled(order_id: OrderId, reason: impl Into<String>, occurred_at: DateTime<Utc>) -> Self {
        Self {
            order_id,
            event_type: TimelineEventType::OrderCanceled,
            reason: reason.into(),
            occurred_at,
        }
    }

    pub fn refunded(order_id: OrderId, reason: impl Into<String>, occurred_at: DateTime<Utc>) -> Self {
        Self {
            order_id,
            event_type: TimelineEventType::OrderRefunded,
            reason: reason.into(),
            occurred_at,
        }
    }

    pub fn saga_failed(order_id: OrderId, reason: impl Into<String>, occurred_at: DateTime<Utc>) -> Self {
        Self {
            order_id,
            event_type: TimelineEventType::OrderSagaFailed,
            reason: reason.into(),
            occurred_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_changed_carries_status_as_reason() {
        let event = TimelineEvent::status_changed(OrderId::new(), "RESERVED", Utc::now());
        assert_eq!(event.reason, "RESERVED");
        assert_eq!(event.event_type.as_str(), "OrderStatusChanged");
    }

    #[test]
    fn canceled_carries_user_reason() {
        let event = TimelineEvent::canceled(OrderId::new(), "user", Utc::now());
        assert_eq!(event.reason, "user");
        assert_eq!(event.event_type.as_str(), "OrderCanceled");
    }
}
