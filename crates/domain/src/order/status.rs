//! Order status state machine.

use serde::{Deserialize, Serialize};

/// The status of an order in its lifecycle.
///
/// ```text
/// Pending ──► Reserved ──► Paid ──► Confirmed
///    │            │          │
///    └────────────┴──────────┴──► Canceled
///                             └──► Refunded (from Paid or Confirmed)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OrderStatus {
    /// Order created, not yet reserved.
    #[default]
    Pending,

    /// Inventory has been reserved for this order.
    Reserved,

    /// Payment has been captured.
    Paid,

    /// The order has been fully confirmed (terminal, happy path).
    Confirmed,

    /// The order was canceled before or after reservation/payment
    /// (terminal).
    Canceled,

    /// A previously paid or confirmed order was refunded (terminal).
    Refunded,
}

impl OrderStatus {
    /// Returns true if this is a terminal status — no further saga
    /// transition applies.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Confirmed | OrderStatus::Canceled | OrderStatus::Refunded
        )
    }

    /// Returns true if a refund can be issued from this status (§4.6:
    /// refund only applies to Paid or Confirmed orders).
    pub fn can_refund(&self) -> bool {
        matches!(self, OrderStatus::Paid | OrderStatus::Confirmed)
    }

    /// Returns true if canceling this status requires releasing
    /// inventory (§4.6: Reserved, Paid, Confirmed all hold a
    /// reservation).
    pub fn holds_reservation(&self) -> bool {
        matches!(
            self,
            OrderStatus::Reserved | OrderStatus::Paid | OrderStatus::Confirmed
        )
    }

    /// Returns true if canceling this status requires a payment refund
    /// (§4.6: Paid or Confirmed).
    pub fn holds_payment(&self) -> bool {
        matches!(self, OrderStatus::Paid | OrderStatus::Confirmed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Reserved => "RESERVED",
            OrderStatus::Paid => "PAID",
            OrderStatus::Confirmed => "CONFIRMED",
            OrderStatus::Canceled => "CANCELED",
            OrderStatus::Refunded => "REFUNDED",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(OrderStatus::Pending),
            "RESERVED" => Ok(OrderStatus::Reserved),
            "PAID" => Ok(OrderStatus::Paid),
            "CONFIRMED" => Ok(OrderStatus::Confirmed),
            "CANCELED" => Ok(OrderStatus::Canceled),
            "REFUNDED" => Ok(OrderStatus::Refunded),
            other => Err(format!("unknown order status: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_status_is_pending() {
        assert_eq!(OrderStatus::default(), OrderStatus::Pending);
    }

    #[test]
    fn terminal_statuses() {
        assert!(!OrderStatus::Pending.is_terminal());
        assert!(!OrderStatus::Reserved.is_terminal());
        assert!(!OrderStatus::Paid.is_terminal());
        assert!(OrderStatus::Confirmed.is_terminal());
        assert!(OrderStatus::Canceled.is_terminal());
        assert!(OrderStatus::Refunded.is_terminal());
    }

    #[test]
    fn refund_eligibility() {
        assert!(!OrderStatus::Pending.can_refund());
        assert!(!OrderStatus::Reserved.can_refund());
        assert!(OrderStatus::Paid.can_refund());
        assert!(OrderStatus::Confirmed.can_refund());
        assert!(!OrderStatus::Canceled.can_refund());
        assert!(!OrderStatus::Refunded.can_refund());
    }

    #[test]
    fn reservation_and_payment_holds() {
        assert!(!OrderStatus::Pending.holds_reservation());
        assert!(OrderStatus::Reserved.holds_reservation());
        assert!(OrderStatus::Paid.holds_payment());
        assert!(!OrderStatus::Reserved.holds_payment());
    }

    #[test]
    fn display_and_parse_roundtrip() {
        for status in [
            OrderStatus::Pending,
            OrderStatus::Reserved,
            OrderStatus::Paid,
            OrderStatus::Confirmed,
            OrderStatus::Canceled,
            OrderStatus::Refunded,
        ] {
            let s = status.to_string();
            assert_eq!(s.parse::<OrderStatus>().unwrap(), status);
        }
    }

    #[test]
    fn serialization_roundtrip() {
        let status = OrderStatus::Reserved;
        let json = serde_json::to_string(&status).unwrap();
        let back: OrderStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(status, back);
    }
}
