//! Order line items.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single line item on an order.
///
/// Items are set once at order creation (§3: "items (non-empty ordered
/// sequence)") — there is no add/remove/update-quantity operation on an
/// existing order anywhere in this spec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: Uuid,
    pub sku: String,
    pub qty: u32,
    pub price_minor: i64,
    pub created_at: DateTime<Utc>,
}

impl OrderItem {
    /// Returns the total price for this item: qty * price_minor.
    pub fn total_minor(&self) -> Option<i64> {
        i64::from(self.qty).checked_mul(self.price_minor)
    }
}

/// The caller-supplied shape of a line item before it is assigned an id
/// and timestamp (what `CreateOrder` accepts).
#[derive(Debug, Clone, Deserialize)]
pub struct OrderItemInput {
    pub sku: String,
    pub qty: u32,
    pub price_minor: i64,
}

impl OrderItemInput {
    pub fn into_item(self, now: DateTime<Utc>) -> OrderItem {
        OrderItem {
            id: Uuid::new_v4(),
            sku: self.sku,
            qty: self.qty,
            price_minor: self.price_minor,
            created_at: now,
        }
    }
}
