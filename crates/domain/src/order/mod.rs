//! The order aggregate: a state-based (not event-sourced) root with a
//! monotonic version counter maintained by whichever repository persists
//! it (see `storage::OrderRepository::save`).

pub mod item;
pub mod status;

pub use item::{OrderItem, OrderItemInput};
pub use status::OrderStatus;

use chrono::{DateTime, Utc};
use common::{CustomerId, OrderId};
use serde::{Deserialize, Serialize};

use crate::error::OmsError;

/// The order aggregate root.
///
/// Invariants (§3), enforced at construction and never violated by any
/// in-process mutation: `amount_minor` equals Σ(item.qty × item.price);
/// `currency` equals every item's currency; `items` is non-empty; every
/// item has `qty > 0` and `price_minor >= 0`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub customer_id: CustomerId,
    pub status: OrderStatus,
    pub currency: String,
    pub amount_minor: i64,
    pub items: Vec<OrderItem>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Validates and constructs a brand new order in `Pending` status,
    /// version 0 (the repository assigns version 1 on the first
    /// successful save — see `storage::OrderRepository::create`).
    ///
    /// Mirrors the RPC facade's Create validation (§4.10): non-empty
    /// customer implied by the typed `CustomerId`, non-empty currency,
    /// non-empty items, each item with `qty > 0` and `price_minor >= 0`
    /// and matching the order currency, amount computed as the
    /// overflow-checked sum of `qty * price_minor`.
    pub fn create(
        customer_id: CustomerId,
        currency: impl Into<String>,
        items: Vec<OrderItemInput>,
        now: DateTime<Utc>,
    ) -> Result<Self, OmsError> {
        let currency = currency.into();
        validate_currency(&currency)?;

        if items.is_empty() {
            return Err(OmsError::InvalidArgument(
                "order must have at least one item".into(),
            ));
        }

        let mut built_items = Vec::with_capacity(items.len());
        let mut amount_minor: i64 = 0;

        for input in items {
            if input.qty == 0 {
                return Err(OmsError::InvalidArgument(format!(
                    "item {} has non-positive quantity",
                    input.sku
                )));
            }
            if input.price_minor < 0 {
                return Err(OmsError::InvalidArgument(format!(
                    "item {} has negative price",
                    input.sku
                )));
            }

            let item = input.into_item(now);
            let line_total = item
                .total_minor()
                .ok_or_else(|| OmsError::InvalidArgument("order amount overflow".into()))?;
            amount_minor = amount_minor
                .checked_add(line_total)
                .ok_or_else(|| OmsError::InvalidArgument("order amount overflow".into()))?;

            built_items.push(item);
        }

        Ok(Order {
            id: OrderId::new(),
            customer_id,
            status: OrderStatus::Pending,
            currency,
            amount_minor,
            items: built_items,
            version: 0,
            created_at: now,
            updated_at: now,
        })
    }

    /// Recomputes `amount_minor` from `items` and checks it matches the
    /// stored value — used by tests and by the storage layer when
    /// deserializing a row to catch data corruption early.
    pub fn check_amount_invariant(&self) -> bool {
        let sum: Option<i64> = self
            .items
            .iter()
            .try_fold(0i64, |acc, item| Some(acc.checked_add(item.total_minor()?)?));
        sum == Some(self.amount_minor)
    }
}

fn validate_currency(currency: &str) -> Result<(), OmsError> {
    if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(OmsError::InvalidArgument(format!(
            "currency must be 3 letters, got {currency:?}"
        )));
    }
    Ok(())
}
