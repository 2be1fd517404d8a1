//! Order repository (§4.1): create/get/list/save against the `Order`
//! aggregate, with `save` as a conditional write keyed by (id, version).

use async_trait::async_trait;
use common::{CustomerId, OrderId};
use domain::Order;

use crate::error::Result;

#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Inserts a brand new order. Fails with `AlreadyExists` if `order.id`
    /// is already present.
    async fn create(&self, order: Order) -> Result<Order>;

    /// Fails with `NotFound` for unknown ids.
    async fn get(&self, id: OrderId) -> Result<Order>;

    /// Returns at most `limit` orders for the customer, in any stable
    /// order.
    async fn list_by_customer(&self, customer_id: CustomerId, limit: i64) -> Result<Vec<Order>>;

    /// Conditional write keyed by `(order.id, order.version)`: on success
    /// the stored version is `order.version + 1` and `updated_at` is
    /// refreshed; on a version mismatch this fails with `Conflict`.
    async fn save(&self, order: Order) -> Result<Order>;
}
