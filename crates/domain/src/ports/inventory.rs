//! Inventory port (§4.5): a narrow interface for reserving and releasing
//! stock, kept intentionally free of any reservation-id bookkeeping — the
//! spec's port is just reserve/release against an order id and its items.

use async_trait::async_trait;
use common::OrderId;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::OmsError;
use crate::order::OrderItem;

#[async_trait]
pub trait InventoryService: Send + Sync {
    async fn reserve(&self, order_id: OrderId, items: &[OrderItem]) -> Result<(), OmsError>;
    async fn release(&self, order_id: OrderId, items: &[OrderItem]) -> Result<(), OmsError>;
}

#[derive(Debug, Default)]
struct State {
    reservations: HashMap<OrderId, usize>,
    fail_on_reserve: bool,
}

/// In-memory inventory adapter for tests and the default (no real broker)
/// deployment. Mirrors the teacher's `InMemoryInventoryService` shape:
/// a lock-guarded map, a `set_fail_on_reserve` toggle, and inspection
/// methods used by tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryInventoryService {
    state: std::sync::Arc<RwLock<State>>,
}

impl InMemoryInventoryService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_on_reserve(&self, fail: bool) {
        self.state.write().unwrap().fail_on_reserve = fail;
    }

    pub fn reservation_count(&self) -> usize {
        self.state.read().unwrap().reservations.len()
    }

    pub fn has_reservation(&self, order_id: OrderId) -> bool {
        self.state.read().unwrap().reservations.contains_key(&order_id)
    }
}

#[async_trait]
impl InventoryService for InMemoryInventoryService {
    async fn reserve(&self, order_id: OrderId, items: &[OrderItem]) -> Result<(), OmsError> {
        let mut state = self.state.write().unwrap();
        if state.fail_on_reserve {
            return Err(OmsError::Unavailable("inventory unavailable".into()));
        }
        state.reservations.insert(order_id, items.len());
        Ok(())
    }

    async fn release(&self, order_id: OrderId, _items: &[OrderItem]) -> Result<(), OmsError> {
        let mut state = self.state.write().unwrap();
        state.reservations.remove(&order_id);
        Ok(())
    }
}
