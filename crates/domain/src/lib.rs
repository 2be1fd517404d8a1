//! Domain layer for the order management service.
//!
//! This crate owns the `Order` aggregate and its invariants, the
//! timeline audit log entry type, the inventory/payment port traits
//! (with in-memory mocks), and the service-wide error kind taxonomy.
//! It has no storage or transport dependency: repositories live in
//! `storage`, the saga orchestrator in `saga`, and the RPC facade in
//! `api`.

pub mod error;
pub mod order;
pub mod ports;
pub mod timeline;

pub use error::OmsError;
pub use order::{Order, OrderItem, OrderItemInput, OrderStatus};
pub use ports::{
    InMemoryInventoryService, InMemoryPaymentService, InventoryService, PayOutcome,
    PaymentService, RefundOutcome,
};
pub use timeline::{TimelineEvent, TimelineEventType};
