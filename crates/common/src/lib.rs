//! Shared identifier types for the order management service.

pub mod ids;

pub use ids::{CustomerId, OrderId};
