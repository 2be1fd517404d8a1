//! External-effect ports: narrow interfaces for inventory and payment
//! (§4.5), the only two collaborators the saga orchestrator calls out to.

pub mod inventory;
pub mod payment;

pub use inventory::{InMemoryInventoryService, InventoryService};
pub use payment::{InMemoryPaymentService, PayOutcome, PaymentService, RefundOutcome};
