//! The saga orchestrator for order fulfillment (§4.6).
//!
//! Coordinates inventory reservation and payment capture across
//! `Pending` → `Reserved` → `Paid` → `Confirmed`, compensating in reverse
//! on failure. Saga progress is not itself a replayable aggregate: it is
//! observed entirely through the order's `status` and its timeline,
//! written commit-coupled with the outbox via `storage::StorageBackend`.

pub mod broker;
pub mod error;
pub mod orchestrator;

pub use broker::{BrokerProducer, LogBrokerProducer, NoopBrokerProducer, SagaEvent};
pub use error::SagaError;
pub use orchestrator::SagaOrchestrator;
