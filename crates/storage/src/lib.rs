//! Repository layer for the order management service.
//!
//! Four repositories — order, outbox, timeline, idempotency — each with
//! an in-memory and a Postgres implementation. There is no event-sourced
//! aggregate history here: the order aggregate is state-based, and the
//! only append-only log in this crate is the outbox.

pub mod backend;
pub mod error;
pub mod idempotency;
pub mod memory;
pub mod order_repo;
pub mod outbox;
pub mod postgres;
pub mod timeline_repo;

pub use backend::StorageBackend;
pub use error::StorageError;
pub use idempotency::{CreateProcessingOutcome, IdempotencyRecord, IdempotencyRepository, IdempotencyStatus};
pub use memory::InMemoryStorage;
pub use order_repo::OrderRepository;
pub use outbox::{NewOutboxMessage, OutboxMessage, OutboxRepository, OutboxStats, OutboxStatus};
pub use postgres::PostgresStorage;
pub use timeline_repo::TimelineRepository;
