//! Background workers that keep storage honest after the saga commits
//! (§4.7, §4.9): the outbox publisher drains queued events toward the
//! broker, and the idempotency cleanup worker sweeps expired dedup
//! records. Neither holds any state the saga or API crates depend on
//! directly; both run off `storage::StorageBackend`'s component traits.

pub mod cleanup;
pub mod error;
pub mod publisher;

pub use cleanup::{IdempotencyCleanupConfig, IdempotencyCleanupWorker};
pub use error::{Result, WorkerError};
pub use publisher::{
    BrokerDlqSink, DlqEnvelope, DlqSink, LogDlqSink, LogPublisher, OutboxPublisherConfig,
    OutboxPublisherWorker, PublishError, Publisher,
};
