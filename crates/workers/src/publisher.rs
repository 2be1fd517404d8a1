//! The outbox publisher worker (§4.7): drains pending outbox messages on a
//! polling loop, retries with exponential backoff, and routes exhausted
//! messages to a dead-letter sink.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use storage::{OutboxMessage, OutboxRepository};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::Result;

#[derive(Debug, Error)]
#[error("publish error: {0}")]
pub struct PublishError(pub String);

/// The broker-facing side of the outbox: actual delivery is out of scope,
/// so callers wire a real implementation behind this trait.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, message: &OutboxMessage) -> std::result::Result<(), PublishError>;
}

/// Logs every message as published. The default when no broker is wired.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogPublisher;

#[async_trait]
impl Publisher for LogPublisher {
    async fn publish(&self, message: &OutboxMessage) -> std::result::Result<(), PublishError> {
        tracing::info!(id = message.id, event_type = %message.event_type, "publishing outbox message");
        Ok(())
    }
}

/// A message that exhausted its publish attempts, mirrored to the
/// dead-letter channel for out-of-band inspection.
#[derive(Debug, Clone)]
pub struct DlqEnvelope {
    pub outbox_id: i64,
    pub aggregate_type: String,
    pub aggregate_id: Uuid,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub publish_error: String,
    pub dlq_published_at: chrono::DateTime<Utc>,
}

#[async_trait]
pub trait DlqSink: Send + Sync {
    async fn mirror(&self, envelope: DlqEnvelope) -> std::result::Result<(), PublishError>;
}

/// Logs the dead-lettered envelope. The default when no DLQ channel is
/// wired.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDlqSink;

#[async_trait]
impl DlqSink for LogDlqSink {
    async fn mirror(&self, envelope: DlqEnvelope) -> std::result::Result<(), PublishError> {
        tracing::error!(
            outbox_id = envelope.outbox_id,
            error = %envelope.publish_error,
            "outbox message routed to dead letter"
        );
        Ok(())
    }
}

/// Mirrors a dead-lettered envelope toward the configured brokers (§6's
/// `broker-brokers`). Behaves like `LogDlqSink` when no brokers are
/// configured; kept as a single concrete type with internal branching
/// (rather than a second `DlqSink` picked at the type level) so
/// `OutboxPublisherWorker`'s sink type parameter stays fixed regardless
/// of whether `broker-brokers` is set.
#[derive(Debug, Clone, Default)]
pub struct BrokerDlqSink {
    brokers: Option<Vec<String>>,
}

impl BrokerDlqSink {
    /// No brokers configured: mirrors exactly like `LogDlqSink`.
    pub fn disabled() -> Self {
        Self { brokers: None }
    }

    /// At least one broker configured: mirror logs include the targets.
    pub fn enabled(brokers: Vec<String>) -> Self {
        Self { brokers: Some(brokers) }
    }
}

#[async_trait]
impl DlqSink for BrokerDlqSink {
    async fn mirror(&self, envelope: DlqEnvelope) -> std::result::Result<(), PublishError> {
        let Some(brokers) = &self.brokers else {
            tracing::error!(
                outbox_id = envelope.outbox_id,
                error = %envelope.publish_error,
                "outbox message routed to dead letter"
            );
            return Ok(());
        };
        tracing::error!(
            outbox_id = envelope.outbox_id,
            error = %envelope.publish_error,
            brokers = %brokers.join(","),
            "outbox message routed to dead-letter topic"
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct OutboxPublisherConfig {
    pub poll_interval: Duration,
    pub batch_size: i64,
    pub max_attempts: u32,
    pub retry_base_delay: Duration,
}

impl Default for OutboxPublisherConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            batch_size: 100,
            max_attempts: 3,
            retry_base_delay: Duration::from_millis(50),
        }
    }
}

/// Polls `repo` for pending outbox messages and publishes them via
/// `publisher`, retrying with exponential backoff up to
/// `config.max_attempts` before mirroring to `dlq`.
pub struct OutboxPublisherWorker<R, P, D = LogDlqSink>
where
    R: OutboxRepository,
    P: Publisher,
    D: DlqSink,
{
    repo: R,
    publisher: P,
    dlq: D,
    config: OutboxPublisherConfig,
}

impl<R, P> OutboxPublisherWorker<R, P, LogDlqSink>
where
    R: OutboxRepository,
    P: Publisher,
{
    pub fn new(repo: R, publisher: P, config: OutboxPublisherConfig) -> Self {
        Self {
            repo,
            publisher,
            dlq: LogDlqSink,
            config,
        }
    }
}

impl<R, P, D> OutboxPublisherWorker<R, P, D>
where
    R: OutboxRepository,
    P: Publisher,
    D: DlqSink,
{
    pub fn with_dlq(repo: R, publisher: P, dlq: D, config: OutboxPublisherConfig) -> Self {
        Self {
            repo,
            publisher,
            dlq,
            config,
        }
    }

    /// Runs the poll loop until `token` is cancelled.
    #[tracing::instrument(skip(self, token))]
    pub async fn run(&self, token: CancellationToken) {
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    tracing::info!("outbox publisher worker cancelled");
                    return;
                }
                _ = tokio::time::sleep(self.config.poll_interval) => {
                    if let Err(e) = self.run_once(&token).await {
                        tracing::error!(error = %e, "outbox publisher tick failed");
                    }
                }
            }
        }
    }

    /// Pulls and publishes a single pending batch. `run` calls this on
    /// every tick; exposed directly for benchmarks and tests that don't
    /// want to drive the full poll loop.
    #[tracing::instrument(skip(self, token))]
    pub async fn run_once(&self, token: &CancellationToken) -> Result<()> {
        let stats = self.repo.stats().await?;
        metrics::gauge!("outbox_pending_count").set(stats.pending_count as f64);
        if let Some(oldest) = stats.oldest_pending_at {
            let age_seconds = (Utc::now() - oldest).num_milliseconds().max(0) as f64 / 1000.0;
            metrics::gauge!("outbox_oldest_pending_age_seconds").set(age_seconds);
        }

        let batch = self.repo.pull_pending(self.config.batch_size).await?;
        for message in batch {
            if token.is_cancelled() {
                return Ok(());
            }
            self.publish_with_retry(&message, token).await?;
        }
        Ok(())
    }

    async fn publish_with_retry(&self, message: &OutboxMessage, token: &CancellationToken) -> Result<()> {
        let mut delay = self.config.retry_base_delay;
        let backoff_cap = Duration::from_nanos(i64::MAX as u64);

        for attempt in 0..self.config.max_attempts {
            let outcome = tokio::select! {
                _ = token.cancelled() => return Ok(()),
                outcome = self.publisher.publish(message) => outcome,
            };

            match outcome {
                Ok(()) => {
                    self.repo.mark_sent(message.id).await?;
                    metrics::counter!("outbox_published_total").increment(1);
                    return Ok(());
                }
                Err(e) if attempt + 1 < self.config.max_attempts => {
                    tracing::warn!(id = message.id, attempt, error = %e, "publish attempt failed, retrying");
                    tokio::select! {
                        _ = token.cancelled() => return Ok(()),
                        _ = tokio::time::sleep(delay) => {}
                    }
                    delay = delay.saturating_mul(2).min(backoff_cap);
                }
                Err(e) => {
                    tracing::error!(id = message.id, error = %e, "publish attempts exhausted");
                    self.repo.mark_failed(message.id).await?;
                    metrics::counter!("outbox_failed_total").increment(1);

                    let envelope = DlqEnvelope {
                        outbox_id: message.id,
                        aggregate_type: message.aggregate_type.clone(),
                        aggregate_id: message.aggregate_id,
                        event_type: message.event_type.clone(),
                        payload: message.payload.clone(),
                        publish_error: e.to_string(),
                        dlq_published_at: Utc::now(),
                    };
                    if let Err(dlq_err) = self.dlq.mirror(envelope).await {
                        tracing::error!(id = message.id, error = %dlq_err, "dlq mirror failed");
                        metrics::counter!("outbox_dlq_failed_total").increment(1);
                    }
                    return Ok(());
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use storage::NewOutboxMessage;

    struct FlakyPublisher {
        fail_times: u32,
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl Publisher for FlakyPublisher {
        async fn publish(&self, _message: &OutboxMessage) -> std::result::Result<(), PublishError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_times {
                Err(PublishError("transient failure".into()))
            } else {
                Ok(())
            }
        }
    }

    fn fast_config() -> OutboxPublisherConfig {
        OutboxPublisherConfig {
            poll_interval: Duration::from_millis(1),
            batch_size: 10,
            max_attempts: 3,
            retry_base_delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn successful_publish_marks_sent() {
        let repo = storage::InMemoryStorage::new();
        let id = repo
            .enqueue(NewOutboxMessage {
                aggregate_type: "Order".into(),
                aggregate_id: Uuid::new_v4(),
                event_type: "OrderStatusChanged".into(),
                payload: serde_json::json!({}),
            })
            .await
            .unwrap();

        let worker = OutboxPublisherWorker::new(repo.clone(), LogPublisher, fast_config());
        worker.run_once(&CancellationToken::new()).await.unwrap();

        let pending = repo.pull_pending(10).await.unwrap();
        assert!(pending.is_empty());
        let _ = id;
    }

    #[tokio::test]
    async fn retries_then_succeeds_within_max_attempts() {
        let repo = storage::InMemoryStorage::new();
        repo.enqueue(NewOutboxMessage {
            aggregate_type: "Order".into(),
            aggregate_id: Uuid::new_v4(),
            event_type: "OrderStatusChanged".into(),
            payload: serde_json::json!({}),
        })
        .await
        .unwrap();

        let calls = Arc::new(AtomicU32::new(0));
        let publisher = FlakyPublisher {
            fail_times: 2,
            calls: calls.clone(),
        };
        let worker = OutboxPublisherWorker::new(repo.clone(), publisher, fast_config());
        worker.run_once(&CancellationToken::new()).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let pending = repo.pull_pending(10).await.unwrap();
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn exhausted_retries_marks_failed_and_mirrors_to_dlq() {
        let repo = storage::InMemoryStorage::new();
        repo.enqueue(NewOutboxMessage {
            aggregate_type: "Order".into(),
            aggregate_id: Uuid::new_v4(),
            event_type: "OrderStatusChanged".into(),
            payload: serde_json::json!({}),
        })
        .await
        .unwrap();

        let calls = Arc::new(AtomicU32::new(0));
        let publisher = FlakyPublisher {
            fail_times: u32::MAX,
            calls: calls.clone(),
        };
        let worker = OutboxPublisherWorker::new(repo.clone(), publisher, fast_config());
        worker.run_once(&CancellationToken::new()).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let pending = repo.pull_pending(10).await.unwrap();
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn cancellation_stops_before_publishing() {
        let repo = storage::InMemoryStorage::new();
        repo.enqueue(NewOutboxMessage {
            aggregate_type: "Order".into(),
            aggregate_id: Uuid::new_v4(),
            event_type: "OrderStatusChanged".into(),
            payload: serde_json::json!({}),
        })
        .await
        .unwrap();

        let token = CancellationToken::new();
        token.cancel();

        let worker = OutboxPublisherWorker::new(repo.clone(), LogPublisher, fast_config());
        worker.run_once(&token).await.unwrap();

        let pending = repo.pull_pending(10).await.unwrap();
        assert_eq!(pending.len(), 1);
    }
}
