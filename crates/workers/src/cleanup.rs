//! The idempotency cleanup worker (§4.9): sweeps expired idempotency
//! records in batches on the same cancellation-token-driven loop shape as
//! the outbox publisher, so the two workers read as siblings.

use std::time::Duration;

use storage::IdempotencyRepository;
use tokio_util::sync::CancellationToken;

use crate::error::Result;

#[derive(Debug, Clone, Copy)]
pub struct IdempotencyCleanupConfig {
    pub interval: Duration,
    pub batch_size: i64,
}

impl Default for IdempotencyCleanupConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            batch_size: 100,
        }
    }
}

pub struct IdempotencyCleanupWorker<R: IdempotencyRepository> {
    repo: R,
    config: IdempotencyCleanupConfig,
}

impl<R: IdempotencyRepository> IdempotencyCleanupWorker<R> {
    pub fn new(repo: R, config: IdempotencyCleanupConfig) -> Self {
        Self { repo, config }
    }

    /// Runs the sweep loop until `token` is cancelled.
    #[tracing::instrument(skip(self, token))]
    pub async fn run(&self, token: CancellationToken) {
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    tracing::info!("idempotency cleanup worker cancelled");
                    return;
                }
                _ = tokio::time::sleep(self.config.interval) => {
                    if let Err(e) = self.run_once(&token).await {
                        tracing::error!(error = %e, "idempotency cleanup sweep failed");
                    }
                }
            }
        }
    }

    /// Keeps deleting batches until a batch comes back short of
    /// `config.batch_size`, meaning the backlog is drained. `run` calls
    /// this on every tick; exposed directly for tests and benchmarks.
    #[tracing::instrument(skip(self, token))]
    pub async fn run_once(&self, token: &CancellationToken) -> Result<()> {
        loop {
            if token.is_cancelled() {
                return Ok(());
            }
            let deleted = self
                .repo
                .delete_expired(chrono::Utc::now(), self.config.batch_size)
                .await?;
            metrics::counter!("idempotency_records_expired_total").increment(deleted as u64);
            if deleted < self.config.batch_size {
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, Utc};
    use storage::InMemoryStorage;

    fn fast_config(batch_size: i64) -> IdempotencyCleanupConfig {
        IdempotencyCleanupConfig {
            interval: Duration::from_millis(1),
            batch_size,
        }
    }

    #[tokio::test]
    async fn sweep_deletes_expired_records_in_batches() {
        let repo = InMemoryStorage::new();
        for i in 0..5 {
            repo.create_processing(
                &format!("key-{i}"),
                "hash",
                Utc::now() - ChronoDuration::seconds(1),
            )
            .await
            .unwrap();
        }

        let worker = IdempotencyCleanupWorker::new(repo.clone(), fast_config(2));
        worker.run_once(&CancellationToken::new()).await.unwrap();

        let remaining = repo.delete_expired(Utc::now(), 100).await.unwrap();
        assert_eq!(remaining, 0);
    }

    #[tokio::test]
    async fn sweep_leaves_unexpired_records_alone() {
        let repo = InMemoryStorage::new();
        repo.create_processing("key-future", "hash", Utc::now() + ChronoDuration::hours(1))
            .await
            .unwrap();

        let worker = IdempotencyCleanupWorker::new(repo.clone(), fast_config(10));
        worker.run_once(&CancellationToken::new()).await.unwrap();

        let deleted = repo
            .delete_expired(Utc::now() + ChronoDuration::hours(2), 10)
            .await
            .unwrap();
        assert_eq!(deleted, 1);
    }

    #[tokio::test]
    async fn cancellation_stops_mid_sweep() {
        let repo = InMemoryStorage::new();
        for i in 0..5 {
            repo.create_processing(
                &format!("key-{i}"),
                "hash",
                Utc::now() - ChronoDuration::seconds(1),
            )
            .await
            .unwrap();
        }

        let token = CancellationToken::new();
        token.cancel();

        let worker = IdempotencyCleanupWorker::new(repo.clone(), fast_config(2));
        worker.run_once(&token).await.unwrap();

        let deleted = repo.delete_expired(Utc::now(), 100).await.unwrap();
        assert_eq!(deleted, 5);
    }
}
