use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use storage::{
    IdempotencyRepository, InMemoryStorage, NewOutboxMessage, OutboxMessage, OutboxRepository,
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use workers::{
    IdempotencyCleanupConfig, IdempotencyCleanupWorker, LogDlqSink, OutboxPublisherConfig,
    OutboxPublisherWorker, PublishError, Publisher,
};

struct CountingPublisher {
    published: Arc<AtomicU32>,
}

#[async_trait]
impl Publisher for CountingPublisher {
    async fn publish(&self, _message: &OutboxMessage) -> Result<(), PublishError> {
        self.published.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn outbox_worker_drains_queue_to_empty() {
    let storage = InMemoryStorage::new();
    for _ in 0..7 {
        storage
            .enqueue(NewOutboxMessage {
                aggregate_type: "Order".into(),
                aggregate_id: Uuid::new_v4(),
                event_type: "OrderStatusChanged".into(),
                payload: serde_json::json!({"status": "Reserved"}),
            })
            .await
            .unwrap();
    }

    let published = Arc::new(AtomicU32::new(0));
    let worker = OutboxPublisherWorker::with_dlq(
        storage.clone(),
        CountingPublisher {
            published: published.clone(),
        },
        LogDlqSink,
        OutboxPublisherConfig {
            poll_interval: Duration::from_millis(1),
            batch_size: 3,
            max_attempts: 3,
            retry_base_delay: Duration::from_millis(1),
        },
    );

    let token = CancellationToken::new();
    worker.run_once(&token).await.unwrap();
    worker.run_once(&token).await.unwrap();
    worker.run_once(&token).await.unwrap();

    assert_eq!(published.load(Ordering::SeqCst), 7);
    let stats = storage.stats().await.unwrap();
    assert_eq!(stats.pending_count, 0);
}

#[tokio::test]
async fn idempotency_worker_and_outbox_worker_run_concurrently_against_shared_storage() {
    let storage = InMemoryStorage::new();

    for i in 0..4 {
        storage
            .create_processing(
                &format!("client-key-{i}"),
                "hash",
                Utc::now() - ChronoDuration::seconds(1),
            )
            .await
            .unwrap();
    }
    storage
        .enqueue(NewOutboxMessage {
            aggregate_type: "Order".into(),
            aggregate_id: Uuid::new_v4(),
            event_type: "OrderConfirmed".into(),
            payload: serde_json::json!({}),
        })
        .await
        .unwrap();

    let published = Arc::new(AtomicU32::new(0));
    let outbox_worker = OutboxPublisherWorker::new(
        storage.clone(),
        CountingPublisher {
            published: published.clone(),
        },
        OutboxPublisherConfig {
            poll_interval: Duration::from_millis(1),
            batch_size: 10,
            max_attempts: 3,
            retry_base_delay: Duration::from_millis(1),
        },
    );
    let cleanup_worker = IdempotencyCleanupWorker::new(
        storage.clone(),
        IdempotencyCleanupConfig {
            interval: Duration::from_millis(1),
            batch_size: 2,
        },
    );

    let token = CancellationToken::new();
    let (outbox_result, cleanup_result) = tokio::join!(
        outbox_worker.run_once(&token),
        cleanup_worker.run_once(&token),
    );
    outbox_result.unwrap();
    cleanup_result.unwrap();

    assert_eq!(published.load(Ordering::SeqCst), 1);
    let remaining_expired = storage.delete_expired(Utc::now(), 100).await.unwrap();
    assert_eq!(remaining_expired, 0);
}

#[tokio::test]
async fn outbox_worker_stops_draining_once_cancelled() {
    let storage = InMemoryStorage::new();
    storage
        .enqueue(NewOutboxMessage {
            aggregate_type: "Order".into(),
            aggregate_id: Uuid::new_v4(),
            event_type: "OrderCanceled".into(),
            payload: serde_json::json!({}),
        })
        .await
        .unwrap();

    let published = Arc::new(AtomicU32::new(0));
    let worker = OutboxPublisherWorker::new(
        storage.clone(),
        CountingPublisher {
            published: published.clone(),
        },
        OutboxPublisherConfig {
            poll_interval: Duration::from_millis(1),
            batch_size: 10,
            max_attempts: 3,
            retry_base_delay: Duration::from_millis(1),
        },
    );

    let token = CancellationToken::new();
    token.cancel();
    worker.run_once(&token).await.unwrap();

    assert_eq!(published.load(Ordering::SeqCst), 0);
    let stats = storage.stats().await.unwrap();
    assert_eq!(stats.pending_count, 1);
}
