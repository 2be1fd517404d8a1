//! API server entry point.

use std::sync::Arc;
use std::time::Duration;

use api::config::{Config, StorageDriver};
use api::service::OrderService;
use domain::{InMemoryInventoryService, InMemoryPaymentService};
use saga::{LogBrokerProducer, SagaOrchestrator};
use storage::{InMemoryStorage, PostgresStorage, StorageBackend};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use workers::{
    BrokerDlqSink, IdempotencyCleanupConfig, IdempotencyCleanupWorker, LogPublisher,
    OutboxPublisherConfig, OutboxPublisherWorker,
};

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

/// Wires the saga, background workers and router over `storage`, serves
/// until shutdown, and drains everything in the §5 order: RPC endpoint
/// first, then background workers, then storage drops out of scope.
async fn serve<S: StorageBackend + Clone + 'static>(storage: S, config: Config) {
    let inventory = InMemoryInventoryService::new();
    let payment = InMemoryPaymentService::new();
    let broker_producer = match &config.broker_brokers {
        Some(brokers) => LogBrokerProducer::enabled(brokers.clone()),
        None => LogBrokerProducer::disabled(),
    };
    let saga = Arc::new(SagaOrchestrator::with_broker(
        storage.clone(),
        inventory,
        payment,
        broker_producer,
    ));
    let service = OrderService::with_saga(storage.clone(), saga);

    let prometheus_builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    let metrics_handle = prometheus_builder
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    let state = api::build_state(storage.clone(), service, config.outbox_max_pending);
    let app = api::create_app(state.clone());
    let observability_app = api::create_observability_app(state.clone(), metrics_handle);

    let worker_token = CancellationToken::new();

    let publisher_config = OutboxPublisherConfig {
        poll_interval: config.outbox_poll_interval,
        batch_size: config.outbox_batch_size,
        max_attempts: config.outbox_max_attempts,
        retry_base_delay: config.outbox_retry_base_delay,
    };
    let dlq_sink = match &config.broker_brokers {
        Some(brokers) => BrokerDlqSink::enabled(brokers.clone()),
        None => BrokerDlqSink::disabled(),
    };
    let publisher_worker =
        OutboxPublisherWorker::with_dlq(storage.clone(), LogPublisher, dlq_sink, publisher_config);
    let publisher_token = worker_token.clone();
    let publisher_handle = tokio::spawn(async move { publisher_worker.run(publisher_token).await });

    let cleanup_config = IdempotencyCleanupConfig {
        interval: config.idempotency_cleanup_interval,
        batch_size: config.idempotency_cleanup_batch_size,
    };
    let cleanup_worker = IdempotencyCleanupWorker::new(storage.clone(), cleanup_config);
    let cleanup_token = worker_token.clone();
    let cleanup_handle = tokio::spawn(async move { cleanup_worker.run(cleanup_token).await });

    let addr = config.addr();
    let metrics_addr = config.metrics_addr();
    tracing::info!(%addr, %metrics_addr, "starting API server");

    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .expect("failed to bind metrics address");
    let observability_handle = tokio::spawn(async move {
        axum::serve(metrics_listener, observability_app)
            .await
            .expect("metrics server error");
    });

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    tracing::info!("RPC endpoint stopped accepting, draining background work");

    observability_handle.abort();
    worker_token.cancel();
    let _ = tokio::join!(publisher_handle, cleanup_handle);

    tracing::info!("server shut down gracefully");
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(?config, "loaded configuration");

    match config.storage_driver {
        StorageDriver::Memory => {
            let storage = InMemoryStorage::new();
            serve(storage, config).await;
        }
        StorageDriver::Postgres => {
            let dsn = config
                .postgres_dsn
                .clone()
                .expect("POSTGRES_DSN is required when STORAGE_DRIVER=postgres");
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(10)
                .acquire_timeout(Duration::from_secs(5))
                .connect(&dsn)
                .await
                .expect("failed to connect to postgres");
            let storage = PostgresStorage::new(pool);
            if config.postgres_auto_migrate {
                storage.run_migrations().await.expect("migration failed");
            }
            serve(storage, config).await;
        }
    }
}
