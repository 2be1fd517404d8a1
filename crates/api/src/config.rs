//! Application configuration loaded from environment variables (§6).

use std::time::Duration;

/// Storage backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageDriver {
    Memory,
    Postgres,
}

impl StorageDriver {
    fn from_str(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" => StorageDriver::Postgres,
            _ => StorageDriver::Memory,
        }
    }
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `GRPC_LISTEN_ADDRESS` — RPC listen endpoint (default: `":50051"`); this
///   service carries the surface over HTTP rather than gRPC (see `create_app`),
///   so this governs the HTTP listener.
/// - `METRICS_LISTEN_ADDRESS` — Prometheus-scrape + health listen endpoint
///   (default: `":9090"`).
/// - `STORAGE_DRIVER` — `memory` or `postgres` (default: `memory`).
/// - `POSTGRES_DSN` — required when `STORAGE_DRIVER=postgres`.
/// - `POSTGRES_AUTO_MIGRATE` — apply schema on boot (default: `true`).
/// - `OUTBOX_POLL_INTERVAL_MS`, `OUTBOX_BATCH_SIZE`, `OUTBOX_MAX_ATTEMPTS`,
///   `OUTBOX_RETRY_BASE_DELAY_MS`, `OUTBOX_MAX_PENDING` — outbox publisher
///   tuning.
/// - `IDEMPOTENCY_CLEANUP_INTERVAL_MS`, `IDEMPOTENCY_CLEANUP_BATCH_SIZE` —
///   cleanup sweep tuning.
/// - `LOG_LEVEL` — tracing filter directive (default: `"info"`).
/// - `BROKER_BROKERS` — comma-separated broker list; enables saga broker
///   events and DLQ routing when set.
#[derive(Debug, Clone)]
pub struct Config {
    pub grpc_listen_address: String,
    pub metrics_listen_address: String,
    pub storage_driver: StorageDriver,
    pub postgres_dsn: Option<String>,
    pub postgres_auto_migrate: bool,
    pub outbox_poll_interval: Duration,
    pub outbox_batch_size: i64,
    pub outbox_max_attempts: u32,
    pub outbox_retry_base_delay: Duration,
    pub outbox_max_pending: i64,
    pub idempotency_cleanup_interval: Duration,
    pub idempotency_cleanup_batch_size: i64,
    pub log_level: String,
    pub broker_brokers: Option<Vec<String>>,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let postgres_dsn = std::env::var("POSTGRES_DSN")
            .ok()
            .filter(|v| !v.trim().is_empty());
        let broker_brokers = std::env::var("BROKER_BROKERS")
            .ok()
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|v| !v.is_empty());

        Self {
            grpc_listen_address: std::env::var("GRPC_LISTEN_ADDRESS")
                .unwrap_or_else(|_| ":50051".to_string()),
            metrics_listen_address: std::env::var("METRICS_LISTEN_ADDRESS")
                .unwrap_or_else(|_| ":9090".to_string()),
            storage_driver: std::env::var("STORAGE_DRIVER")
                .map(|v| StorageDriver::from_str(&v))
                .unwrap_or(StorageDriver::Memory),
            postgres_dsn,
            postgres_auto_migrate: env_or("POSTGRES_AUTO_MIGRATE", true),
            outbox_poll_interval: Duration::from_millis(env_or("OUTBOX_POLL_INTERVAL_MS", 1_000)),
            outbox_batch_size: env_or("OUTBOX_BATCH_SIZE", 100),
            outbox_max_attempts: env_or("OUTBOX_MAX_ATTEMPTS", 3),
            outbox_retry_base_delay: Duration::from_millis(env_or(
                "OUTBOX_RETRY_BASE_DELAY_MS",
                50,
            )),
            outbox_max_pending: env_or("OUTBOX_MAX_PENDING", 10_000),
            idempotency_cleanup_interval: Duration::from_millis(env_or(
                "IDEMPOTENCY_CLEANUP_INTERVAL_MS",
                60_000,
            )),
            idempotency_cleanup_batch_size: env_or("IDEMPOTENCY_CLEANUP_BATCH_SIZE", 100),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            broker_brokers,
        }
    }

    /// Normalizes `grpc_listen_address` (e.g. `":50051"`) into a bindable
    /// `"host:port"` string.
    pub fn addr(&self) -> String {
        normalize_addr(&self.grpc_listen_address)
    }

    /// Normalizes `metrics_listen_address` the same way `addr` does. This
    /// is a distinct listener from the RPC endpoint (§6): it carries the
    /// Prometheus scrape route plus `/livez`/`/readyz`/`/healthz`.
    pub fn metrics_addr(&self) -> String {
        normalize_addr(&self.metrics_listen_address)
    }
}

fn normalize_addr(raw: &str) -> String {
    if let Some(port) = raw.strip_prefix(':') {
        format!("0.0.0.0:{port}")
    } else {
        raw.to_string()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            grpc_listen_address: ":50051".to_string(),
            metrics_listen_address: ":9090".to_string(),
            storage_driver: StorageDriver::Memory,
            postgres_dsn: None,
            postgres_auto_migrate: true,
            outbox_poll_interval: Duration::from_secs(1),
            outbox_batch_size: 100,
            outbox_max_attempts: 3,
            outbox_retry_base_delay: Duration::from_millis(50),
            outbox_max_pending: 10_000,
            idempotency_cleanup_interval: Duration::from_secs(60),
            idempotency_cleanup_batch_size: 100,
            log_level: "info".to_string(),
            broker_brokers: None,
        }
    }
}
