//! HTTP API server for the order management service.
//!
//! Exposes the `OrderService` RPC facade as JSON-over-HTTP routes, with
//! structured logging (tracing), Prometheus metrics, and per-route
//! idempotency enforcement on the four mutating endpoints (§4.8, §11).
//!
//! The RPC surface and the metrics/health surface are two distinct
//! listeners (§6: `grpc-listen-address` vs `metrics-listen-address`), so
//! this crate builds two separate routers over one shared `AppState`
//! rather than merging everything onto one port.

pub mod config;
pub mod error;
pub mod idempotency;
pub mod routes;
pub mod service;

use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::middleware;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use storage::StorageBackend;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use routes::orders::AppState;

/// Builds the shared application state wrapped for use by both routers.
pub fn build_state<S: StorageBackend + Clone + 'static>(
    storage: S,
    service: service::OrderService<S>,
    outbox_max_pending: i64,
) -> Arc<AppState<S>> {
    Arc::new(AppState {
        storage,
        service,
        outbox_max_pending,
        started_at: Instant::now(),
    })
}

/// Creates the RPC router: the six order-lifecycle routes, with
/// idempotency enforcement layered on the four mutating ones. Served on
/// `grpc_listen_address` (§11).
pub fn create_app<S: StorageBackend + Clone + 'static>(state: Arc<AppState<S>>) -> Router {
    let idempotency_repo = state.storage.clone();
    let create_repo = idempotency_repo.clone();
    let pay_repo = idempotency_repo.clone();
    let cancel_repo = idempotency_repo.clone();
    let refund_repo = idempotency_repo.clone();

    Router::new()
        .route(
            "/v1/orders",
            post(routes::orders::create::<S>).route_layer(middleware::from_fn(move |req, next| {
                let repo = create_repo.clone();
                idempotency::idempotency_middleware(repo, "CreateOrder", req, next)
            })),
        )
        .route("/v1/orders", get(routes::orders::list::<S>))
        .route("/v1/orders/{id}", get(routes::orders::get::<S>))
        .route(
            "/v1/orders/{id}/pay",
            post(routes::orders::pay::<S>).route_layer(middleware::from_fn(move |req, next| {
                let repo = pay_repo.clone();
                idempotency::idempotency_middleware(repo, "PayOrder", req, next)
            })),
        )
        .route(
            "/v1/orders/{id}/cancel",
            post(routes::orders::cancel::<S>).route_layer(middleware::from_fn(move |req, next| {
                let repo = cancel_repo.clone();
                idempotency::idempotency_middleware(repo, "CancelOrder", req, next)
            })),
        )
        .route(
            "/v1/orders/{id}/refund",
            post(routes::orders::refund::<S>).route_layer(middleware::from_fn(move |req, next| {
                let repo = refund_repo.clone();
                idempotency::idempotency_middleware(repo, "RefundOrder", req, next)
            })),
        )
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the metrics/health router: Prometheus scrape plus
/// `/livez`/`/readyz`/`/healthz`. Served on `metrics_listen_address`
/// (§6), separate from the RPC port.
pub fn create_observability_app<S: StorageBackend + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/livez", get(routes::health::livez))
        .route("/readyz", get(routes::health::readyz::<S>))
        .route("/healthz", get(routes::health::healthz::<S>))
        .with_state(state)
        .merge(metrics_router)
        .layer(TraceLayer::new_for_http())
}
