//! Liveness, readiness and health endpoints (§5, §6).

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Serialize;
use storage::StorageBackend;

use super::orders::AppState;

#[derive(Serialize)]
pub struct LiveResponse {
    pub status: &'static str,
}

/// GET /livez — the process is up and scheduling tasks. Never checks
/// downstream dependencies; that's `/readyz`'s job.
pub async fn livez() -> Json<LiveResponse> {
    Json(LiveResponse { status: "ok" })
}

#[derive(Serialize)]
struct ReadyCheck {
    name: &'static str,
    healthy: bool,
    detail: Option<String>,
}

/// GET /readyz — 200 if every registered check passes, 503 otherwise.
pub async fn readyz<S: StorageBackend + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> impl IntoResponse {
    let checks = run_checks(&state).await;
    let healthy = checks.iter().all(|c| c.healthy);
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(checks))
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub checks: Vec<serde_json::Value>,
    pub version: &'static str,
    pub uptime_seconds: u64,
}

/// GET /healthz — a richer readiness report with process metadata.
pub async fn healthz<S: StorageBackend + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> impl IntoResponse {
    let checks = run_checks(&state).await;
    let healthy = checks.iter().all(|c| c.healthy);
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let body = HealthResponse {
        status: if healthy { "ok" } else { "degraded" },
        checks: checks
            .into_iter()
            .map(|c| serde_json::json!({"name": c.name, "healthy": c.healthy, "detail": c.detail}))
            .collect(),
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.started_at.elapsed().as_secs(),
    };

    (status, Json(body))
}

async fn run_checks<S: StorageBackend + Clone + 'static>(state: &AppState<S>) -> Vec<ReadyCheck> {
    let mut checks = Vec::new();

    match state.storage.stats().await {
        Ok(stats) => {
            let healthy = stats.pending_count <= state.outbox_max_pending;
            checks.push(ReadyCheck {
                name: "outbox_backlog",
                healthy,
                detail: Some(format!(
                    "{} pending (max {})",
                    stats.pending_count, state.outbox_max_pending
                )),
            });
        }
        Err(e) => checks.push(ReadyCheck {
            name: "outbox_backlog",
            healthy: false,
            detail: Some(e.to_string()),
        }),
    }

    checks
}
