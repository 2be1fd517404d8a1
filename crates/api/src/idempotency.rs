//! RPC idempotency middleware (§4.8).
//!
//! Wraps only the four mutating routes, in the same position the trace
//! layer occupies in `create_app`. The request hash binds the method name
//! to the raw JSON body so a replay under a different route never matches
//! a record created by another one.

use axum::body::{Body, to_bytes};
use axum::extract::Request;
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use chrono::{Duration as ChronoDuration, Utc};
use domain::OmsError;
use sha2::{Digest, Sha256};
use storage::{CreateProcessingOutcome, IdempotencyRecord, IdempotencyRepository, IdempotencyStatus};

use crate::error::ApiError;

const TTL_HOURS: i64 = 24;
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Runs the create-processing protocol around `next` for a single
/// mutating RPC named `method_name`.
pub async fn idempotency_middleware<R>(
    repo: R,
    method_name: &'static str,
    req: Request,
    next: Next,
) -> Response
where
    R: IdempotencyRepository + Clone + 'static,
{
    let key = match req
        .headers()
        .get("idempotency-key")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
    {
        Some(k) if !k.is_empty() => k.to_string(),
        _ => return ApiError::invalid_argument("missing idempotency-key").into_response(),
    };

    let (parts, body) = req.into_parts();
    let bytes = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(b) => b,
        Err(e) => {
            return ApiError::invalid_argument(format!("invalid request body: {e}")).into_response();
        }
    };

    let mut hasher = Sha256::new();
    hasher.update(method_name.as_bytes());
    hasher.update([0x3Au8]);
    hasher.update(&bytes);
    let request_hash = hex::encode(hasher.finalize());

    let ttl_at = Utc::now() + ChronoDuration::hours(TTL_HOURS);
    let outcome = match repo.create_processing(&key, &request_hash, ttl_at).await {
        Ok(o) => o,
        Err(e) => return ApiError::from(e).into_response(),
    };

    match outcome {
        CreateProcessingOutcome::Inserted(_) => {
            let req = Request::from_parts(parts, Body::from(bytes));
            let response = next.run(req).await;
            let (response_parts, response_body) = response.into_parts();
            let response_bytes = match to_bytes(response_body, MAX_BODY_BYTES).await {
                Ok(b) => b,
                Err(_) => {
                    return ApiError(OmsError::Internal("failed to buffer response".into()))
                        .into_response();
                }
            };

            let status = response_parts.status.as_u16() as i32;
            let result = if response_parts.status.is_success() {
                repo.mark_done(&key, response_bytes.to_vec(), status).await
            } else {
                repo.mark_failed(&key, response_bytes.to_vec(), status).await
            };
            if let Err(e) = result {
                tracing::error!(error = %e, "failed to record idempotency outcome");
            }

            Response::from_parts(response_parts, Body::from(response_bytes))
        }
        CreateProcessingOutcome::Replayed(record) => match record.status {
            IdempotencyStatus::Done => replay_done(&record),
            IdempotencyStatus::Processing => {
                ApiError(OmsError::Aborted("already processing".into())).into_response()
            }
            IdempotencyStatus::Failed => replay_failure(&record),
        },
        CreateProcessingOutcome::HashMismatch => ApiError(OmsError::AlreadyExists(
            "idempotency key reused with different payload".into(),
        ))
        .into_response(),
    }
}

fn replay_done(record: &IdempotencyRecord) -> Response {
    let status = record
        .http_status
        .and_then(|s| StatusCode::from_u16(s as u16).ok())
        .unwrap_or(StatusCode::OK);
    let body = record.response_body.clone().unwrap_or_default();
    (
        status,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body,
    )
        .into_response()
}

fn replay_failure(record: &IdempotencyRecord) -> Response {
    let body = record.response_body.clone().unwrap_or_default();
    let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap_or_default();
    let code = parsed.get("code").and_then(|v| v.as_str()).unwrap_or("INTERNAL");
    let message = parsed
        .get("message")
        .and_then(|v| v.as_str())
        .unwrap_or("replayed failure")
        .to_string();
    ApiError(oms_error_from_code(code, message)).into_response()
}

fn oms_error_from_code(code: &str, message: String) -> OmsError {
    match code {
        "INVALID_ARGUMENT" => OmsError::InvalidArgument(message),
        "NOT_FOUND" => OmsError::NotFound(message),
        "ALREADY_EXISTS" => OmsError::AlreadyExists(message),
        "FAILED_PRECONDITION" => OmsError::FailedPrecondition(message),
        "ABORTED" => OmsError::Aborted(message),
        "UNAVAILABLE" => OmsError::Unavailable(message),
        "UNAUTHENTICATED" => OmsError::Unauthenticated(message),
        _ => OmsError::Internal(message),
    }
}
