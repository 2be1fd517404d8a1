//! API error types with HTTP response mapping (§7).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::OmsError;
use saga::SagaError;
use storage::StorageError;

/// Wraps `OmsError` so this crate can implement a foreign trait
/// (`IntoResponse`) on it; the mapping itself is the kind table in §7.
#[derive(Debug)]
pub struct ApiError(pub OmsError);

impl ApiError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        ApiError(OmsError::InvalidArgument(msg.into()))
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        ApiError(OmsError::NotFound(msg.into()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            OmsError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            OmsError::NotFound(_) => StatusCode::NOT_FOUND,
            OmsError::AlreadyExists(_) => StatusCode::CONFLICT,
            OmsError::FailedPrecondition(_) => StatusCode::PRECONDITION_FAILED,
            OmsError::Aborted(_) => StatusCode::CONFLICT,
            OmsError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            OmsError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            OmsError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self.0, "internal server error");
        }

        let body = serde_json::json!({ "code": self.0.kind(), "message": self.0.message() });
        (status, axum::Json(body)).into_response()
    }
}

impl From<OmsError> for ApiError {
    fn from(err: OmsError) -> Self {
        ApiError(err)
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        ApiError(err.into())
    }
}

impl From<SagaError> for ApiError {
    fn from(err: SagaError) -> Self {
        ApiError(err.into())
    }
}
