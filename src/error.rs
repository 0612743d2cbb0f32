use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// The error kinds the core's collaborators and driver can raise.
///
/// Most kinds are swallowed by [`best_effort`] before they ever reach the
/// HTTP layer — only `SessionStoreFailure`, `Unauthorized`, `InvalidInput`,
/// `NotFound` and `Conflict` are meant to surface to a caller (see §7 of the
/// design notes: error kind → disposition).
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("retrieval failed: {0}")]
    RetrievalFailure(String),
    #[error("generation failed: {0}")]
    GenerationFailure(String),
    #[error("groundedness judge failed: {0}")]
    JudgeFailure(String),
    #[error("cache failed: {0}")]
    CacheFailure(String),
    #[error("notification failed: {0}")]
    NotificationFailure(String),
    #[error("session store failed: {0}")]
    SessionStoreFailure(String),
}

/// Run a best-effort collaborator call: log the error and fall back to a
/// default instead of propagating it. This is the "swallow-to-empty" helper
/// the design notes call for — every retrieval, cache, judge and
/// notification call routes through it except the session store itself.
pub async fn best_effort<T, F>(label: &str, fallback: T, fut: F) -> T
where
    F: std::future::Future<Output = Result<T, CoreError>>,
{
    match fut.await {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(collaborator = label, error = %e, "best-effort call failed, using fallback");
            fallback
        }
    }
}

/// HTTP-facing error envelope. Every adapter handler returns
/// `Result<Json<T>, ApiError>`; `CoreError` converts into it via the status
/// mapping from §7.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub error_code: &'static str,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self { status: StatusCode::BAD_REQUEST, message: message.into(), error_code: "invalid_input" }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self { status: StatusCode::FORBIDDEN, message: message.into(), error_code: "unauthorized" }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self { status: StatusCode::NOT_FOUND, message: message.into(), error_code: "not_found" }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self { status: StatusCode::CONFLICT, message: message.into(), error_code: "conflict" }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self { status: StatusCode::INTERNAL_SERVER_ERROR, message: message.into(), error_code: "internal" }
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidInput(m) => ApiError::bad_request(m),
            CoreError::Unauthorized(m) => ApiError::unauthorized(m),
            CoreError::NotFound(m) => ApiError::not_found(m),
            CoreError::Conflict(m) => ApiError::conflict(m),
            CoreError::SessionStoreFailure(m) => ApiError::internal(m),
            // The remaining kinds are never meant to reach the adapter layer
            // (they are swallowed upstream); map them defensively to 500.
            other => ApiError::internal(other.to_string()),
        }
    }
}

#[derive(Serialize)]
struct ApiErrorBody<'a> {
    error: &'a str,
    message: &'a str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ApiErrorBody { error: self.error_code, message: &self.message });
        (self.status, body).into_response()
    }
}
