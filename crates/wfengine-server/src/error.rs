//! `ApiError`: maps `EngineError`/`StoreError` kinds to HTTP statuses (§6, §7).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use wfengine_core::error::EngineError;
use wfengine_store::StoreError;

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    Validation(String),
    Unauthorized(String),
    Internal(String),
}

impl ApiError {
    fn status_and_kind(&self) -> (StatusCode, &'static str, &str) {
        match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, message) = self.status_and_kind();
        (status, Json(json!({"error": kind, "message": message}))).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => ApiError::NotFound("not found".to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

/// §6: `WORKFLOW_NOT_FOUND`/`STEP_NOT_FOUND` → 404, `WEBHOOK_SIGNATURE_*` →
/// 401, everything else → 500 (the run itself is still recorded as failed).
impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::WorkflowNotFound(_) | EngineError::StepNotFound(_) => ApiError::NotFound(err.to_string()),
            EngineError::WebhookSignatureMissing | EngineError::WebhookSignatureInvalid => {
                ApiError::Unauthorized(err.to_string())
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}
