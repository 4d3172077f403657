//! Typed engine errors mapped to HTTP responses.
//!
//! A structured error body (`{error, message}`) keeps failures
//! distinguishable from a valid "no data found" answer. Query-plan
//! failures additionally carry the offending statement for debugging.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use emr_core::EngineError;

/// Wrapper making [`EngineError`] usable as an axum rejection.
pub struct ApiError(pub EngineError);

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = match &self.0 {
            EngineError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            EngineError::InvalidDocument(_) => (StatusCode::BAD_REQUEST, "invalid_document"),
            EngineError::QueryPlan { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "query_plan"),
            EngineError::Synthesis(_) => (StatusCode::BAD_GATEWAY, "synthesis"),
            EngineError::Embedding(_) => (StatusCode::BAD_GATEWAY, "embedding"),
            EngineError::GraphWrite(_) | EngineError::GraphRead(_) | EngineError::IndexWrite(_) => {
                (StatusCode::BAD_GATEWAY, "store")
            }
            EngineError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };

        let mut body = json!({
            "error": kind,
            "message": self.0.to_string(),
        });
        if let EngineError::QueryPlan { statement, .. } = &self.0 {
            body["statement"] = json!(statement);
        }

        (status, Json(body)).into_response()
    }
}
