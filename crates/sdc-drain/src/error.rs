//! HTTP-facing error type

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::db::DbError;
use crate::drain::CycleFailure;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error(transparent)]
    Cycle(#[from] CycleFailure),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message, summary) = match self {
            AppError::Database(ref e) => {
                tracing::error!("Database error: {:?}", e);
                (StatusCode::SERVICE_UNAVAILABLE, "A database error occurred".to_string(), None)
            },
            AppError::Cycle(CycleFailure::ConcurrentCycle) => (
                StatusCode::CONFLICT,
                CycleFailure::ConcurrentCycle.to_string(),
                None,
            ),
            AppError::Cycle(CycleFailure::Aborted { error, summary }) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Drain cycle aborted: {error}"),
                Some(summary),
            ),
            AppError::NotFound(ref message) => (StatusCode::NOT_FOUND, message.clone(), None),
            AppError::Internal(ref message) => {
                tracing::error!("Internal error: {}", message);
                (StatusCode::INTERNAL_SERVER_ERROR, message.clone(), None)
            },
        };

        let mut body = json!({
            "error": {
                "message": error_message,
                "status": status.as_u16(),
            }
        });
        if let Some(summary) = summary {
            body["summary"] = json!(summary);
        }

        (status, Json(body)).into_response()
    }
}
