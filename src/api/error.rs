use crate::services::error::ServiceError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Code sent with every failure that is not a typed service rejection.
const OPERATION_FAILED: &str = "OPERATION_FAILED";

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal Server Error: {0}")]
    Internal(String),

    #[error(transparent)]
    Service(#[from] ServiceError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "INVALID_PARAMETER", msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    OPERATION_FAILED,
                    "Internal Server Error".to_string(),
                )
            }
            AppError::Service(err) => match err {
                ServiceError::InvalidArgument { code, message } => {
                    (StatusCode::BAD_REQUEST, code.as_str(), message)
                }
                ServiceError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
                ServiceError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
                ServiceError::Backend(e) => {
                    tracing::error!("Storage backend error: {:?}", e);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        OPERATION_FAILED,
                        "Internal Server Error".to_string(),
                    )
                }
            },
        };

        let body = Json(json!({
            "code": code,
            "error": message
        }));

        (status, body).into_response()
    }
}
