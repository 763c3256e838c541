//! Mapping of application errors onto HTTP responses.
//!
//! Bodies are `{"code": ..., "message": ...}` where `message` is a single
//! line safe to show to a user.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::error::Error;

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub code: &'static str,
    pub message: String,
}

/// Handler error carrying its status code.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody {
            code: self.code,
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::Validation(msg) => Self::validation(msg),
            Error::NotFound { entity_type, id } => {
                Self::not_found(format!("{entity_type} '{id}' not found"))
            }
            Error::Conflict(msg) => Self::new(StatusCode::CONFLICT, "CONFLICT", msg),
            Error::Spawn(msg) => Self::new(StatusCode::BAD_GATEWAY, "SPAWN_ERROR", msg),
            Error::Configuration(msg) => Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            other => {
                // Internal details stay in the log.
                tracing::error!(error = %other, "Request failed");
                Self::internal("Internal server error")
            }
        }
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;
