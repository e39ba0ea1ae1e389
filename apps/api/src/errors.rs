use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::intake::error::IntakeError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict")]
    Conflict,

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<IntakeError> for AppError {
    fn from(value: IntakeError) -> Self {
        match value {
            IntakeError::Validation(msg) => AppError::Validation(msg),
            IntakeError::Configuration(msg) => {
                AppError::Validation(format!("invalid identifier: {msg}"))
            }
            IntakeError::NotFound(what) => AppError::NotFound(what),
            IntakeError::Conflict => AppError::Conflict,
            IntakeError::TransientStore(msg) => AppError::Unavailable(msg),
            IntakeError::Storage(e) => AppError::Storage(e.to_string()),
            IntakeError::Store(e) => AppError::Internal(e.to_string()),
        }
    }
}

impl From<MultipartError> for AppError {
    fn from(value: MultipartError) -> Self {
        AppError::Validation(format!("malformed upload: {value}"))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                format!("{msg} not found"),
            ),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::Conflict => (
                StatusCode::CONFLICT,
                "CONFLICT",
                "The record already exists".to_string(),
            ),
            AppError::Unavailable(msg) => {
                tracing::warn!("Store unavailable: {msg}");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "TRY_AGAIN",
                    "The service is busy, please try again in a moment".to_string(),
                )
            }
            AppError::Storage(msg) => {
                tracing::error!("Storage error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "STORAGE_ERROR",
                    "A storage error occurred".to_string(),
                )
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}
