use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::kv::KvError;
use crate::services::gateway::GatewayError;

/// The application's error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// A key-value store transport error.
    #[error("Key-value store error: {0}")]
    Kv(#[from] KvError),

    /// Another request is already being processed for this user.
    #[error("Request already in progress for this user")]
    UserLocked,

    /// The store write failed while initializing a session.
    #[error("Failed to create session for user {0}")]
    SessionCreateFailure(String),

    /// A classified gateway failure, terminal after bounded retries.
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// The user's daily message quota is spent.
    #[error("Daily message limit reached")]
    RateLimitExceeded { reset_at: Option<DateTime<Utc>> },

    /// An authentication error.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// A resource not found error.
    #[error("Resource not found")]
    NotFound,

    /// A validation error.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An internal server error.
    #[error("Internal server error: {0}")]
    Internal(String),
}

/// A `Result` type that uses `AppError` as the error type.
pub type Result<T> = std::result::Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Kv(ref e) => {
                tracing::error!("Key-value store error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Storage error".to_string())
            }

            AppError::UserLocked => {
                tracing::warn!("Rejected concurrent request for locked user");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Request already in progress for this user, please wait".to_string(),
                )
            }

            AppError::SessionCreateFailure(ref user_id) => {
                tracing::error!("Failed to create session for user: {}", user_id);
                (StatusCode::INTERNAL_SERVER_ERROR, "Failed to create session".to_string())
            }

            AppError::Gateway(ref e) if e.retryable() => {
                tracing::warn!("Gateway unavailable after retries: {}", e);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Failed to process your request. Please try again.".to_string(),
                )
            }

            AppError::Gateway(ref e) => {
                tracing::error!("Gateway request failed: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to process your request".to_string(),
                )
            }

            AppError::RateLimitExceeded { reset_at } => {
                tracing::warn!("Rate limit exceeded");
                let message = match reset_at {
                    Some(at) => format!("Daily message limit reached. Resets at {}", at.to_rfc3339()),
                    None => "Daily message limit reached".to_string(),
                };
                (StatusCode::TOO_MANY_REQUESTS, message)
            }

            AppError::Authentication(ref msg) => {
                tracing::warn!("Authentication failed: {}", msg);
                (StatusCode::UNAUTHORIZED, msg.clone())
            }

            AppError::NotFound => {
                tracing::debug!("Resource not found");
                (StatusCode::NOT_FOUND, "Resource not found".to_string())
            }

            AppError::Validation(ref msg) => {
                tracing::debug!("Validation error: {}", msg);
                (StatusCode::BAD_REQUEST, msg.clone())
            }

            AppError::Internal(ref msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = sonic_rs::to_string(&sonic_rs::json!({
            "error": message
        }))
        .unwrap_or_else(|_| r#"{"error":"Internal server error"}"#.to_string());

        (status, body).into_response()
    }
}
