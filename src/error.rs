use axum::{Json, http::StatusCode, response::{IntoResponse, Response}};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Backend error {status}: {message}")]
    Backend { status: u16, message: String },

    #[error("Template error: {0}")]
    Template(#[from] minijinja::Error),

    #[error("Not signed in")]
    Unauthorized,

    #[error("Not found")]
    NotFound,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal server error")]
    InternalServerError,
}

impl AppError {
    /// Message suitable for a notice shown to the signed-in user.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Backend { message, .. } => message.clone(),
            AppError::Http(e) if e.is_timeout() => "The backend did not answer in time".to_string(),
            AppError::Http(_) => "Could not reach the backend".to_string(),
            AppError::BadRequest(msg) => msg.clone(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::NotFound => (StatusCode::NOT_FOUND, "Not Found".to_string()),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "Not signed in".to_string()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Backend { status, message } => {
                error!("backend error {}: {}", status, message);
                match status {
                    401 | 403 => (StatusCode::UNAUTHORIZED, message),
                    404 => (StatusCode::NOT_FOUND, message),
                    _ => (StatusCode::BAD_GATEWAY, message),
                }
            }
            AppError::Http(e) => {
                error!("backend request failed: {}", e);
                (
                    StatusCode::BAD_GATEWAY,
                    "Backend request failed".to_string(),
                )
            }
            AppError::Template(e) => {
                error!("template error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to render page".to_string(),
                )
            }
            AppError::Config(msg) => {
                error!("configuration error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::InternalServerError => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };

        let body = Json(ErrorResponse {
            error: status.to_string(),
            message: error_message,
        });

        (status, body).into_response()
    }
}
