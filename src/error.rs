use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::api::models::ApiResponse;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Device data unavailable: {0}")]
    Fetch(String),

    #[error("Storage error: {0}")]
    Store(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Collapses an upstream transport failure into the stage it happened in.
    pub fn from_auth_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AppError::Auth("portal did not answer before the timeout".to_string())
        } else {
            AppError::Auth(format!("portal request failed: {}", err))
        }
    }

    pub fn from_fetch_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AppError::Fetch("portal did not answer before the timeout".to_string())
        } else {
            AppError::Fetch(format!("portal request failed: {}", err))
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Auth(ref msg) => (StatusCode::BAD_GATEWAY, format!("Portal login failed: {}", msg)),
            AppError::Fetch(ref msg) => (StatusCode::BAD_GATEWAY, format!("Device data unavailable: {}", msg)),
            AppError::Validation(ref msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::NotFound(ref msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Store(ref msg) => {
                tracing::error!("Storage error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Failed to persist data".to_string())
            }
            ref e => {
                tracing::error!("Internal error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        (status, Json(ApiResponse::<()>::failure(message))).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
