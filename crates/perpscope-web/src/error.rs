use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use perpscope_core::{ConfigError, ValidationError};
use serde_json::json;
use thiserror::Error;

/// Request-level failures returned by the API routes.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    InvalidCoin(#[from] ValidationError),

    /// No snapshot has been published yet.
    #[error("data is loading, please retry shortly")]
    Loading,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            Self::InvalidCoin(err) => (StatusCode::BAD_REQUEST, json!({ "error": err.to_string() })),
            Self::Loading => (
                StatusCode::SERVICE_UNAVAILABLE,
                json!({ "error": "loading", "message": self.to_string() }),
            ),
        };
        (status, Json(body)).into_response()
    }
}

/// Startup failures mapped to process exit codes.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(std::io::Error),
}

impl StartupError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) => 2,
            Self::Bind { .. } => 3,
            Self::Serve(_) => 4,
        }
    }
}
