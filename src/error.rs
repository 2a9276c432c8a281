//! Error types for the ingestion core.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the core components.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed request or batch field
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Repository lookup came back empty where a row was required
    #[error("not found: {0}")]
    NotFound(String),

    /// State-guarded update lost (e.g. resolve on an already-resolved incident)
    #[error("conflict: {0}")]
    Conflict(String),

    /// Database error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Chat provider rejected the post (non-OK response)
    #[error("chat error: {0}")]
    Chat(String),

    /// Analysis agent returned a failure
    #[error("agent error: {0}")]
    Agent(String),

    /// Embedding backend returned a failure or an empty result
    #[error("embedding error: {0}")]
    Embedding(String),

    /// Missing or invalid configuration; fatal at startup
    #[error("configuration error: {0}")]
    Config(String),
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Error::InvalidInput(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            Error::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            Error::Conflict(_) => (StatusCode::CONFLICT, self.to_string()),
            Error::Database(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "database error".to_string(),
            ),
            Error::Config(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "configuration error".to_string(),
            ),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal server error".to_string(),
            ),
        };

        let body = Json(json!({
            "status": "error",
            "error": message,
        }));

        (status, body).into_response()
    }
}
