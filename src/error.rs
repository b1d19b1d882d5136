//! Error types and HTTP status mapping for GameHub

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

/// Result type alias for GameHub operations
pub type Result<T> = std::result::Result<T, Error>;

/// GameHub error types
///
/// Every variant maps onto exactly one HTTP status (see [`Error::status_code`]).
#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    InvalidState(String),

    #[error("Not your turn")]
    OutOfTurn,

    #[error("Invalid column")]
    InvalidColumn,

    #[error("Column full")]
    ColumnFull,

    #[error("{0}")]
    Verification(String),

    #[error("Not a player")]
    NotAPlayer,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn not_found(what: &str) -> Self {
        Error::NotFound(format!("{} not found", what))
    }

    pub fn missing_fields() -> Self {
        Error::Validation("Missing required fields".to_string())
    }

    /// HTTP status this error is reported with
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Validation(_)
            | Error::InvalidState(_)
            | Error::OutOfTurn
            | Error::InvalidColumn
            | Error::ColumnFull
            | Error::Verification(_) => StatusCode::BAD_REQUEST,
            Error::NotAPlayer | Error::Forbidden(_) => StatusCode::FORBIDDEN,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Conflict(_) => StatusCode::CONFLICT,
            Error::Io(_)
            | Error::Database(_)
            | Error::Serialization(_)
            | Error::Network(_)
            | Error::Config(_)
            | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(format!("JSON error: {}", err))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Network(format!("HTTP request error: {}", err))
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(err.to_string())
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "request failed");
            "Internal Server Error".to_string()
        } else {
            self.to_string()
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}
