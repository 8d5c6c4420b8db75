//! Error types for mcp-oauth

use thiserror::Error;

/// Result type alias for mcp-oauth operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while running the OAuth flow
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Discovery(String),

    #[error("OAuth error: {0}")]
    OAuth(String),

    #[error("{context}: {status}")]
    Status {
        context: String,
        status: reqwest::StatusCode,
    },
}

impl Error {
    /// Build a status error for an unexpected HTTP response
    pub fn status(context: impl Into<String>, status: reqwest::StatusCode) -> Self {
        Error::Status {
            context: context.into(),
            status,
        }
    }
}
