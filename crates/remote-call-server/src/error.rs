//! Server error types.

use thiserror::Error;

/// Server error type.
#[derive(Error, Debug)]
pub enum ServerError {
    /// IO error (bind, accept)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// WebSocket handshake or stream error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias using ServerError.
pub type ServerResult<T> = Result<T, ServerError>;
