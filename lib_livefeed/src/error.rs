//! # Error Types
//!
//! Errors that can actually reach a caller of `lib_livefeed`. Transport failures
//! during a live session are *not* surfaced here: the connection manager turns
//! them into reconnection attempts and state transitions. What remains are the
//! configuration and construction errors a caller must deal with up front, plus
//! the transport error carried internally between a connector and the session
//! task.

use thiserror::Error;

/// Convenience alias used across the crate.
pub type LiveFeedResult<T> = Result<T, LiveFeedError>;

/// Errors raised by configuration loading, construction and transports.
#[derive(Debug, Error)]
pub enum LiveFeedError {
    #[error("I/O error occurred: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error occurred: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid target address: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Unsupported URL scheme '{0}' (expected ws or wss)")]
    UnsupportedScheme(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Environment variable {name} has invalid value '{value}'")]
    InvalidEnvVar { name: String, value: String },

    #[cfg(feature = "ws")]
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Transport error: {0}")]
    Transport(String),
}
