//! Error types for the gateway

use thiserror::Error;

/// Result type alias using the gateway's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the gateway
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input from a client
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Connection-level failure on a session stream
    #[error("Transport error: {0}")]
    Transport(String),

    /// Output was addressed to a session whose stream has already closed
    #[error("Session closed: {0}")]
    SessionClosed(String),

    /// Protocol engine failure
    #[error("Engine error: {0}")]
    Engine(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Check if error means the session's stream is unusable
    pub fn is_transport_error(&self) -> bool {
        matches!(self, Error::Transport(_))
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::Config(format!("Invalid URL: {}", err))
    }
}
