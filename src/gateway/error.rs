//! HTTP error responses

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::error::Error;

/// Errors returned by the gateway's HTTP handlers.
///
/// Each handler produces exactly one response; once an SSE stream has been
/// handed back, later failures go to the session's close handler instead.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Missing sessionId query parameter")]
    MissingSessionId,

    #[error("Transport not found for sessionId")]
    SessionNotFound(String),

    #[error("Invalid message")]
    InvalidMessage(String),

    #[error("Message too large")]
    MessageTooLarge(usize),

    #[error("Failed to establish SSE connection")]
    StreamSetup(#[source] Error),

    #[error("Failed to handle message")]
    Forwarding(#[source] Error),

    #[error("Server is shutting down")]
    ShuttingDown,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingSessionId | ApiError::InvalidMessage(_) => StatusCode::BAD_REQUEST,
            ApiError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::MessageTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::StreamSetup(_) | ApiError::Forwarding(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let error = self.to_string();
        let body = match &self {
            ApiError::SessionNotFound(session_id) => {
                json!({ "error": error, "sessionId": session_id })
            }
            ApiError::InvalidMessage(message) => json!({ "error": error, "message": message }),
            ApiError::MessageTooLarge(limit) => json!({ "error": error, "limit": limit }),
            ApiError::StreamSetup(source) | ApiError::Forwarding(source) => {
                json!({ "error": error, "message": source.to_string() })
            }
            ApiError::MissingSessionId | ApiError::ShuttingDown => json!({ "error": error }),
        };
        (self.status(), Json(body)).into_response()
    }
}
