//! Protocol engine seam
//!
//! The transport knows nothing about the protocol spoken over a session. It
//! builds one engine per accepted stream and hands it every payload posted
//! for that session, together with the session's output channel.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use super::session::{SessionChannel, SessionId};
use crate::error::Result;

/// Per-session protocol implementation
#[async_trait]
pub trait ProtocolEngine: Send + Sync {
    /// Process one inbound payload. Results are written to `channel`, not
    /// returned; an `Err` means the payload could not be processed at all.
    async fn handle_message(&self, message: Value, channel: &SessionChannel) -> Result<()>;

    /// Release engine resources when the session ends
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Builds a fresh engine for every accepted stream
pub trait EngineFactory: Send + Sync {
    /// Create the engine for a new session
    fn create(&self, session_id: &SessionId) -> Result<Arc<dyn ProtocolEngine>>;
}
