//! Sessions: one accepted event stream each

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Borrow;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::engine::ProtocolEngine;
use crate::error::{Error, Result};

/// Opaque session identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Mint a random (UUID v4) identifier
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for SessionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl Borrow<str> for SessionId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Open,
    Closing,
    Closed,
}

const OPEN: u8 = 0;
const CLOSING: u8 = 1;
const CLOSED: u8 = 2;

impl SessionState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            OPEN => SessionState::Open,
            CLOSING => SessionState::Closing,
            _ => SessionState::Closed,
        }
    }
}

/// One event queued for a session's stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Where the client should POST its messages
    Endpoint(String),
    /// One serialized protocol message
    Message(String),
}

impl SessionEvent {
    /// SSE event name
    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::Endpoint(_) => "endpoint",
            SessionEvent::Message(_) => "message",
        }
    }

    /// SSE data payload
    pub fn data(&self) -> &str {
        match self {
            SessionEvent::Endpoint(data) | SessionEvent::Message(data) => data,
        }
    }
}

/// Write side of a session's event stream
///
/// Closing drops the sender, which ends the stream once queued events have
/// been flushed.
pub struct SessionChannel {
    session_id: SessionId,
    tx: Mutex<Option<mpsc::UnboundedSender<SessionEvent>>>,
}

impl SessionChannel {
    fn new(session_id: SessionId) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let channel = SessionChannel {
            session_id,
            tx: Mutex::new(Some(tx)),
        };
        (channel, rx)
    }

    /// Serialize `message` and queue it as a `message` event
    pub fn send<T: Serialize>(&self, message: &T) -> Result<()> {
        let data = serde_json::to_string(message)?;
        self.push(SessionEvent::Message(data))
    }

    /// Queue a raw event
    pub fn push(&self, event: SessionEvent) -> Result<()> {
        let tx = self.tx.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        match tx.as_ref() {
            Some(tx) => tx.send(event).map_err(|_| {
                Error::Transport(format!("stream for session {} is gone", self.session_id))
            }),
            None => Err(Error::SessionClosed(self.session_id.to_string())),
        }
    }

    /// Stop accepting events. Returns false if already closed.
    pub fn close(&self) -> bool {
        let mut tx = self.tx.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        tx.take().is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.tx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_ref()
            .map_or(true, |tx| tx.is_closed())
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }
}

/// One accepted streaming connection
pub struct Session {
    id: SessionId,
    channel: SessionChannel,
    engine: Arc<dyn ProtocolEngine>,
    state: AtomicU8,
    opened_at: DateTime<Utc>,
}

impl Session {
    /// Create an open session. The receiver is the stream's read side.
    pub fn new(
        id: SessionId,
        engine: Arc<dyn ProtocolEngine>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<SessionEvent>) {
        let (channel, rx) = SessionChannel::new(id.clone());
        let session = Arc::new(Session {
            id,
            channel,
            engine,
            state: AtomicU8::new(OPEN),
            opened_at: Utc::now(),
        });
        (session, rx)
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_open(&self) -> bool {
        self.state() == SessionState::Open
    }

    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    pub fn channel(&self) -> &SessionChannel {
        &self.channel
    }

    /// Hand a payload to this session's engine
    pub async fn forward(&self, message: Value) -> Result<()> {
        if !self.is_open() {
            return Err(Error::SessionClosed(self.id.to_string()));
        }
        self.engine.handle_message(message, &self.channel).await
    }

    /// OPEN → CLOSING. Only the first caller wins.
    pub(crate) fn begin_close(&self) -> bool {
        self.state
            .compare_exchange(OPEN, CLOSING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Close the stream, mark CLOSED, then close the engine.
    /// CLOSED holds even if the engine close is cancelled.
    pub(crate) async fn finish_close(&self) -> Result<()> {
        self.channel.close();
        self.state.store(CLOSED, Ordering::Release);
        self.engine.close().await
    }

    /// Like `finish_close`, for callers that cannot await (drop paths).
    /// The engine is closed on a background task when a runtime is available.
    pub(crate) fn finish_close_detached(self: &Arc<Self>) {
        self.channel.close();
        self.state.store(CLOSED, Ordering::Release);

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            debug!(session_id = %self.id, "No runtime available, skipping engine close");
            return;
        };
        let engine = Arc::clone(&self.engine);
        let id = self.id.clone();
        handle.spawn(async move {
            if let Err(e) = engine.close().await {
                warn!(session_id = %id, "Engine close failed: {}", e);
            }
        });
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("opened_at", &self.opened_at)
            .finish()
    }
}
