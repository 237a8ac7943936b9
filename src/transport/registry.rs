//! Session registry
//!
//! Maps session identifiers to live sessions. Shared by the stream endpoint
//! (insert), the message endpoint (lookup), the close handler (remove) and
//! the lifecycle manager (remove-all).

use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::session::{Session, SessionId};
use crate::error::Result;

/// Why a session left the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The client went away or the stream ended
    Disconnected,
    /// Writing to the stream failed
    TransportError,
    /// A new stream claimed the same identifier
    Replaced,
    /// Process shutdown
    Shutdown,
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CloseReason::Disconnected => write!(f, "disconnected"),
            CloseReason::TransportError => write!(f, "transport error"),
            CloseReason::Replaced => write!(f, "replaced"),
            CloseReason::Shutdown => write!(f, "shutdown"),
        }
    }
}

/// Registry of open sessions
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<SessionId, Arc<Session>>,
}

impl SessionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a session, returning whichever session held the id before.
    /// The displaced session is not closed here.
    pub fn put(&self, session: Arc<Session>) -> Option<Arc<Session>> {
        self.sessions.insert(session.id().clone(), session)
    }

    /// Look up an open session
    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions
            .get(id)
            .map(|entry| Arc::clone(entry.value()))
            .filter(|session| session.is_open())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    /// Remove by id. Removing an absent id is a no-op.
    pub fn remove(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.remove(id).map(|(_, session)| session)
    }

    /// Remove the entry only if it still points at `session`.
    pub fn remove_if_current(&self, session: &Arc<Session>) -> bool {
        self.sessions
            .remove_if(session.id().as_str(), |_, current| Arc::ptr_eq(current, session))
            .is_some()
    }

    /// Snapshot of every registered session
    pub fn list(&self) -> Vec<Arc<Session>> {
        self.sessions
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Registered identifiers
    pub fn ids(&self) -> Vec<SessionId> {
        self.sessions.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Mint an identifier not currently registered
    pub fn generate_id(&self) -> SessionId {
        loop {
            let id = SessionId::generate();
            if !self.contains(id.as_str()) {
                return id;
            }
        }
    }

    /// Close handler for streams that ended or failed on their own.
    ///
    /// Safe to call any number of times; only the first call for a session
    /// closes it. Returns whether this call did the closing.
    pub fn release(&self, session: &Arc<Session>, reason: CloseReason) -> bool {
        let first = session.begin_close();
        self.remove_if_current(session);
        if first {
            session.finish_close_detached();
            match reason {
                CloseReason::TransportError => {
                    warn!(session_id = %session.id(), "Session removed after transport error")
                }
                _ => info!(session_id = %session.id(), %reason, "SSE connection closed"),
            }
        } else {
            debug!(session_id = %session.id(), %reason, "Session already closed");
        }
        first
    }

    /// Explicitly close a session and remove it.
    ///
    /// The entry is removed before the engine is closed, so a failing close
    /// still leaves the registry consistent.
    pub async fn close(&self, session: &Arc<Session>, reason: CloseReason) -> Result<()> {
        let first = session.begin_close();
        self.remove_if_current(session);
        if !first {
            return Ok(());
        }
        info!(session_id = %session.id(), %reason, "Closing session");
        session.finish_close().await
    }
}

/// Runs the close handler when dropped.
///
/// Lives inside the SSE response stream, so it fires when the stream ends,
/// when the client disconnects, and when the connection errors.
pub struct SessionGuard {
    registry: Arc<SessionRegistry>,
    session: Arc<Session>,
}

impl SessionGuard {
    pub fn new(registry: Arc<SessionRegistry>, session: Arc<Session>) -> Self {
        SessionGuard { registry, session }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.registry.release(&self.session, CloseReason::Disconnected);
    }
}
