//! Session-multiplexed streaming transport
//!
//! Every `GET /sse` connection becomes a [`Session`] held in the
//! [`SessionRegistry`] under its identifier. Follow-up `POST /messages`
//! requests look the session up by identifier and forward their payload into
//! the session's [`ProtocolEngine`], which answers over the stream that opened the session.
//!
//! ## Architecture
//!
//! ```text
//!   GET /sse ──accept──▶ Session ──put──▶ SessionRegistry ◀──drain── Lifecycle
//!                           ▲                   │
//!                           │ events            │ get
//!                           │                   ▼
//!                    ProtocolEngine ◀──forward── POST /messages?sessionId=
//! ```
//!
//! - **session**: identifier, output channel and lifecycle state
//! - **registry**: concurrent id → session map plus the close handler
//! - **engine**: the seam a protocol implementation plugs into
//! - **lifecycle**: RUNNING → DRAINING → STOPPED shutdown coordination

mod engine;
mod lifecycle;
mod registry;
mod session;

pub use engine::{EngineFactory, ProtocolEngine};
pub use lifecycle::{termination_signal, DrainReport, Lifecycle, LifecycleState, ShutdownTrigger};
pub use registry::{CloseReason, SessionGuard, SessionRegistry};
pub use session::{Session, SessionChannel, SessionEvent, SessionId, SessionState};
