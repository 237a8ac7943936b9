//! # Plane MCP Gateway
//!
//! Serves the Model Context Protocol to remote clients over Server-Sent
//! Events.
//!
//! ## Features
//!
//! - **Session multiplexing:** one SSE stream per client, many concurrent clients
//! - **Message routing:** `POST /messages?sessionId=` delivers to the right session
//! - **Graceful shutdown:** SIGINT/SIGTERM drain every open session
//! - **Pluggable protocol:** the transport only knows the `ProtocolEngine` trait

pub mod config;
pub mod error;
pub mod gateway;
pub mod mcp;
pub mod tools;
pub mod transport;

pub use config::Config;
pub use error::{Error, Result};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const NAME: &str = env!("CARGO_PKG_NAME");
