//! MCP (Model Context Protocol) module
//!
//! Server side of the Model Context Protocol. Each SSE session gets its own
//! engine; all engines share one tool registry.
//!
//! ## Architecture
//!
//! - **protocol**: Wire protocol types (JSON-RPC based)
//! - **engine**: Per-session request handling, plugged into the transport
//!   through `ProtocolEngine`
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use plane_mcp_gateway::mcp::McpEngineFactory;
//! use plane_mcp_gateway::tools::ToolRegistry;
//!
//! let engines = McpEngineFactory::new(Arc::new(ToolRegistry::new()));
//! ```

mod engine;
mod protocol;

pub use engine::{McpEngine, McpEngineFactory};
pub use protocol::{
    error_codes, CallToolParams, IncomingMessage, McpContent, McpError, McpRequest, McpResponse,
    McpTool, McpToolResult, JSONRPC_VERSION, PROTOCOL_VERSION,
};
