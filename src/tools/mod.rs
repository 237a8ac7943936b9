//! Tools module - tools exposed to MCP clients
//!
//! Each tool implements the `Tool` trait and is registered into a
//! `ToolRegistry`. One registry is shared by every session's engine and
//! served through `tools/list` and `tools/call`.
//!
//! ## Built-in Tools
//!
//! - **server_info**: Server version and configured workspace
//!
//! ## Adding a New Tool
//!
//! 1. Create a new file in `src/tools/` (e.g., `my_tool.rs`)
//! 2. Implement the `Tool` trait
//! 3. Add `mod my_tool;` and `pub use` in this file
//! 4. Register it in `src/bin/gateway.rs`

mod registry;
mod server_info;
mod traits;

// Core trait and types
pub use traits::{Tool, ToolResult};

// Registry
pub use registry::ToolRegistry;

// Built-in tools
pub use server_info::ServerInfoTool;
