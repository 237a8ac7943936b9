//! Server info tool
//!
//! Reports which server and workspace a session is talking to.

use async_trait::async_trait;
use serde_json::Value;

use super::traits::{Tool, ToolResult};
use crate::config::UpstreamConfig;
use crate::error::{Error, Result};

/// Built-in tool: server info
pub struct ServerInfoTool {
    workspace_slug: String,
    api_host: String,
}

impl ServerInfoTool {
    pub fn new(upstream: &UpstreamConfig) -> Self {
        ServerInfoTool {
            workspace_slug: upstream.workspace_slug.clone(),
            api_host: upstream.host_url.clone(),
        }
    }
}

#[async_trait]
impl Tool for ServerInfoTool {
    fn name(&self) -> &str {
        "server_info"
    }

    fn description(&self) -> &str {
        "Show the server version and the Plane workspace it is configured for"
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {}
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        if !(args.is_null() || args.is_object()) {
            return Err(Error::InvalidInput(format!(
                "server_info takes no arguments, got {}",
                args
            )));
        }

        let info = serde_json::json!({
            "name": crate::NAME,
            "version": crate::VERSION,
            "transport": "sse",
            "workspace": self.workspace_slug,
            "api_host": self.api_host,
        });
        Ok(ToolResult::success(serde_json::to_string_pretty(&info)?))
    }
}
