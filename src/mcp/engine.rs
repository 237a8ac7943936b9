//! MCP server engine
//!
//! One `McpEngine` per session. It answers requests posted for its session
//! by writing JSON-RPC responses onto the session's stream.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use super::protocol::{
    CallToolParams, IncomingMessage, McpError, McpRequest, McpResponse, McpToolResult,
    PROTOCOL_VERSION,
};
use crate::error::{Error, Result};
use crate::tools::ToolRegistry;
use crate::transport::{EngineFactory, ProtocolEngine, SessionChannel, SessionId};

/// Per-session MCP server
pub struct McpEngine {
    session_id: SessionId,
    tools: Arc<ToolRegistry>,
    initialized: AtomicBool,
    client_info: Mutex<Option<Value>>,
}

impl McpEngine {
    pub fn new(session_id: SessionId, tools: Arc<ToolRegistry>) -> Self {
        McpEngine {
            session_id,
            tools,
            initialized: AtomicBool::new(false),
            client_info: Mutex::new(None),
        }
    }

    /// Whether the client has completed the initialize handshake
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// `clientInfo` from the initialize request, if any
    pub fn client_info(&self) -> Option<Value> {
        self.client_info
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    async fn dispatch(&self, request: &McpRequest) -> std::result::Result<Value, McpError> {
        match request.method.as_str() {
            "initialize" => Ok(self.initialize(request.params.as_ref())),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(json!({ "tools": self.tools.definitions() })),
            "tools/call" => self.call_tool(request.params.clone()).await,
            other => Err(McpError::method_not_found(other)),
        }
    }

    fn initialize(&self, params: Option<&Value>) -> Value {
        let client_info = params.and_then(|p| p.get("clientInfo")).cloned();
        if let Some(info) = &client_info {
            info!(session_id = %self.session_id, client = %info, "MCP client initializing");
        }
        *self
            .client_info
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = client_info;

        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": { "tools": {} },
            "serverInfo": {
                "name": crate::NAME,
                "version": crate::VERSION
            }
        })
    }

    async fn call_tool(&self, params: Option<Value>) -> std::result::Result<Value, McpError> {
        let params: CallToolParams = serde_json::from_value(params.unwrap_or(Value::Null))
            .map_err(|e| McpError::invalid_params(format!("Invalid tools/call params: {}", e)))?;

        let tool = self
            .tools
            .get(&params.name)
            .ok_or_else(|| McpError::invalid_params(format!("Tool {} not found", params.name)))?;

        debug!(session_id = %self.session_id, tool = %params.name, "Calling tool");
        let result: McpToolResult = match tool.execute(params.arguments).await {
            Ok(result) => result.into(),
            Err(e) => {
                warn!(session_id = %self.session_id, tool = %params.name, "Tool failed: {}", e);
                crate::tools::ToolResult::failure(e.to_string()).into()
            }
        };

        serde_json::to_value(result).map_err(|e| McpError::internal(e.to_string()))
    }

    fn handle_notification(&self, request: &McpRequest) {
        match request.method.as_str() {
            "notifications/initialized" => {
                self.initialized.store(true, Ordering::Release);
                debug!(session_id = %self.session_id, "MCP client initialized");
            }
            method => debug!(session_id = %self.session_id, method, "Ignoring notification"),
        }
    }

    /// Write a response. Output for a session that already closed is dropped.
    fn reply(&self, channel: &SessionChannel, response: McpResponse) -> Result<()> {
        match channel.send(&response) {
            Err(Error::SessionClosed(_)) => {
                debug!(session_id = %self.session_id, "Session closed, discarding response");
                Ok(())
            }
            other => other,
        }
    }
}

#[async_trait]
impl ProtocolEngine for McpEngine {
    async fn handle_message(&self, message: Value, channel: &SessionChannel) -> Result<()> {
        let request = match IncomingMessage::classify(message) {
            Ok(IncomingMessage::Request(request)) => request,
            Ok(IncomingMessage::Response(response)) => {
                debug!(session_id = %self.session_id, %response, "Ignoring client response");
                return Ok(());
            }
            Err(error) => {
                return self.reply(channel, McpResponse::failure(Value::Null, error));
            }
        };

        if request.is_notification() {
            self.handle_notification(&request);
            return Ok(());
        }

        let id = request.id.clone().unwrap_or(Value::Null);
        let response = match self.dispatch(&request).await {
            Ok(result) => McpResponse::success(id, result),
            Err(error) => McpResponse::failure(id, error),
        };
        self.reply(channel, response)
    }

    async fn close(&self) -> Result<()> {
        debug!(session_id = %self.session_id, "MCP engine closed");
        Ok(())
    }
}

/// Builds an `McpEngine` sharing one tool registry
pub struct McpEngineFactory {
    tools: Arc<ToolRegistry>,
}

impl McpEngineFactory {
    pub fn new(tools: Arc<ToolRegistry>) -> Self {
        McpEngineFactory { tools }
    }
}

impl EngineFactory for McpEngineFactory {
    fn create(&self, session_id: &SessionId) -> Result<Arc<dyn ProtocolEngine>> {
        Ok(Arc::new(McpEngine::new(
            session_id.clone(),
            Arc::clone(&self.tools),
        )))
    }
}
