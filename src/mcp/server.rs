use std::sync::Arc;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::canonical::Canonicaliser;
use crate::history::HistoryCoordinator;
use crate::mcp::{prompts, resources, tools};
use crate::protocol::ProtocolPort;
use crate::store::MessageStore;

pub const PROTOCOL_VERSION: &str = "2024-11-05";

#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    #[serde(default)]
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

impl RpcError {
    pub fn method_not_found(method: &str) -> Self {
        Self {
            code: -32601,
            message: format!("method not found: {method}"),
        }
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self {
            code: -32602,
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RpcResponse {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    fn result(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    fn error(id: Value, error: RpcError) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(error),
        }
    }
}

pub struct McpServer {
    pub(super) store: Arc<MessageStore>,
    pub(super) port: Arc<dyn ProtocolPort>,
    pub(super) history: Arc<HistoryCoordinator>,
    pub(super) canonical: Canonicaliser,
    pub(super) timezone: Tz,
}

impl McpServer {
    pub fn new(
        store: Arc<MessageStore>,
        port: Arc<dyn ProtocolPort>,
        history: Arc<HistoryCoordinator>,
        canonical: Canonicaliser,
        timezone: Tz,
    ) -> Self {
        Self {
            store,
            port,
            history,
            canonical,
            timezone,
        }
    }

    /// Dispatches one JSON-RPC request. Notifications return `None` (no
    /// response body).
    pub async fn handle(&self, request: RpcRequest) -> Option<RpcResponse> {
        if request.id.is_none() || request.method.starts_with("notifications/") {
            return None;
        }
        let id = request.id.unwrap_or(Value::Null);

        let result = match request.method.as_str() {
            "initialize" => Ok(self.initialize()),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(tools::list_tools()),
            "tools/call" => self.call_tool(request.params).await,
            "prompts/list" => Ok(prompts::list_prompts()),
            "prompts/get" => prompts::get_prompt(request.params),
            "resources/list" => Ok(resources::list_resources()),
            "resources/read" => resources::read_resource(request.params),
            method => Err(RpcError::method_not_found(method)),
        };

        Some(match result {
            Ok(value) => RpcResponse::result(id, value),
            Err(error) => RpcResponse::error(id, error),
        })
    }

    fn initialize(&self) -> Value {
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {
                "tools": {},
                "prompts": {},
                "resources": {},
            },
            "serverInfo": {
                "name": "WhatsApp MCP",
                "version": env!("CARGO_PKG_VERSION"),
            },
            "instructions": "WhatsApp integration for messaging operations.\n\n\
                Key workflow: find_chat -> get_chat_messages or send_message.\n\
                Always get chat_jid from find_chat before other operations.\n\
                JIDs are WhatsApp identifiers (e.g., 5511999999999@s.whatsapp.net).",
        })
    }

    async fn call_tool(&self, params: Option<Value>) -> Result<Value, RpcError> {
        #[derive(Deserialize)]
        struct CallParams {
            name: String,
            #[serde(default)]
            arguments: Value,
        }

        let CallParams { name, arguments } = serde_json::from_value(params.unwrap_or(Value::Null))
            .map_err(|e| RpcError::invalid_params(format!("invalid tool call: {e}")))?;
        // Clients may omit arguments entirely.
        let arguments = match arguments {
            Value::Null => Value::Object(Default::default()),
            other => other,
        };

        let outcome = match name.as_str() {
            "list_chats" => self.tool_list_chats(arguments).await,
            "get_chat_messages" => self.tool_get_chat_messages(arguments).await,
            "search_messages" => self.tool_search_messages(arguments).await,
            "find_chat" => self.tool_find_chat(arguments).await,
            "send_message" => self.tool_send_message(arguments).await,
            "load_more_messages" => self.tool_load_more_messages(arguments).await,
            other => Err(format!("unknown tool: {other}")),
        };

        // Tool failures are reported in-band so the calling model can react.
        let (text, is_error) = match outcome {
            Ok(text) => (text, false),
            Err(message) => (message, true),
        };
        Ok(json!({
            "content": [{ "type": "text", "text": text }],
            "isError": is_error,
        }))
    }
}
