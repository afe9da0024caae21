//! JSON-RPC 2.0 message types and the MCP payloads the agent uses.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::tools::ToolDescriptor;

use super::McpError;

pub const JSONRPC_VERSION: &str = "2.0";
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// JSON-RPC "invalid params" error code.
pub const INVALID_PARAMS: i64 = -32602;
pub const METHOD_NOT_FOUND: i64 = -32601;

#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            method: method.into(),
            params,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: &'static str,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            method: method.into(),
            params,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub id: Value,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// The `result` member, or the `error` member as an `McpError::Rpc`.
    pub fn into_result(self) -> Result<Value, McpError> {
        if let Some(error) = self.error {
            return Err(McpError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        Ok(self.result.unwrap_or(Value::Null))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Our answer to a request the server sent us.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcReply {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

/// A request initiated by the server.
#[derive(Debug, Clone)]
pub struct ServerRequest {
    pub id: Value,
    pub method: String,
}

impl ServerRequest {
    /// `ping` gets an empty result. The client offers no other capability,
    /// so everything else is "method not found".
    pub fn reply(&self) -> JsonRpcReply {
        let (result, error) = match self.method.as_str() {
            "ping" => (Some(json!({})), None),
            other => (
                None,
                Some(JsonRpcError {
                    code: METHOD_NOT_FOUND,
                    message: format!("Method not found: {}", other),
                    data: None,
                }),
            ),
        };
        JsonRpcReply {
            jsonrpc: JSONRPC_VERSION,
            id: self.id.clone(),
            result,
            error,
        }
    }
}

/// Anything a server may send us.
#[derive(Debug)]
pub enum IncomingMessage {
    Response(JsonRpcResponse),
    Notification { method: String },
    Request(ServerRequest),
}

pub fn parse_incoming(raw: &str) -> Result<IncomingMessage, McpError> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| McpError::Protocol(format!("invalid JSON-RPC message: {}", e)))?;

    let method = value.get("method").and_then(Value::as_str).map(str::to_string);
    let id = value.get("id").filter(|id| !id.is_null()).cloned();

    match (method, id) {
        (Some(method), Some(id)) => Ok(IncomingMessage::Request(ServerRequest { id, method })),
        (Some(method), None) => Ok(IncomingMessage::Notification { method }),
        (None, _) => serde_json::from_value(value)
            .map(IncomingMessage::Response)
            .map_err(|e| McpError::Protocol(format!("invalid JSON-RPC response: {}", e))),
    }
}

pub fn initialize_params() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {},
        "clientInfo": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
        }
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListToolsResult {
    #[serde(default)]
    pub tools: Vec<McpTool>,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpTool {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub input_schema: Value,
}

impl McpTool {
    pub fn into_descriptor(self, name: String) -> ToolDescriptor {
        ToolDescriptor {
            name,
            description: self.description.unwrap_or_default(),
            input_schema: self.input_schema,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    #[serde(default)]
    pub content: Vec<Value>,
    #[serde(default)]
    pub is_error: bool,
}

impl CallToolResult {
    /// Text items joined with newlines; other items become `[type]` placeholders.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .map(|item| match item.get("type").and_then(Value::as_str) {
                Some("text") => item
                    .get("text")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                Some(other) => format!("[{}]", other),
                None => item.to_string(),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
