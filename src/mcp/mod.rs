//! MCP client: the tool provider behind the agent.
//!
//! An [`McpSession`] owns one connection per configured server for the
//! whole agent session. With several servers, tool names are prefixed with
//! `<server>_` so they stay unique across servers.
//!
//! Local servers are spawned and spoken to over stdio. Remote servers use
//! streamable HTTP or the older HTTP+SSE transport.

pub mod protocol;

mod http;
mod pending;
mod sse;
mod stdio;

pub use http::HttpTransport;
pub use sse::SseTransport;
pub use stdio::StdioTransport;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::config::{McpServerSpec, McpServers, RemoteTransport};
use crate::error::{AgentError, Result as AgentResult};
use crate::tools::{ToolCallError, ToolDescriptor, ToolProvider};

use protocol::{initialize_params, CallToolResult, ListToolsResult, INVALID_PARAMS};

#[derive(Debug, Error)]
pub enum McpError {
    #[error("Failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Event stream error: {0}")]
    EventStream(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Server returned error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Connection to '{0}' closed")]
    Closed(String),

    #[error("Request timeout for method: {0}")]
    Timeout(String),
}

/// Transport type.
enum Transport {
    Stdio(StdioTransport),
    Http(HttpTransport),
    Sse(SseTransport),
}

impl Transport {
    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, McpError> {
        match self {
            Transport::Stdio(t) => t.request(method, params).await,
            Transport::Http(t) => t.request(method, params).await,
            Transport::Sse(t) => t.request(method, params).await,
        }
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), McpError> {
        match self {
            Transport::Stdio(t) => t.notify(method, params).await,
            Transport::Http(t) => t.notify(method, params).await,
            Transport::Sse(t) => t.notify(method, params).await,
        }
    }

    async fn close(&self) {
        match self {
            Transport::Stdio(t) => t.close().await,
            Transport::Http(t) => t.close().await,
            Transport::Sse(t) => t.close().await,
        }
    }
}

struct McpServer {
    name: String,
    transport: Transport,
}

impl McpServer {
    async fn connect(
        name: &str,
        spec: &McpServerSpec,
        timeout: Duration,
    ) -> Result<Self, McpError> {
        let transport = match spec {
            McpServerSpec::Stdio { command, args, env } => {
                Transport::Stdio(StdioTransport::spawn(name, command, args, env, timeout)?)
            }
            McpServerSpec::Http {
                url,
                headers,
                transport,
            } => match transport.unwrap_or_else(|| RemoteTransport::detect(url)) {
                RemoteTransport::StreamableHttp => {
                    Transport::Http(HttpTransport::new(name, url, headers, timeout)?)
                }
                RemoteTransport::Sse => {
                    Transport::Sse(SseTransport::connect(name, url, headers, timeout).await?)
                }
            },
        };

        let server = Self {
            name: name.to_string(),
            transport,
        };
        let init = server
            .transport
            .request("initialize", Some(initialize_params()))
            .await?;
        server
            .transport
            .notify("notifications/initialized", None)
            .await?;

        tracing::info!(
            server = %name,
            protocol = %init.get("protocolVersion").and_then(serde_json::Value::as_str).unwrap_or("unknown"),
            "Connected to MCP server"
        );
        Ok(server)
    }

    async fn list_tools(&self) -> Result<Vec<protocol::McpTool>, McpError> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let params = cursor.as_ref().map(|c| json!({ "cursor": c }));
            let result = self.transport.request("tools/list", params).await?;
            let page: ListToolsResult = serde_json::from_value(result)
                .map_err(|e| McpError::Protocol(format!("malformed tools/list result: {}", e)))?;
            tools.extend(page.tools);
            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }
        Ok(tools)
    }
}

/// Connections to every configured MCP server, opened once per session.
///
/// Call [`McpSession::shutdown`] when done. If the session is dropped
/// instead, spawned servers are still killed.
pub struct McpSession {
    servers: Vec<McpServer>,
}

impl McpSession {
    /// Spawn or connect to every server and run the MCP handshake.
    ///
    /// # Errors
    ///
    /// `AgentError::ToolDiscovery` if any server cannot be reached. Servers
    /// already connected are shut down first.
    pub async fn connect(servers: &McpServers, request_timeout: Duration) -> AgentResult<Self> {
        let mut session = Self {
            servers: Vec::with_capacity(servers.len()),
        };
        for (name, spec) in servers {
            match McpServer::connect(name, spec, request_timeout).await {
                Ok(server) => session.servers.push(server),
                Err(e) => {
                    tracing::error!(server = %name, "Failed to connect to MCP server: {}", e);
                    session.shutdown().await;
                    return Err(AgentError::ToolDiscovery(format!("{}: {}", name, e)));
                }
            }
        }
        Ok(session)
    }

    /// Close every connection. Safe to call more than once.
    pub async fn shutdown(&self) {
        for server in &self.servers {
            server.transport.close().await;
        }
    }

    fn prefixed(&self) -> bool {
        self.servers.len() > 1
    }

    /// Map an advertised tool name back to its server and original name.
    fn route<'a>(&self, name: &'a str) -> Option<(&McpServer, &'a str)> {
        if !self.prefixed() {
            return self.servers.first().map(|s| (s, name));
        }
        self.servers
            .iter()
            .filter_map(|s| {
                name.strip_prefix(s.name.as_str())
                    .and_then(|rest| rest.strip_prefix('_'))
                    .map(|tool| (s, tool))
            })
            // Longest server name wins when one name prefixes another.
            .max_by_key(|(s, _)| s.name.len())
    }
}

#[async_trait]
impl ToolProvider for McpSession {
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ToolCallError> {
        let mut descriptors = Vec::new();
        for server in &self.servers {
            let tools = server
                .list_tools()
                .await
                .map_err(|e| ToolCallError::Provider(format!("{}: {}", server.name, e)))?;
            descriptors.extend(tools.into_iter().map(|tool| {
                let name = advertised_name(&server.name, &tool.name, self.prefixed());
                tool.into_descriptor(name)
            }));
        }
        Ok(descriptors)
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<String, ToolCallError> {
        let (server, tool) = self.route(name).ok_or_else(|| {
            ToolCallError::Execution(format!("No MCP server provides '{}'", name))
        })?;

        let params = json!({ "name": tool, "arguments": arguments });
        let result = match server.transport.request("tools/call", Some(params)).await {
            Ok(result) => result,
            Err(McpError::Rpc { code, message }) if code == INVALID_PARAMS => {
                return Err(ToolCallError::Execution(message));
            }
            Err(e) => {
                return Err(ToolCallError::Provider(format!("{}: {}", server.name, e)));
            }
        };

        let result: CallToolResult = serde_json::from_value(result).map_err(|e| {
            ToolCallError::Provider(format!("{}: malformed tools/call result: {}", server.name, e))
        })?;
        let text = result.text();
        if result.is_error {
            let detail = if text.is_empty() {
                format!("Tool '{}' reported an error", tool)
            } else {
                text
            };
            return Err(ToolCallError::Execution(detail));
        }
        Ok(text)
    }
}

fn advertised_name(server: &str, tool: &str, prefixed: bool) -> String {
    if prefixed {
        format!("{}_{}", server, tool)
    } else {
        tool.to_string()
    }
}
