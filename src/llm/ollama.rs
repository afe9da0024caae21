//! Local chat backend (Ollama `/api/chat`).
//!
//! One non-streaming request per round. Tool calls arrive inside the
//! response message with their arguments already decoded into an object.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::conversation::{ToolCall, Turn};
use crate::error::{AgentError, Result};
use crate::tools::ToolCatalog;

use super::{post_json, BackendReply, LlmBackend};

pub struct OllamaBackend {
    client: reqwest::Client,
    chat_url: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ResponseToolCall>,
}

#[derive(Debug, Deserialize)]
struct ResponseToolCall {
    #[serde(default)]
    id: Option<String>,
    function: ResponseFunction,
}

#[derive(Debug, Deserialize)]
struct ResponseFunction {
    name: String,
    #[serde(default)]
    arguments: Value,
}

impl OllamaBackend {
    pub fn new(client: reqwest::Client, base_url: &str, model: &str) -> Self {
        Self {
            client,
            chat_url: format!("{}/api/chat", base_url.trim_end_matches('/')),
            model: model.to_string(),
        }
    }

    fn request_body(&self, history: &[Turn], tools: &ToolCatalog, max_tokens: u32) -> Value {
        json!({
            "model": self.model,
            "messages": history.iter().map(to_message).collect::<Vec<_>>(),
            "tools": tool_schemas(tools),
            "stream": false,
            "options": { "num_ctx": max_tokens },
        })
    }
}

#[async_trait]
impl LlmBackend for OllamaBackend {
    async fn converse(
        &self,
        history: &[Turn],
        tools: &ToolCatalog,
        max_tokens: u32,
    ) -> Result<BackendReply> {
        let body = self.request_body(history, tools, max_tokens);
        let response: ChatResponse = post_json(self.client.post(&self.chat_url), &body).await?;
        parse_reply(response)
    }
}

fn to_message(turn: &Turn) -> Value {
    match turn {
        Turn::System { content } => json!({"role": "system", "content": content}),
        Turn::User { content } => json!({"role": "user", "content": content}),
        Turn::Assistant {
            content,
            tool_calls,
        } => {
            let mut message = json!({"role": "assistant", "content": content});
            if !tool_calls.is_empty() {
                message["tool_calls"] = tool_calls
                    .iter()
                    .map(|c| {
                        json!({
                            "function": {"name": c.name, "arguments": c.arguments}
                        })
                    })
                    .collect();
            }
            message
        }
        Turn::ToolResult {
            tool_name, payload, ..
        } => json!({"role": "tool", "content": payload, "tool_name": tool_name}),
    }
}

fn tool_schemas(tools: &ToolCatalog) -> Vec<Value> {
    tools
        .iter()
        .map(|t| {
            json!({
                "type": "function",
                "function": {
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.input_schema,
                }
            })
        })
        .collect()
}

fn parse_reply(response: ChatResponse) -> Result<BackendReply> {
    let message = response.message;
    let tool_calls = message
        .tool_calls
        .into_iter()
        .map(|call| {
            let arguments = match call.function.arguments {
                Value::Object(map) => map,
                Value::Null => Map::new(),
                other => {
                    return Err(AgentError::ArgumentDecode {
                        tool: call.function.name,
                        reason: format!("expected an object, got {}", other),
                    })
                }
            };
            let id = call
                .id
                .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4().simple()));
            Ok(ToolCall::new(id, call.function.name, arguments))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(BackendReply {
        text_segments: vec![message.content.unwrap_or_default()],
        tool_calls,
    })
}
