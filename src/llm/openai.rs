//! Hosted function-calling backend (OpenAI Responses API).
//!
//! The response is a list of output items. Message items carry text,
//! `function_call` items carry tool calls whose arguments are a JSON string
//! that still has to be decoded.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::conversation::{ToolCall, Turn};
use crate::error::{AgentError, Result};
use crate::tools::ToolCatalog;

use super::{post_json, BackendReply, LlmBackend};

pub struct OpenAiBackend {
    client: reqwest::Client,
    responses_url: String,
    model: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct ResponsesResponse {
    #[serde(default)]
    output: Vec<OutputItem>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum OutputItem {
    Message {
        #[serde(default)]
        content: Vec<ContentPart>,
    },
    FunctionCall {
        call_id: String,
        name: String,
        arguments: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct ContentPart {
    #[serde(default)]
    text: Option<String>,
}

impl OpenAiBackend {
    pub fn new(client: reqwest::Client, base_url: &str, model: &str, api_key: String) -> Self {
        Self {
            client,
            responses_url: format!("{}/v1/responses", base_url.trim_end_matches('/')),
            model: model.to_string(),
            api_key,
        }
    }

    fn request_body(&self, history: &[Turn], tools: &ToolCatalog, max_tokens: u32) -> Value {
        json!({
            "model": self.model,
            "input": history.iter().flat_map(to_input_items).collect::<Vec<_>>(),
            "tools": tool_schemas(tools),
            "max_output_tokens": max_tokens,
            "truncation": "auto",
        })
    }
}

#[async_trait]
impl LlmBackend for OpenAiBackend {
    async fn converse(
        &self,
        history: &[Turn],
        tools: &ToolCatalog,
        max_tokens: u32,
    ) -> Result<BackendReply> {
        let body = self.request_body(history, tools, max_tokens);
        let request = self
            .client
            .post(&self.responses_url)
            .header("Authorization", format!("Bearer {}", self.api_key));
        let response: ResponsesResponse = post_json(request, &body).await?;
        parse_reply(response)
    }
}

fn to_input_items(turn: &Turn) -> Vec<Value> {
    match turn {
        Turn::System { content } => vec![json!({"role": "developer", "content": content})],
        Turn::User { content } => vec![json!({"role": "user", "content": content})],
        Turn::Assistant {
            content,
            tool_calls,
        } => {
            let mut items = Vec::with_capacity(tool_calls.len() + 1);
            if !content.is_empty() {
                items.push(json!({"role": "assistant", "content": content}));
            }
            items.extend(tool_calls.iter().map(|c| {
                json!({
                    "type": "function_call",
                    "call_id": c.id,
                    "name": c.name,
                    "arguments": Value::Object(c.arguments.clone()).to_string(),
                })
            }));
            items
        }
        Turn::ToolResult {
            call_id, payload, ..
        } => vec![json!({
            "type": "function_call_output",
            "call_id": call_id,
            "output": payload,
        })],
    }
}

fn tool_schemas(tools: &ToolCatalog) -> Vec<Value> {
    tools
        .iter()
        .map(|t| {
            json!({
                "type": "function",
                "name": t.name,
                "description": t.description,
                "parameters": t.input_schema,
            })
        })
        .collect()
}

fn parse_reply(response: ResponsesResponse) -> Result<BackendReply> {
    let mut reply = BackendReply::default();
    for item in response.output {
        match item {
            OutputItem::Message { content } => {
                let text = content
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect::<Vec<_>>()
                    .join(" ");
                reply.text_segments.push(text);
            }
            OutputItem::FunctionCall {
                call_id,
                name,
                arguments,
            } => {
                let arguments = decode_arguments(&name, &arguments)?;
                reply.tool_calls.push(ToolCall::new(call_id, name, arguments));
            }
            OutputItem::Other => {}
        }
    }
    Ok(reply)
}

fn decode_arguments(tool: &str, raw: &str) -> Result<Map<String, Value>> {
    if raw.trim().is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(AgentError::ArgumentDecode {
            tool: tool.to_string(),
            reason: format!("expected a JSON object, got {}", other),
        }),
        Err(e) => Err(AgentError::ArgumentDecode {
            tool: tool.to_string(),
            reason: e.to_string(),
        }),
    }
}
