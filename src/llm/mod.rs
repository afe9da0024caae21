//! Model backends.
//!
//! Both backends take the full conversation plus the tool catalog and return
//! the same normalized [`BackendReply`]. The variant is picked once, when the
//! agent is built, from [`crate::config::BackendKind`].

mod ollama;
mod openai;

pub use ollama::OllamaBackend;
pub use openai::OpenAiBackend;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::{BackendKind, Config};
use crate::conversation::{ToolCall, Turn};
use crate::error::{AgentError, Result};
use crate::tools::ToolCatalog;

/// Normalized result of one backend call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackendReply {
    /// Free-text output, in emission order.
    pub text_segments: Vec<String>,
    /// Requested tool calls, in emission order.
    pub tool_calls: Vec<ToolCall>,
}

impl BackendReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text_segments: vec![text.into()],
            tool_calls: Vec::new(),
        }
    }

    /// All text segments joined with newlines.
    pub fn joined_text(&self) -> String {
        self.text_segments.join("\n")
    }
}

/// A chat model that can request tool calls.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// One request/response exchange. Never retried internally.
    async fn converse(
        &self,
        history: &[Turn],
        tools: &ToolCatalog,
        max_tokens: u32,
    ) -> Result<BackendReply>;
}

/// Build the backend selected by the configuration.
pub fn build_backend(config: &Config) -> Result<Arc<dyn LlmBackend>> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .build()
        .map_err(|e| {
            AgentError::BackendUnavailable(format!("Failed to build HTTP client: {}", e))
        })?;

    let backend: Arc<dyn LlmBackend> = match config.backend {
        BackendKind::Ollama => Arc::new(OllamaBackend::new(
            client,
            &config.backend_url,
            &config.model,
        )),
        BackendKind::OpenAi => Arc::new(OpenAiBackend::new(
            client,
            &config.backend_url,
            &config.model,
            config.api_key.clone().unwrap_or_default(),
        )),
    };
    tracing::info!(
        backend = %config.backend,
        model = %config.model,
        url = %config.backend_url,
        "Using model backend"
    );
    Ok(backend)
}

/// Send a JSON body and decode a JSON response, mapping every failure to
/// `BackendUnavailable`.
async fn post_json<T: serde::de::DeserializeOwned>(
    request: reqwest::RequestBuilder,
    body: &serde_json::Value,
) -> Result<T> {
    let response = request.json(body).send().await?;
    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(AgentError::BackendUnavailable(format!(
            "HTTP {}: {}",
            status,
            text.chars().take(500).collect::<String>()
        )));
    }
    response
        .json::<T>()
        .await
        .map_err(|e| AgentError::BackendUnavailable(format!("Invalid response body: {}", e)))
}
