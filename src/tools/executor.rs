//! Tool invocation: resolve a model's tool call, run it, record the result.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::conversation::{ToolCall, Turn};
use crate::error::{AgentError, Result};

use super::{ToolCallError, ToolCatalog, ToolProvider};

/// Runs tool calls against a provider and turns outcomes into conversation turns.
pub struct ToolExecutor {
    provider: Arc<dyn ToolProvider>,
    invocations: AtomicUsize,
}

impl ToolExecutor {
    pub fn new(provider: Arc<dyn ToolProvider>) -> Self {
        Self {
            provider,
            invocations: AtomicUsize::new(0),
        }
    }

    /// Execute a single tool call.
    ///
    /// Unknown tools and tool execution errors come back as failed
    /// `ToolResult` turns. Only provider failures are returned as `Err`.
    pub async fn invoke(&self, call: &ToolCall, catalog: &ToolCatalog) -> Result<Turn> {
        self.invocations.fetch_add(1, Ordering::Relaxed);

        if !catalog.contains(&call.name) {
            tracing::warn!(tool = %call.name, call_id = %call.id, "Model requested unknown tool");
            let available = catalog.names().collect::<Vec<_>>().join(", ");
            return Ok(Turn::tool_result(
                call,
                false,
                format!("Unknown tool '{}'. Available tools: {}", call.name, available),
            ));
        }

        tracing::debug!(
            tool = %call.name,
            call_id = %call.id,
            args = %serde_json::Value::Object(call.arguments.clone()),
            "Calling tool"
        );

        match self
            .provider
            .call_tool(&call.name, call.arguments.clone())
            .await
        {
            Ok(output) => {
                tracing::debug!(
                    tool = %call.name,
                    "Tool result: {}",
                    truncate_for_log(&output, 500)
                );
                Ok(Turn::tool_result(call, true, output))
            }
            Err(ToolCallError::Execution(detail)) => {
                tracing::warn!(tool = %call.name, error = %detail, "Tool execution failed");
                Ok(Turn::tool_result(call, false, detail))
            }
            Err(ToolCallError::Provider(detail)) => Err(AgentError::ToolProvider(format!(
                "{} (while calling '{}')",
                detail, call.name
            ))),
        }
    }

    /// Tool calls attempted so far in this session.
    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::Relaxed)
    }
}

/// Truncate a string for logging purposes.
fn truncate_for_log(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... [truncated]", &s[..end])
}
