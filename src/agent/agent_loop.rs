//! Core agent loop implementation.

use std::sync::Arc;

use serde::Serialize;

use crate::config::Config;
use crate::conversation::{Conversation, Turn};
use crate::error::Result;
use crate::llm::LlmBackend;
use crate::tools::{ToolCatalog, ToolExecutor, ToolProvider};

use super::answer::extract_answer;

/// How one user query ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoundOutcome {
    /// Content of the first non-empty `<answer>` span, if the model produced one.
    pub final_answer: Option<String>,
    /// Backend calls made for this query.
    pub rounds_consumed: usize,
    /// Tool calls attempted for this query.
    pub tools_invoked: usize,
}

impl RoundOutcome {
    /// No answer within the round budget. A valid terminal state, not an error.
    pub fn is_budget_exhausted(&self) -> bool {
        self.final_answer.is_none()
    }
}

/// The agent: one conversation, one backend, one tool provider.
///
/// # Algorithm
/// 1. Append the user query to the history
/// 2. Call the backend with the full history and the tool catalog
/// 3. If the reply contains `<answer>...</answer>`: done
/// 4. If it requests tool calls: run them in order, record the results
/// 5. Repeat until answered or `max_rounds` backend calls were made
pub struct Agent {
    config: Config,
    backend: Arc<dyn LlmBackend>,
    executor: ToolExecutor,
    catalog: ToolCatalog,
    history: Conversation,
}

impl Agent {
    /// Create an agent. The history is seeded with the configured system prompt.
    pub fn new(
        config: Config,
        backend: Arc<dyn LlmBackend>,
        provider: Arc<dyn ToolProvider>,
        catalog: ToolCatalog,
    ) -> Self {
        let history = Conversation::with_system(config.system_prompt.clone());
        Self {
            config,
            backend,
            executor: ToolExecutor::new(provider),
            catalog,
            history,
        }
    }

    /// Run one user query to completion.
    ///
    /// # Errors
    ///
    /// Backend failures, undecodable tool arguments and tool-provider
    /// failures end the query. Turns of completed rounds stay in the history;
    /// a failed round leaves nothing behind.
    pub async fn run_query(&mut self, query: &str) -> Result<RoundOutcome> {
        self.history.push(Turn::user(query));

        let invoked_before = self.executor.invocations();
        let mut final_answer = None;
        let mut rounds = 0;

        while rounds < self.config.max_rounds && final_answer.is_none() {
            rounds += 1;
            tracing::debug!("Agent round {}/{}", rounds, self.config.max_rounds);

            let reply = self
                .backend
                .converse(self.history.turns(), &self.catalog, self.config.max_tokens)
                .await?;
            let text = reply.joined_text();

            if let Some(answer) = extract_answer(&text) {
                if !reply.tool_calls.is_empty() {
                    tracing::debug!(
                        skipped = reply.tool_calls.len(),
                        "Answer found; ignoring tool calls from the same reply"
                    );
                }
                self.history.push(Turn::assistant(text));
                final_answer = Some(answer);
                break;
            }

            if reply.tool_calls.is_empty() {
                tracing::debug!("Round {} produced neither an answer nor tool calls", rounds);
                self.history.push(Turn::assistant(text));
                continue;
            }

            // Run every call before touching the history so a fatal error
            // cannot leave a tool call without its result.
            let mut results = Vec::with_capacity(reply.tool_calls.len());
            for call in &reply.tool_calls {
                results.push(self.executor.invoke(call, &self.catalog).await?);
            }
            self.history
                .push(Turn::assistant_with_tools(text, reply.tool_calls));
            self.history.extend(results);
        }

        let outcome = RoundOutcome {
            final_answer,
            rounds_consumed: rounds,
            tools_invoked: self.executor.invocations() - invoked_before,
        };
        if outcome.is_budget_exhausted() {
            tracing::info!(rounds = rounds, "No answer within the round budget");
        } else {
            tracing::info!(
                rounds = outcome.rounds_consumed,
                tools = outcome.tools_invoked,
                "Query answered"
            );
        }
        Ok(outcome)
    }

    /// Full turn history of this session.
    pub fn history(&self) -> &Conversation {
        &self.history
    }

    pub fn catalog(&self) -> &ToolCatalog {
        &self.catalog
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Tool calls attempted over the whole session.
    pub fn total_tool_invocations(&self) -> usize {
        self.executor.invocations()
    }
}
