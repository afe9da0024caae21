//! Error types for the agent.
//!
//! Only failures that end a query live in [`AgentError`]. Recoverable tool
//! failures never reach the caller: the executor turns them into tool-result
//! turns so the model can react in the next round. Running out of rounds is
//! not an error either, see [`crate::agent::RoundOutcome::is_budget_exhausted`].

use thiserror::Error;

use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum AgentError {
    /// The tool provider could not be reached or advertised an unusable catalog.
    #[error("Tool discovery failed: {0}")]
    ToolDiscovery(String),

    /// Transport failure or unusable response from the model backend.
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// A function-calling backend sent tool arguments that are not a JSON object.
    #[error("Could not decode arguments for tool '{tool}': {reason}")]
    ArgumentDecode { tool: String, reason: String },

    /// The tool provider failed in a way that is not a tool execution error.
    #[error("Tool provider failure: {0}")]
    ToolProvider(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type Result<T> = std::result::Result<T, AgentError>;

impl From<reqwest::Error> for AgentError {
    fn from(e: reqwest::Error) -> Self {
        AgentError::BackendUnavailable(e.to_string())
    }
}
