//! # mcp-agent
//!
//! A conversational agent driver that answers queries with MCP tools.
//!
//! This library provides:
//! - A tool-based agent loop that stops on an `<answer>...</answer>` marker
//! - Two model backends: a local Ollama chat backend and the hosted OpenAI
//!   Responses API
//! - An MCP client that discovers and invokes tools over stdio or HTTP
//! - A line-oriented interactive shell
//!
//! ## Architecture
//!
//! The agent follows the "tools in a loop" pattern:
//! 1. Connect to the MCP servers and discover the tool catalog
//! 2. Send the conversation and the catalog to the model
//! 3. Execute any tool calls in order and append the results
//! 4. Repeat until the model answers or the round budget runs out
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use mcp_agent::{agent::Agent, config::Config, llm, mcp::McpSession, tools::ToolCatalog};
//!
//! let config = Config::from_env()?;
//! let session = Arc::new(McpSession::connect(&config.mcp_servers, timeout).await?);
//! let catalog = ToolCatalog::discover(session.as_ref()).await?;
//! let backend = llm::build_backend(&config)?;
//! let mut agent = Agent::new(config, backend, session.clone(), catalog);
//! let outcome = agent.run_query("What is the weather in Paris?").await?;
//! session.shutdown().await;
//! ```

pub mod agent;
pub mod config;
pub mod conversation;
pub mod error;
pub mod llm;
pub mod mcp;
pub mod shell;
pub mod tools;

#[cfg(test)]
mod test_server;

pub use config::Config;
pub use error::{AgentError, Result};
