//! Configuration management for mcp-agent.
//!
//! Configuration can be set via environment variables and overridden on the
//! command line:
//! - `MCP_AGENT_BACKEND` - Optional. `ollama` (default) or `openai`.
//! - `MCP_AGENT_MODEL` - Optional. Model identifier. Defaults per backend.
//! - `OLLAMA_URL` - Optional. Ollama server URL. Defaults to `http://127.0.0.1:11434`.
//! - `OPENAI_BASE_URL` - Optional. OpenAI API base URL. Defaults to `https://api.openai.com`.
//! - `OPENAI_API_KEY` - Required when the backend is `openai`.
//! - `MCP_AGENT_SYSTEM_PROMPT` - Optional. System directive sent before every conversation.
//! - `MCP_AGENT_MAX_ROUNDS` - Optional. Model responses per query before giving up.
//!   Defaults to `30`.
//! - `MCP_AGENT_MAX_TOKENS` - Optional. Response/context size budget. Defaults to `10000`.
//! - `MCP_AGENT_TIMEOUT_SECS` - Optional. HTTP and MCP request timeout. Defaults to `300`.
//! - `MCP_AGENT_DEBUG` - Optional. Dump the full history after every query.
//! - `MCP_AGENT_SERVERS` - Optional. Path to a `{"mcpServers": {...}}` JSON file.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::agent::DEFAULT_SYSTEM_PROMPT;

pub const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";
pub const DEFAULT_OPENAI_URL: &str = "https://api.openai.com";
pub const DEFAULT_OLLAMA_MODEL: &str = "qwen3:latest";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4.1-mini";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse MCP server config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Which model backend drives the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Local chat-style backend (Ollama `/api/chat`).
    Ollama,
    /// Hosted function-calling backend (OpenAI Responses API).
    OpenAi,
}

impl BackendKind {
    pub fn default_url(self) -> &'static str {
        match self {
            Self::Ollama => DEFAULT_OLLAMA_URL,
            Self::OpenAi => DEFAULT_OPENAI_URL,
        }
    }

    pub fn default_model(self) -> &'static str {
        match self {
            Self::Ollama => DEFAULT_OLLAMA_MODEL,
            Self::OpenAi => DEFAULT_OPENAI_MODEL,
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ollama => write!(f, "ollama"),
            Self::OpenAi => write!(f, "openai"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ollama" | "local" => Ok(Self::Ollama),
            "openai" | "hosted" => Ok(Self::OpenAi),
            other => Err(format!("expected 'ollama' or 'openai', got: {}", other)),
        }
    }
}

/// Wire protocol of a remote MCP server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RemoteTransport {
    /// One POST per message, replies as JSON or a short SSE stream.
    #[serde(alias = "http")]
    StreamableHttp,
    /// A GET event stream plus POSTs to the endpoint it announces.
    Sse,
}

impl RemoteTransport {
    /// Guess from the URL: a path ending in `/sse` is the SSE transport.
    pub fn detect(url: &str) -> Self {
        let is_sse = reqwest::Url::parse(url)
            .map(|u| u.path().trim_end_matches('/').ends_with("/sse"))
            .unwrap_or(false);
        if is_sse {
            Self::Sse
        } else {
            Self::StreamableHttp
        }
    }
}

/// How to reach one MCP server.
///
/// Deserializes from the usual `mcpServers` entry shape: an entry with a
/// `url` is a remote server, an entry with a `command` is spawned locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum McpServerSpec {
    Http {
        url: String,
        #[serde(default, skip_serializing_if = "HashMap::is_empty")]
        headers: HashMap<String, String>,
        /// Detected from the URL when absent.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        transport: Option<RemoteTransport>,
    },
    Stdio {
        command: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        args: Vec<String>,
        /// Added on top of the inherited environment.
        #[serde(default, skip_serializing_if = "HashMap::is_empty")]
        env: HashMap<String, String>,
    },
}

/// Logical server name → connection spec.
pub type McpServers = BTreeMap<String, McpServerSpec>;

#[derive(Debug, Deserialize)]
struct McpServersFile {
    #[serde(rename = "mcpServers")]
    mcp_servers: McpServers,
}

/// Load a `{"mcpServers": {...}}` file.
pub fn load_mcp_servers(path: &Path) -> Result<McpServers, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_mcp_servers(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn parse_mcp_servers(contents: &str) -> Result<McpServers, serde_json::Error> {
    let file: McpServersFile = serde_json::from_str(contents)?;
    Ok(file.mcp_servers)
}

/// The Playwright MCP server, launched through `npx`.
pub fn default_mcp_servers() -> McpServers {
    let mut servers = McpServers::new();
    servers.insert(
        "playwright".to_string(),
        McpServerSpec::Stdio {
            command: "npx".to_string(),
            args: vec!["@playwright/mcp@latest".to_string(), "--isolated".to_string()],
            env: HashMap::new(),
        },
    );
    servers
}

/// Agent configuration. Immutable for the lifetime of one agent.
#[derive(Debug, Clone)]
pub struct Config {
    /// Which backend variant to talk to
    pub backend: BackendKind,

    /// Model identifier understood by the backend
    pub model: String,

    /// Backend base URL
    pub backend_url: String,

    /// Bearer token for hosted backends
    pub api_key: Option<String>,

    /// System directive seeding every session
    pub system_prompt: String,

    /// Maximum backend calls per query
    pub max_rounds: usize,

    /// Response/context size budget passed to the backend
    pub max_tokens: u32,

    /// Timeout applied by the HTTP client and to MCP requests
    pub request_timeout_secs: u64,

    /// Dump the history after each query
    pub debug: bool,

    /// Tool providers to connect to
    pub mcp_servers: McpServers,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` if the backend is `openai` and
    /// `OPENAI_API_KEY` is not set.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_with_backend(None)
    }

    /// Like [`Config::from_env`], with the backend chosen by the caller
    /// instead of `MCP_AGENT_BACKEND`.
    pub fn from_env_with_backend(backend: Option<BackendKind>) -> Result<Self, ConfigError> {
        let backend = match (backend, std::env::var("MCP_AGENT_BACKEND")) {
            (Some(backend), _) => backend,
            (None, Ok(v)) => v
                .parse::<BackendKind>()
                .map_err(|e| ConfigError::InvalidValue("MCP_AGENT_BACKEND".to_string(), e))?,
            (None, Err(_)) => BackendKind::Ollama,
        };

        let model = std::env::var("MCP_AGENT_MODEL")
            .unwrap_or_else(|_| backend.default_model().to_string());

        let url_var = match backend {
            BackendKind::Ollama => "OLLAMA_URL",
            BackendKind::OpenAi => "OPENAI_BASE_URL",
        };
        let backend_url =
            std::env::var(url_var).unwrap_or_else(|_| backend.default_url().to_string());

        let api_key = std::env::var("OPENAI_API_KEY").ok();
        if backend == BackendKind::OpenAi && api_key.is_none() {
            return Err(ConfigError::MissingEnvVar("OPENAI_API_KEY".to_string()));
        }

        let system_prompt = std::env::var("MCP_AGENT_SYSTEM_PROMPT")
            .unwrap_or_else(|_| DEFAULT_SYSTEM_PROMPT.to_string());

        let max_rounds = parse_env("MCP_AGENT_MAX_ROUNDS", 30usize)?;
        let max_tokens = parse_env("MCP_AGENT_MAX_TOKENS", 10_000u32)?;
        let request_timeout_secs = parse_env("MCP_AGENT_TIMEOUT_SECS", 300u64)?;

        let debug = std::env::var("MCP_AGENT_DEBUG")
            .ok()
            .map(|v| {
                parse_bool(&v)
                    .map_err(|e| ConfigError::InvalidValue("MCP_AGENT_DEBUG".to_string(), e))
            })
            .transpose()?
            .unwrap_or(false);

        let mcp_servers = match std::env::var("MCP_AGENT_SERVERS") {
            Ok(path) => load_mcp_servers(Path::new(&path))?,
            Err(_) => default_mcp_servers(),
        };

        let config = Self {
            backend,
            model,
            backend_url,
            api_key,
            system_prompt,
            max_rounds,
            max_tokens,
            request_timeout_secs,
            debug,
            mcp_servers,
        };
        config.validate()?;
        Ok(config)
    }

    /// Create a config with custom values (useful for testing).
    pub fn new(backend: BackendKind, model: impl Into<String>, mcp_servers: McpServers) -> Self {
        Self {
            backend,
            model: model.into(),
            backend_url: backend.default_url().to_string(),
            api_key: None,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            max_rounds: 30,
            max_tokens: 10_000,
            request_timeout_secs: 300,
            debug: false,
            mcp_servers,
        }
    }

    /// Check the budgets and the server map.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_rounds == 0 {
            return Err(ConfigError::InvalidValue(
                "max_rounds".to_string(),
                "must be at least 1".to_string(),
            ));
        }
        if self.max_tokens == 0 {
            return Err(ConfigError::InvalidValue(
                "max_tokens".to_string(),
                "must be at least 1".to_string(),
            ));
        }
        if self.mcp_servers.is_empty() {
            return Err(ConfigError::InvalidValue(
                "mcp_servers".to_string(),
                "at least one MCP server is required".to_string(),
            ));
        }
        if self.backend == BackendKind::OpenAi && self.api_key.is_none() {
            return Err(ConfigError::MissingEnvVar("OPENAI_API_KEY".to_string()));
        }
        Ok(())
    }
}

fn parse_env<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match std::env::var(name) {
        Ok(v) => v
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}

pub(crate) fn parse_bool(value: &str) -> Result<bool, String> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "t" | "yes" | "y" | "on" => Ok(true),
        "0" | "false" | "f" | "no" | "n" | "off" => Ok(false),
        other => Err(format!("expected boolean-like value, got: {}", other)),
    }
}
