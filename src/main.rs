//! mcp-agent - interactive entry point
//!
//! Connects to the configured MCP servers, discovers their tools and answers
//! queries typed on stdin.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use mcp_agent::agent::{describe_tools, Agent};
use mcp_agent::config::{load_mcp_servers, BackendKind, Config};
use mcp_agent::mcp::McpSession;
use mcp_agent::tools::ToolCatalog;
use mcp_agent::{llm, shell};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Answer queries with a language model and MCP tools.
///
/// Every option falls back to its environment variable (see `config`).
#[derive(Debug, Parser)]
#[command(name = "mcp-agent", version)]
struct Cli {
    /// Model backend: `ollama` or `openai`
    #[arg(long)]
    backend: Option<BackendKind>,

    /// Model identifier
    #[arg(long)]
    model: Option<String>,

    /// Backend base URL
    #[arg(long)]
    backend_url: Option<String>,

    /// System prompt; ask for the final answer inside <answer>...</answer> tags
    #[arg(long)]
    system_prompt: Option<String>,

    /// Model responses per query before giving up
    #[arg(long)]
    max_rounds: Option<usize>,

    /// Response/context size budget; reduce on out-of-memory errors
    #[arg(long)]
    max_tokens: Option<u32>,

    /// Path to a `{"mcpServers": {...}}` JSON file
    #[arg(long)]
    mcp_config: Option<PathBuf>,

    /// Print the full history after every query
    #[arg(long)]
    debug: bool,
}

impl Cli {
    fn apply(self, config: &mut Config) -> anyhow::Result<()> {
        if let Some(model) = self.model {
            config.model = model;
        }
        if let Some(url) = self.backend_url {
            config.backend_url = url;
        }
        if let Some(prompt) = self.system_prompt {
            config.system_prompt = prompt;
        }
        if let Some(max_rounds) = self.max_rounds {
            config.max_rounds = max_rounds;
        }
        if let Some(max_tokens) = self.max_tokens {
            config.max_tokens = max_tokens;
        }
        if let Some(path) = self.mcp_config {
            config.mcp_servers = load_mcp_servers(&path)?;
        }
        config.debug |= self.debug;
        config.validate()?;
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let default_filter = if cli.debug {
        "mcp_agent=debug"
    } else {
        "mcp_agent=info"
    };

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = Config::from_env_with_backend(cli.backend)?;
    cli.apply(&mut config)?;
    info!(
        "Loaded configuration: backend={} model={} max_rounds={}",
        config.backend, config.model, config.max_rounds
    );

    let timeout = Duration::from_secs(config.request_timeout_secs);
    let session = Arc::new(McpSession::connect(&config.mcp_servers, timeout).await?);

    let result = run(config, session.clone()).await;
    session.shutdown().await;
    result
}

async fn run(config: Config, session: Arc<McpSession>) -> anyhow::Result<()> {
    let catalog = ToolCatalog::discover(session.as_ref()).await?;
    if config.debug {
        println!("\nConnected to server with tools:\n{}", describe_tools(&catalog));
    }

    let backend = llm::build_backend(&config)?;
    let mut agent = Agent::new(config, backend, session, catalog);

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    shell::run(&mut agent, stdin, tokio::io::stdout()).await?;
    Ok(())
}
