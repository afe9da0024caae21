//! Interactive shell: one query per line until `quit`.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::agent::{Agent, RoundOutcome};

/// Whether the line ends the session.
pub fn is_quit(line: &str) -> bool {
    line.trim().eq_ignore_ascii_case("quit")
}

/// Human-readable summary of a finished query.
pub fn format_outcome(outcome: &RoundOutcome) -> String {
    let stats = format!(
        "({} round{}, {} tool call{})",
        outcome.rounds_consumed,
        plural(outcome.rounds_consumed),
        outcome.tools_invoked,
        plural(outcome.tools_invoked)
    );
    match &outcome.final_answer {
        Some(answer) => format!("Answer: {}\n{}", answer, stats),
        None => format!("No answer within {} rounds {}", outcome.rounds_consumed, stats),
    }
}

fn plural(n: usize) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}

/// Read queries from `input` and print results to `output` until `quit` or EOF.
///
/// Query failures are printed and the shell keeps going.
pub async fn run<R, W>(agent: &mut Agent, input: R, mut output: W) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    output.write_all(b"\nMCP agent started!\n").await?;
    output
        .write_all(b"Type your queries or 'quit' to exit.\n")
        .await?;

    let mut lines = input.lines();
    loop {
        output.write_all(b"\nQuery: ").await?;
        output.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let query = line.trim();
        if query.is_empty() {
            continue;
        }
        if is_quit(query) {
            break;
        }

        let message = match agent.run_query(query).await {
            Ok(outcome) => format_outcome(&outcome),
            Err(e) => {
                tracing::error!("Query failed: {}", e);
                format!("Error: {}", e)
            }
        };
        output.write_all(message.as_bytes()).await?;
        output.write_all(b"\n").await?;

        if agent.config().debug {
            output.write_all(agent.history().to_json_pretty().as_bytes()).await?;
            output.write_all(b"\n").await?;
        }
    }
    output.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{default_mcp_servers, BackendKind, Config};
    use crate::conversation::Turn;
    use crate::error::{AgentError, Result};
    use crate::llm::{BackendReply, LlmBackend};
    use crate::tools::testing::MockProvider;
    use crate::tools::ToolCatalog;
    use async_trait::async_trait;
    use std::sync::Arc;

    /// Answers with the last user message, fails on "boom".
    struct EchoBackend;

    #[async_trait]
    impl LlmBackend for EchoBackend {
        async fn converse(
            &self,
            history: &[Turn],
            _tools: &ToolCatalog,
            _max_tokens: u32,
        ) -> Result<BackendReply> {
            let last_user = history
                .iter()
                .rev()
                .find_map(|t| match t {
                    Turn::User { content } => Some(content.clone()),
                    _ => None,
                })
                .unwrap_or_default();
            if last_user == "boom" {
                return Err(AgentError::BackendUnavailable("connection refused".into()));
            }
            if last_user == "mumble" {
                return Ok(BackendReply::text("hmm"));
            }
            Ok(BackendReply::text(format!("<answer>{}</answer>", last_user)))
        }
    }

    async fn agent(debug: bool) -> Agent {
        let mut config = Config::new(BackendKind::Ollama, "test", default_mcp_servers());
        config.max_rounds = 2;
        config.debug = debug;
        let provider = Arc::new(MockProvider::with_tools(&["search"]));
        let catalog = ToolCatalog::discover(provider.as_ref()).await.unwrap();
        Agent::new(config, Arc::new(EchoBackend), provider, catalog)
    }

    async fn run_lines(agent: &mut Agent, input: &str) -> String {
        let mut output = Vec::new();
        run(agent, input.as_bytes(), &mut output).await.unwrap();
        String::from_utf8(output).unwrap()
    }

    #[test]
    fn quit_is_case_insensitive() {
        assert!(is_quit("quit"));
        assert!(is_quit("  QUIT \n"));
        assert!(!is_quit("quite"));
    }

    #[test]
    fn formats_answer_and_budget_exhaustion() {
        let answered = RoundOutcome {
            final_answer: Some("sunny".into()),
            rounds_consumed: 3,
            tools_invoked: 1,
        };
        assert_eq!(format_outcome(&answered), "Answer: sunny\n(3 rounds, 1 tool call)");

        let exhausted = RoundOutcome {
            final_answer: None,
            rounds_consumed: 2,
            tools_invoked: 0,
        };
        assert_eq!(
            format_outcome(&exhausted),
            "No answer within 2 rounds (2 rounds, 0 tool calls)"
        );
    }

    #[tokio::test]
    async fn answers_until_quit() {
        let mut agent = agent(false).await;
        let output = run_lines(&mut agent, "hello\n\nQuit\nnever asked\n").await;

        assert!(output.contains("Answer: hello"));
        assert!(!output.contains("never asked"));
        // system + one user/assistant pair
        assert_eq!(agent.history().len(), 3);
    }

    #[tokio::test]
    async fn errors_are_reported_and_shell_continues() {
        let mut agent = agent(false).await;
        let output = run_lines(&mut agent, "boom\nmumble\nagain\n").await;

        assert!(output.contains("Error: Backend unavailable: connection refused"));
        assert!(output.contains("No answer within 2 rounds"));
        assert!(output.contains("Answer: again"));
    }

    #[tokio::test]
    async fn debug_dumps_history() {
        let mut agent = agent(true).await;
        let output = run_lines(&mut agent, "hi\n").await;
        assert!(output.contains("\"role\": \"user\""));
    }
}
