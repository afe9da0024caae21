//! System prompt templates for the agent.

use crate::tools::ToolCatalog;

/// Directive used when none is configured.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an assistant with access to tools provided by MCP servers. \
They can help you access web information or search for real-time data. \
Use your tools as needed to answer the user's queries and always \
include only your final answer within <answer>...</answer> tags.";

/// Markdown list of the catalog, for the startup banner and debug output.
pub fn describe_tools(tools: &ToolCatalog) -> String {
    tools
        .iter()
        .map(|t| {
            if t.description.is_empty() {
                format!("- **{}**", t.name)
            } else {
                format!("- **{}**: {}", t.name, first_line(&t.description))
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn first_line(s: &str) -> &str {
    s.lines().next().unwrap_or_default().trim()
}
