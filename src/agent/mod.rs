//! Agent module - the request/tool-execution/response loop.
//!
//! The agent follows a "tools in a loop" pattern:
//! 1. Append the user query to the session history
//! 2. Call the model backend with the history and the tool catalog
//! 3. If the model wrapped a final answer in `<answer>` tags, stop
//! 4. If it requested tool calls, execute them and feed results back
//! 5. Repeat until answered or the round budget is spent

mod agent_loop;
mod answer;
mod prompt;

pub use agent_loop::{Agent, RoundOutcome};
pub use answer::{extract_answer, ANSWER_CLOSE, ANSWER_OPEN};
pub use prompt::{describe_tools, DEFAULT_SYSTEM_PROMPT};
