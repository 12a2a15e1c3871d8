//! Agent-level streaming events.
//!
//! `AgentStreamEvent` wraps provider-level stream chunks and tool dispatch
//! into the items a caller of [`Agent::stream`](crate::Agent::stream) sees.

use serde::{Deserialize, Serialize};

/// Events emitted by the agent during a turn.
///
/// - `chunk`: partial text token from the LLM
/// - `tool_call`: agent is about to invoke a tool
/// - `tool_result`: tool execution completed (in request order)
/// - `done`: the turn is complete
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentStreamEvent {
    /// Partial text token from the LLM.
    Chunk { content: String },

    /// The agent is calling a tool.
    ToolCall {
        id: String,
        name: String,
        input: serde_json::Value,
    },

    /// Tool execution completed. Failures arrive here too, as their
    /// description.
    ToolResult {
        id: String,
        name: String,
        response: String,
    },

    /// The turn is complete.
    Done {
        iterations: usize,
        tool_calls_made: usize,
    },
}
