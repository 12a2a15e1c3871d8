//! Message domain types.
//!
//! These are the value objects that make up the model context:
//! a caller or the scheduler supplies a message → the agent appends it to the
//! conversation → the provider sees the whole ordered list.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::tool::ToolCall;

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions (identity, rules, situational context)
    System,
    /// The end user, or a synthetic trigger on the user's behalf
    User,
    /// The AI assistant
    Assistant,
}

/// What a message carries: either plain text or a batch of completed tool calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum MessageContent {
    Text(String),
    ToolCalls(Vec<ToolCall>),
}

/// A single message in a conversation.
///
/// Immutable once appended; the one exception is the SYSTEM message, whose
/// content the [`Conversation`](crate::Conversation) may replace wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: String,

    /// Who sent this message
    pub role: Role,

    /// Text or tool-call records
    pub content: MessageContent,

    /// Timestamp
    pub timestamp: DateTime<Utc>,
}

impl Message {
    fn new(role: Role, content: MessageContent) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content,
            timestamp: Utc::now(),
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, MessageContent::Text(content.into()))
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, MessageContent::Text(content.into()))
    }

    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, MessageContent::Text(content.into()))
    }

    /// Create an assistant message holding completed tool calls, in request order.
    pub fn tool_calls(calls: Vec<ToolCall>) -> Self {
        Self::new(Role::Assistant, MessageContent::ToolCalls(calls))
    }

    /// The text content, if this is a text message.
    pub fn text(&self) -> Option<&str> {
        match &self.content {
            MessageContent::Text(text) => Some(text),
            MessageContent::ToolCalls(_) => None,
        }
    }

    /// The tool-call records, if this is a tool-call message.
    pub fn calls(&self) -> &[ToolCall] {
        match &self.content {
            MessageContent::ToolCalls(calls) => calls,
            MessageContent::Text(_) => &[],
        }
    }

    pub fn is_system(&self) -> bool {
        self.role == Role::System
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_user_message() {
        let msg = Message::user("Hello, agent!");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.text(), Some("Hello, agent!"));
        assert!(msg.calls().is_empty());
    }

    #[test]
    fn tool_call_message_is_assistant() {
        let call = ToolCall::new("call_1", "echo", None);
        let msg = Message::tool_calls(vec![call]);
        assert_eq!(msg.role, Role::Assistant);
        assert_eq!(msg.text(), None);
        assert_eq!(msg.calls().len(), 1);
        assert_eq!(msg.calls()[0].name, "echo");
    }

    #[test]
    fn content_serializes_with_type_tag() {
        let msg = Message::system("Be brief");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "system");
        assert_eq!(json["content"]["type"], "text");
        assert_eq!(json["content"]["value"], "Be brief");
    }
}
