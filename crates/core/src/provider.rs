//! Provider trait — the abstraction over LLM backends.
//!
//! A Provider knows how to send a conversation plus tool definitions to an LLM
//! and hand back a stream of items, each either a text fragment or a completed
//! tool-call request.
//!
//! Implementations: OpenAI-compatible endpoints (see `vigil-providers`), and
//! scripted providers in tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::ProviderError;
use crate::message::Message;
use crate::tool::ToolCall;

/// Configuration for a provider request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// The model to use (e.g., "google/gemini-2.5-flash", "gpt-4o")
    pub model: String,

    /// The full conversation, SYSTEM message included
    pub messages: Vec<Message>,

    /// Temperature (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Available tools the model can call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
}

fn default_temperature() -> f32 {
    0.7
}

impl ProviderRequest {
    /// The SYSTEM prompt text. Every provider must refuse a request without one.
    pub fn system_prompt(&self) -> Result<&str, ProviderError> {
        self.messages
            .iter()
            .find(|m| m.is_system())
            .and_then(|m| m.text())
            .ok_or(ProviderError::MissingSystemPrompt)
    }
}

/// A tool definition sent to the LLM so it knows what tools it can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// A single item in a streaming response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamChunk {
    /// Partial text, forwarded to the caller as it arrives.
    Text { content: String },

    /// A fully assembled tool-call request (no response yet).
    ToolCall { call: ToolCall },
}

impl StreamChunk {
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text {
            content: content.into(),
        }
    }

    pub fn tool_call(call: ToolCall) -> Self {
        Self::ToolCall { call }
    }
}

/// The receiving half of a provider stream.
///
/// Finite and non-restartable: the stream is over when the channel closes. An
/// `Err` item is fatal to the turn that is consuming it.
pub type ChunkReceiver = mpsc::Receiver<Result<StreamChunk, ProviderError>>;

/// The core Provider trait.
///
/// Every LLM backend implements this trait. The agent loop calls `stream()`
/// without knowing which provider is being used.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "openrouter").
    fn name(&self) -> &str;

    /// Send a request and get a stream of text fragments and tool-call requests.
    ///
    /// Must fail with [`ProviderError::MissingSystemPrompt`] when the request
    /// carries no SYSTEM message.
    async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError>;
}
