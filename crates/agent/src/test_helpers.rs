//! Shared test helpers for agent tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use vigil_core::error::ProviderError;
use vigil_core::provider::{ChunkReceiver, Provider, ProviderRequest, StreamChunk};
use vigil_core::tool::ToolCall;

type Reply = Result<Vec<Result<StreamChunk, ProviderError>>, ProviderError>;

/// A mock provider that streams a sequence of scripted replies.
///
/// Each call to `stream` pops the next reply. Every request is recorded so
/// tests can inspect exactly what the model was shown.
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new(replies: Vec<Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// A provider whose only reply is the given text, streamed in pieces.
    pub fn text(pieces: &[&str]) -> Self {
        Self::new(vec![Ok(pieces.iter().map(|p| Ok(StreamChunk::text(*p))).collect())])
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        request.system_prompt()?;
        self.requests.lock().unwrap().push(request);

        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ProviderError::NotConfigured("script exhausted".into())))?;

        let (tx, rx) = tokio::sync::mpsc::channel(reply.len().max(1));
        for item in reply {
            tx.try_send(item).unwrap();
        }
        Ok(rx)
    }
}

/// A streamed text fragment.
pub fn text(content: &str) -> Result<StreamChunk, ProviderError> {
    Ok(StreamChunk::text(content))
}

/// A streamed tool-call request.
pub fn call(id: &str, name: &str, args: serde_json::Value) -> Result<StreamChunk, ProviderError> {
    Ok(StreamChunk::tool_call(ToolCall::new(id, name, args.as_object().cloned())))
}
