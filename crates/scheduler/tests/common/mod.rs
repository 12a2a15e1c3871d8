#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use vigil_agent::Agent;
use vigil_core::agent::AgentConfig;
use vigil_core::error::ProviderError;
use vigil_core::provider::{ChunkReceiver, Provider, ProviderRequest, StreamChunk};
use vigil_core::tool::{ToolCall, ToolRegistry};
use vigil_scheduler::{ScheduleSelfTool, Scheduler, TaskList};

/// Replays scripted replies, optionally slowly, and records how many
/// requests were in flight at once.
pub struct InstrumentedProvider {
    replies: Mutex<VecDeque<Vec<StreamChunk>>>,
    requests: Mutex<Vec<ProviderRequest>>,
    delay: Duration,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl InstrumentedProvider {
    pub fn new(replies: Vec<Vec<StreamChunk>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Provider for InstrumentedProvider {
    fn name(&self) -> &str {
        "instrumented"
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        request.system_prompt()?;

        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ProviderError::NotConfigured("script exhausted".into()))?;

        let (tx, rx) = tokio::sync::mpsc::channel(reply.len().max(1));
        for chunk in reply {
            tx.try_send(Ok(chunk)).unwrap();
        }
        Ok(rx)
    }
}

pub fn text(content: &str) -> Vec<StreamChunk> {
    vec![StreamChunk::text(content)]
}

pub fn schedule_call(id: &str, delay_seconds: i64, context: &str) -> Vec<StreamChunk> {
    let args = serde_json::json!({ "delay_seconds": delay_seconds, "context": context });
    vec![StreamChunk::tool_call(ToolCall::new(
        id,
        "schedule_self",
        args.as_object().cloned(),
    ))]
}

/// An agent wired to `provider` with `schedule_self` registered, plus its scheduler.
pub fn harness(provider: Arc<InstrumentedProvider>) -> (Arc<Agent>, Scheduler) {
    let tasks = TaskList::new();

    let mut registry = ToolRegistry::new();
    registry.register(Box::new(ScheduleSelfTool::new(tasks.clone())));

    let agent = Arc::new(Agent::new(provider, Arc::new(registry), AgentConfig::default()));
    let scheduler = Scheduler::new(Arc::clone(&agent), tasks);
    (agent, scheduler)
}

/// Text of the last message in a recorded request.
pub fn last_message_text(request: &ProviderRequest) -> String {
    request
        .messages
        .last()
        .and_then(|m| m.text())
        .unwrap_or_default()
        .to_string()
}
