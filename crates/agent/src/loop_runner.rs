//! The agent turn loop implementation.

use std::sync::Arc;

use async_stream::try_stream;
use chrono::Utc;
use futures::future::join_all;
use futures::{Stream, StreamExt};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use vigil_core::agent::{AgentConfig, ThinkingFlag};
use vigil_core::conversation::Conversation;
use vigil_core::error::{Error, ToolError};
use vigil_core::event::{Event, EventQueue};
use vigil_core::message::Message;
use vigil_core::provider::{Provider, ProviderRequest, StreamChunk};
use vigil_core::tool::{ToolCall, ToolRegistry};

use crate::context::ContextAssembler;
use crate::stream_event::AgentStreamEvent;

/// One agent instance: a conversation, the tools it may call, and the state a
/// scheduler needs to decide when the next turn may start.
pub struct Agent {
    /// The LLM provider to use
    provider: Arc<dyn Provider>,

    /// Tool registry, fixed after construction
    tools: Arc<ToolRegistry>,

    /// The bounded model context
    conversation: Mutex<Conversation>,

    /// Set for the whole extent of a turn
    thinking: ThinkingFlag,

    /// External events waiting for the next turn
    events: EventQueue,

    /// Renders the SYSTEM message before every turn
    context: ContextAssembler,

    config: AgentConfig,
}

impl Agent {
    /// Create a new agent with the built-in instruction template.
    pub fn new(provider: Arc<dyn Provider>, tools: Arc<ToolRegistry>, config: AgentConfig) -> Self {
        let context = ContextAssembler::default();
        let conversation = Conversation::new(context.render(Utc::now(), &[]), config.max_history);

        Self {
            provider,
            tools,
            conversation: Mutex::new(conversation),
            thinking: ThinkingFlag::new(),
            events: EventQueue::new(),
            context,
            config,
        }
    }

    /// Replace the context assembler (template and environment).
    pub fn with_context(mut self, context: ContextAssembler) -> Self {
        self.conversation
            .get_mut()
            .replace_system(context.render(Utc::now(), &[]));
        self.context = context;
        self
    }

    /// Share an existing event queue, e.g. one a producer already holds.
    pub fn with_events(mut self, events: EventQueue) -> Self {
        self.events = events;
        self
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// True while a turn is running.
    pub fn is_thinking(&self) -> bool {
        self.thinking.is_set()
    }

    /// A read handle on the thinking flag.
    pub fn thinking_flag(&self) -> ThinkingFlag {
        self.thinking.clone()
    }

    /// A producer handle on this agent's event queue.
    pub fn events(&self) -> EventQueue {
        self.events.clone()
    }

    /// Enqueue an external event for the next turn.
    pub fn add_event(&self, event: Event) {
        debug!(event_id = %event.id, "Event queued");
        self.events.push(event);
    }

    pub fn has_pending_events(&self) -> bool {
        !self.events.is_empty()
    }

    /// The current conversation, as the model would see it.
    ///
    /// Waits for a running turn to finish.
    pub async fn snapshot(&self) -> Vec<Message> {
        self.conversation.lock().await.snapshot()
    }

    /// Run one turn, streaming text deltas and tool results as they happen.
    ///
    /// The turn starts when the stream is first polled. It fails immediately
    /// with [`Error::TurnInProgress`] if another turn holds the thinking flag.
    /// A provider error ends the stream with that error; anything appended to
    /// the conversation before it stays there.
    pub fn stream(
        &self,
        message: Option<Message>,
    ) -> impl Stream<Item = Result<AgentStreamEvent, Error>> + Send + '_ {
        try_stream! {
            let _turn = self.thinking.try_begin().ok_or(Error::TurnInProgress)?;
            let mut conversation = self.conversation.lock().await;

            let events = self.events.drain();
            conversation.replace_system(self.context.render(Utc::now(), &events));
            if let Some(message) = message {
                conversation.push(message);
            }

            info!(
                conversation_id = %conversation.id,
                messages = conversation.len(),
                events = events.len(),
                "Starting turn"
            );

            let tool_definitions = self.tools.definitions();
            let mut iterations = 0usize;
            let mut tool_calls_made = 0usize;

            loop {
                if iterations >= self.config.max_tool_rounds as usize {
                    warn!(
                        conversation_id = %conversation.id,
                        iterations,
                        "Max tool rounds reached, ending turn"
                    );
                    break;
                }
                iterations += 1;

                debug!(conversation_id = %conversation.id, iteration = iterations, "Agent loop iteration");

                let request = ProviderRequest {
                    model: self.config.model.clone(),
                    messages: conversation.snapshot(),
                    temperature: self.config.temperature,
                    max_tokens: self.config.max_tokens,
                    tools: tool_definitions.clone(),
                };

                let mut chunks = self.provider.stream(request).await?;
                let mut text = String::new();
                let mut pending: Vec<ToolCall> = Vec::new();
                let mut failure = None;

                while let Some(item) = chunks.recv().await {
                    match item {
                        Ok(StreamChunk::Text { content }) => {
                            text.push_str(&content);
                            yield AgentStreamEvent::Chunk { content };
                        }
                        Ok(StreamChunk::ToolCall { call }) => pending.push(call),
                        Err(e) => {
                            failure = Some(e);
                            break;
                        }
                    }
                }

                if !text.is_empty() {
                    conversation.push(Message::assistant(text));
                }

                if let Some(e) = failure {
                    warn!(conversation_id = %conversation.id, error = %e, "Provider stream failed mid-turn");
                    Err::<(), _>(e)?;
                }

                if pending.is_empty() {
                    break;
                }

                for call in &pending {
                    yield AgentStreamEvent::ToolCall {
                        id: call.id.clone(),
                        name: call.name.clone(),
                        input: call.arguments(),
                    };
                }

                debug!(tool_count = pending.len(), "Executing tool calls");
                let completed = self.dispatch(pending).await;
                tool_calls_made += completed.len();
                conversation.push(Message::tool_calls(completed.clone()));

                for call in completed {
                    yield AgentStreamEvent::ToolResult {
                        id: call.id,
                        name: call.name,
                        response: call.response.unwrap_or_default(),
                    };
                }
            }

            info!(
                conversation_id = %conversation.id,
                iterations,
                tool_calls_made,
                "Turn complete"
            );

            yield AgentStreamEvent::Done { iterations, tool_calls_made };
        }
    }

    /// Run one turn to completion and return all the text it produced.
    pub async fn process(&self, message: Option<Message>) -> Result<String, Error> {
        let mut stream = std::pin::pin!(self.stream(message));
        let mut text = String::new();

        while let Some(event) = stream.next().await {
            if let AgentStreamEvent::Chunk { content } = event? {
                text.push_str(&content);
            }
        }

        Ok(text)
    }

    /// Execute a batch of tool calls concurrently.
    ///
    /// Every call gets a response: failures are folded into the response
    /// text. The returned records keep the request order.
    async fn dispatch(&self, mut calls: Vec<ToolCall>) -> Vec<ToolCall> {
        let handles = calls.iter().map(|call| {
            let tools = Arc::clone(&self.tools);
            let call = call.clone();
            tokio::spawn(async move { tools.execute(&call).await })
        });

        let results = join_all(handles).await;

        for (call, joined) in calls.iter_mut().zip(results) {
            let outcome = joined.unwrap_or_else(|e| {
                Err(ToolError::ExecutionFailed {
                    tool_name: call.name.clone(),
                    reason: e.to_string(),
                })
            });

            match outcome {
                Ok(output) => call.respond(output),
                Err(e) => {
                    warn!(tool = %call.name, call_id = %call.id, error = %e, "Tool execution failed");
                    call.respond(format!("Error: {e}"));
                }
            }
        }

        calls
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{ScriptedProvider, call, text};
    use serde_json::json;
    use vigil_core::error::ProviderError;
    use vigil_core::message::Role;
    use vigil_core::tool::{Tool, parse_arguments};

    struct EchoTool;

    #[async_trait::async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str { "echo" }
        fn description(&self) -> &str { "Echoes back the input" }
        fn parameters_schema(&self) -> serde_json::Value {
            json!({
                "type": "object",
                "properties": { "text": { "type": "string" } },
                "required": ["text"]
            })
        }
        async fn execute(&self, arguments: serde_json::Value) -> Result<String, ToolError> {
            #[derive(serde::Deserialize)]
            struct Args { text: String }
            let args: Args = parse_arguments(self.name(), arguments)?;
            Ok(format!("echo: {}", args.text))
        }
    }

    /// Sleeps for a duration given in its arguments, to scramble completion order.
    struct SleepTool;

    #[async_trait::async_trait]
    impl Tool for SleepTool {
        fn name(&self) -> &str { "sleep" }
        fn description(&self) -> &str { "Sleeps" }
        fn parameters_schema(&self) -> serde_json::Value {
            json!({ "type": "object", "properties": { "ms": { "type": "integer" } } })
        }
        async fn execute(&self, arguments: serde_json::Value) -> Result<String, ToolError> {
            let ms = arguments["ms"].as_u64().unwrap_or(0);
            tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
            Ok(format!("slept {ms}"))
        }
    }

    fn registry() -> Arc<ToolRegistry> {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        registry.register(Box::new(SleepTool));
        Arc::new(registry)
    }

    fn agent(provider: Arc<ScriptedProvider>) -> Agent {
        Agent::new(provider, registry(), AgentConfig::default())
    }

    #[tokio::test]
    async fn text_only_turn_appends_one_assistant_message() {
        let provider = Arc::new(ScriptedProvider::text(&["Hello! ", "How can I help?"]));
        let agent = agent(provider.clone());

        let response = agent.process(Some(Message::user("Hello!"))).await.unwrap();

        assert_eq!(response, "Hello! How can I help?");
        assert_eq!(provider.call_count(), 1);
        let history = agent.snapshot().await;
        // System + User + Assistant
        assert_eq!(history.len(), 3);
        assert_eq!(history[2].role, Role::Assistant);
        assert_eq!(history[2].text(), Some("Hello! How can I help?"));
    }

    #[tokio::test]
    async fn text_deltas_stream_in_order_before_done() {
        let provider = Arc::new(ScriptedProvider::text(&["a", "b", "c"]));
        let agent = agent(provider);

        let events: Vec<_> = agent
            .stream(Some(Message::user("go")))
            .map(|e| e.unwrap())
            .collect()
            .await;

        assert_eq!(events.len(), 4);
        assert_eq!(events[0], AgentStreamEvent::Chunk { content: "a".into() });
        assert_eq!(events[2], AgentStreamEvent::Chunk { content: "c".into() });
        assert_eq!(
            events[3],
            AgentStreamEvent::Done { iterations: 1, tool_calls_made: 0 }
        );
    }

    #[tokio::test]
    async fn tool_calls_are_answered_and_turn_continues() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok(vec![
                text("Let me check. "),
                call("c1", "echo", json!({"text": "hi"})),
                call("c2", "missing_tool", json!({})),
            ]),
            Ok(vec![text("Done.")]),
        ]));
        let agent = agent(provider.clone());

        let response = agent.process(Some(Message::user("do it"))).await.unwrap();
        assert_eq!(response, "Let me check. Done.");
        assert_eq!(provider.call_count(), 2);

        let history = agent.snapshot().await;
        // System, User, Assistant text, Assistant tool calls, Assistant text
        assert_eq!(history.len(), 5);
        let records = history[3].calls();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, "c1");
        assert_eq!(records[0].response.as_deref(), Some("echo: hi"));
        assert_eq!(records[1].id, "c2");
        assert!(records[1].response.as_deref().unwrap().contains("not found"));

        // The second request shows the model its tool results.
        let second = &provider.requests()[1];
        assert_eq!(second.messages.last().unwrap().calls().len(), 2);
    }

    #[tokio::test]
    async fn tool_records_keep_request_order_regardless_of_completion() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok(vec![
                call("slow", "sleep", json!({"ms": 50})),
                call("fast", "sleep", json!({"ms": 0})),
            ]),
            Ok(vec![text("ok")]),
        ]));
        let agent = agent(provider);

        let events: Vec<_> = agent
            .stream(None)
            .map(|e| e.unwrap())
            .collect()
            .await;

        let results: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                AgentStreamEvent::ToolResult { id, .. } => Some(id.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(results, vec!["slow", "fast"]);
        assert!(matches!(
            events.last(),
            Some(AgentStreamEvent::Done { iterations: 2, tool_calls_made: 2 })
        ));
    }

    #[tokio::test]
    async fn invalid_arguments_become_error_response() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok(vec![call("c1", "echo", json!({"text": 5}))]),
            Ok(vec![text("sorry")]),
        ]));
        let agent = agent(provider);

        agent.process(None).await.unwrap();

        let history = agent.snapshot().await;
        let response = history
            .iter()
            .flat_map(|m| m.calls())
            .next()
            .and_then(|c| c.response.clone())
            .unwrap();
        assert!(response.starts_with("Error: "));
        assert!(response.contains("Invalid arguments"));
    }

    #[tokio::test]
    async fn thinking_flag_cleared_after_provider_error() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(vec![
            text("partial"),
            Err(ProviderError::StreamInterrupted("connection reset".into())),
        ])]));
        let agent = agent(provider);

        assert!(!agent.is_thinking());
        let err = agent.process(Some(Message::user("hi"))).await.unwrap_err();
        assert!(matches!(err, Error::Provider(ProviderError::StreamInterrupted(_))));
        assert!(!agent.is_thinking());

        // Partial text is kept.
        let history = agent.snapshot().await;
        assert_eq!(history.last().unwrap().text(), Some("partial"));
    }

    #[tokio::test]
    async fn thinking_flag_cleared_after_request_failure() {
        let provider = Arc::new(ScriptedProvider::new(vec![Err(ProviderError::Network(
            "unreachable".into(),
        ))]));
        let agent = agent(provider);

        assert!(agent.process(None).await.is_err());
        assert!(!agent.is_thinking());
    }

    #[tokio::test]
    async fn concurrent_turn_is_rejected() {
        let provider = Arc::new(ScriptedProvider::text(&["one"]));
        let agent = agent(provider);

        let _held = agent.thinking.try_begin().unwrap();
        let err = agent.process(Some(Message::user("hi"))).await.unwrap_err();
        assert!(matches!(err, Error::TurnInProgress));
        // The rejected turn appended nothing.
        assert_eq!(agent.snapshot().await.len(), 1);
    }

    #[tokio::test]
    async fn events_are_folded_into_system_prompt_once() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok(vec![text("noted")]),
            Ok(vec![text("nothing new")]),
        ]));
        let agent = agent(provider.clone());

        agent.add_event(Event::new("package delivered"));
        assert!(agent.has_pending_events());

        agent.process(None).await.unwrap();
        assert!(!agent.has_pending_events());
        agent.process(None).await.unwrap();

        let requests = provider.requests();
        let first = requests[0].system_prompt().unwrap();
        let second = requests[1].system_prompt().unwrap();
        assert!(first.contains("package delivered"));
        assert!(!second.contains("package delivered"));
        assert!(second.contains("No new events."));
    }

    #[tokio::test]
    async fn history_is_bounded() {
        let replies = (0..4).map(|i| Ok(vec![text(&format!("r{i}"))])).collect();
        let provider = Arc::new(ScriptedProvider::new(replies));
        let config = AgentConfig {
            max_history: 3,
            ..AgentConfig::default()
        };
        let agent = Agent::new(provider, registry(), config);

        for i in 0..4 {
            agent.process(Some(Message::user(format!("u{i}")))).await.unwrap();
        }

        let history = agent.snapshot().await;
        assert_eq!(history.len(), 3);
        assert!(history[0].is_system());
        assert_eq!(history[2].text(), Some("r3"));
    }

    #[tokio::test]
    async fn max_tool_rounds_ends_turn_after_persisting_results() {
        let replies = (0..5)
            .map(|i| Ok(vec![call(&format!("c{i}"), "echo", json!({"text": "again"}))]))
            .collect();
        let provider = Arc::new(ScriptedProvider::new(replies));
        let config = AgentConfig {
            max_tool_rounds: 2,
            ..AgentConfig::default()
        };
        let agent = Agent::new(provider.clone(), registry(), config);

        agent.process(None).await.unwrap();

        assert_eq!(provider.call_count(), 2);
        let history = agent.snapshot().await;
        assert_eq!(history.last().unwrap().calls()[0].id, "c1");
        assert!(!agent.is_thinking());
    }

    #[tokio::test]
    async fn custom_context_renders_environment() {
        let provider = Arc::new(ScriptedProvider::text(&["ok"]));
        let context = ContextAssembler::new("Env:\n{environment}")
            .with_environment(Arc::new(|| "notes/".to_string()));
        let agent = agent(provider.clone()).with_context(context);

        assert_eq!(agent.snapshot().await[0].text(), Some("Env:\nnotes/"));
        agent.process(None).await.unwrap();
        assert_eq!(provider.requests()[0].system_prompt().unwrap(), "Env:\nnotes/");
    }
}
