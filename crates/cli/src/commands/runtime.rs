//! Wiring shared by `agent` and `daemon`: provider, tools, agent, scheduler.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::info;

use vigil_agent::{Agent, ContextAssembler, DEFAULT_INSTRUCTIONS};
use vigil_config::AppConfig;
use vigil_core::event::Event;
use vigil_core::provider::Provider;
use vigil_scheduler::{ScheduleSelfTool, Scheduler, TaskList};
use vigil_tools::FilesystemOverview;

/// Enqueued once when the scheduler starts, so the agent gets a first turn.
pub const STARTUP_EVENT: &str = "You are now running.";

pub struct Runtime {
    pub agent: Arc<Agent>,
    pub scheduler: Scheduler,
}

impl Runtime {
    /// Build the runtime around the default provider from `config`.
    pub fn from_config(config: &AppConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let router = vigil_providers::build_from_config(config);
        let provider = router.default().ok_or("No default provider configured")?;
        Ok(Self::with_provider(config, provider))
    }

    pub fn with_provider(config: &AppConfig, provider: Arc<dyn Provider>) -> Self {
        let root = config.workspace.root.clone();
        let tasks = TaskList::new();

        let mut tools =
            vigil_tools::default_registry(root.clone(), config.workspace.allowed_commands.clone());
        tools.register(Box::new(ScheduleSelfTool::new(tasks.clone())));

        let template = config
            .agent
            .instructions
            .clone()
            .unwrap_or_else(|| DEFAULT_INSTRUCTIONS.to_string());
        let context = ContextAssembler::new(template)
            .with_environment(Arc::new(FilesystemOverview::new(root)));

        let agent = Arc::new(
            Agent::new(provider, Arc::new(tools), config.agent_config()).with_context(context),
        );

        let scheduler = Scheduler::new(Arc::clone(&agent), tasks)
            .with_tick_interval(Duration::from_millis(config.scheduler.tick_interval_ms));

        Self { agent, scheduler }
    }

    /// Start background polling and give the agent its first turn.
    pub fn start_scheduler(&self) -> JoinHandle<()> {
        self.agent.add_event(Event::new(STARTUP_EVENT));
        let handle = self.scheduler.start();
        info!(tools = ?self.agent.tools().names(), "Runtime started");
        handle
    }
}

/// Fail early with setup instructions when no key is configured.
pub fn require_api_key(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let keyless = config.default_provider == "ollama"
        || config
            .providers
            .get(&config.default_provider)
            .is_some_and(|p| p.api_key.is_some());

    if keyless || config.has_api_key() {
        return Ok(());
    }

    eprintln!();
    eprintln!("  ERROR: No API key configured!");
    eprintln!();
    eprintln!("  Set one of these environment variables:");
    eprintln!("    OPENROUTER_API_KEY=sk-or-v1-...   (recommended)");
    eprintln!("    OPENAI_API_KEY=sk-...");
    eprintln!("    GEMINI_API_KEY=...");
    eprintln!("    VIGIL_API_KEY=...                 (generic)");
    eprintln!();
    eprintln!("  Or add it to your config file:");
    eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
    eprintln!();
    Err("No API key found. See above for setup instructions.".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_core::error::ProviderError;
    use vigil_core::provider::{ChunkReceiver, ProviderRequest};

    struct Unreachable;

    #[async_trait::async_trait]
    impl Provider for Unreachable {
        fn name(&self) -> &str {
            "unreachable"
        }

        async fn stream(&self, _: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
            Err(ProviderError::Network("offline".into()))
        }
    }

    fn config_in(dir: &std::path::Path) -> AppConfig {
        let mut config = AppConfig::default();
        config.workspace.root = dir.to_path_buf();
        config
    }

    #[tokio::test]
    async fn registers_shell_and_schedule_tools() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = Runtime::with_provider(&config_in(dir.path()), Arc::new(Unreachable));
        assert_eq!(
            runtime.agent.tools().names(),
            vec!["run_bash_command", "schedule_self"]
        );
    }

    #[tokio::test]
    async fn system_prompt_shows_workspace() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.md"), "").unwrap();

        let runtime = Runtime::with_provider(&config_in(dir.path()), Arc::new(Unreachable));
        let messages = runtime.agent.snapshot().await;

        assert_eq!(messages.len(), 1);
        assert!(messages[0].text().unwrap().contains("notes.md"));
    }

    #[tokio::test]
    async fn custom_instructions_replace_the_default() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.agent.instructions = Some("You are a cat. {events}".into());

        let runtime = Runtime::with_provider(&config, Arc::new(Unreachable));
        let messages = runtime.agent.snapshot().await;

        assert_eq!(messages[0].text(), Some("You are a cat. No new events."));
    }

    #[test]
    fn ollama_needs_no_key() {
        let config = AppConfig {
            api_key: None,
            default_provider: "ollama".into(),
            ..AppConfig::default()
        };
        assert!(require_api_key(&config).is_ok());
    }
}
