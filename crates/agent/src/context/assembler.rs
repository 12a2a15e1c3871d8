//! System prompt assembly.
//!
//! The SYSTEM message is re-rendered at the start of every turn from an
//! instruction template. Three placeholders are recognised:
//!
//! | Placeholder | Source |
//! |-------------|--------|
//! | `{current_time}` | wall clock, UTC |
//! | `{events}` | events drained from the queue for this turn |
//! | `{environment}` | the configured [`Environment`], if any |
//!
//! Substitution is single-pass: text coming from events or the environment is
//! never itself scanned for placeholders.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use vigil_core::{Environment, Event};

use crate::context::events::format_events;

/// The built-in instruction template.
pub const DEFAULT_INSTRUCTIONS: &str = "\
# Identity
You are a long-running, general-purpose assistant. You are woken up by events \
from the outside world, by the user, and by tasks you scheduled for yourself. \
Use your tools to act on what you are told. The current time in UTC is {current_time}.

# Workspace
Everything you know lives in your workspace. Keep it up to date: write down \
anything you need to remember, because your conversation history is bounded \
and older messages will be forgotten.

A high-level overview of the workspace:
{environment}

# Scheduling
If something needs to happen later, or you want to check back on a task, \
call `schedule_self` with a delay in seconds and enough context to pick up \
where you left off.

# Events
Events that occurred since you last looked:
{events}
";

/// Renders the SYSTEM prompt for one turn.
#[derive(Clone)]
pub struct ContextAssembler {
    template: String,
    environment: Option<Arc<dyn Environment>>,
}

impl ContextAssembler {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            environment: None,
        }
    }

    /// Attach the source of the `{environment}` section.
    pub fn with_environment(mut self, environment: Arc<dyn Environment>) -> Self {
        self.environment = Some(environment);
        self
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// Render the template for a turn starting at `now` with the given events.
    pub fn render(&self, now: DateTime<Utc>, events: &[Event]) -> String {
        let mut out = String::with_capacity(self.template.len() + 256);
        let mut rest = self.template.as_str();

        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let tail = &rest[open..];

            let Some(close) = tail.find('}') else {
                rest = tail;
                break;
            };

            match &tail[1..close] {
                "current_time" => out.push_str(&now.format("%Y-%m-%d %H:%M:%S").to_string()),
                "events" => out.push_str(&format_events(events)),
                "environment" => out.push_str(&self.environment_overview()),
                _ => out.push_str(&tail[..=close]),
            }
            rest = &tail[close + 1..];
        }

        out.push_str(rest);
        out
    }

    fn environment_overview(&self) -> String {
        self.environment
            .as_ref()
            .map(|env| env.overview())
            .unwrap_or_else(|| "No environment overview available.".into())
    }
}

impl Default for ContextAssembler {
    fn default() -> Self {
        Self::new(DEFAULT_INSTRUCTIONS)
    }
}

impl std::fmt::Debug for ContextAssembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextAssembler")
            .field("template_len", &self.template.len())
            .field("has_environment", &self.environment.is_some())
            .finish()
    }
}
