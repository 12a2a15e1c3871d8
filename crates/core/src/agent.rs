//! Agent configuration and the per-agent "thinking" flag.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::conversation::DEFAULT_MAX_HISTORY;

/// Configuration for the agent's behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Model to request from the provider
    pub model: String,

    /// Sampling temperature
    #[serde(default = "default_temp")]
    pub temperature: f32,

    /// Maximum tokens per completion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Messages kept in context, SYSTEM included
    #[serde(default = "default_max_history")]
    pub max_history: usize,

    /// Maximum model round-trips per turn (safety limit)
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: u32,
}

fn default_temp() -> f32 {
    0.7
}
fn default_max_history() -> usize {
    DEFAULT_MAX_HISTORY
}
fn default_max_tool_rounds() -> u32 {
    25
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: "google/gemini-2.5-flash".into(),
            temperature: default_temp(),
            max_tokens: None,
            max_history: default_max_history(),
            max_tool_rounds: default_max_tool_rounds(),
        }
    }
}

/// Set while the agent is inside a turn.
///
/// Owned by the agent and shared (read-only) with anything that schedules
/// turns. Only [`try_begin`](Self::try_begin) sets it, and the returned guard
/// is the only thing that clears it.
#[derive(Debug, Clone, Default)]
pub struct ThinkingFlag(Arc<AtomicBool>);

impl ThinkingFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Atomically claim the flag. `None` if a turn is already running.
    pub fn try_begin(&self) -> Option<TurnGuard> {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| TurnGuard(Arc::clone(&self.0)))
    }
}

/// Clears the thinking flag when dropped, however the turn ends.
#[derive(Debug)]
pub struct TurnGuard(Arc<AtomicBool>);

impl Drop for TurnGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_from_empty_toml_fields() {
        let config: AgentConfig = serde_json::from_str(r#"{"model": "gpt-4o"}"#).unwrap();
        assert_eq!(config.max_history, 50);
        assert_eq!(config.max_tool_rounds, 25);
        assert!(config.max_tokens.is_none());
    }

    #[test]
    fn flag_is_exclusive() {
        let flag = ThinkingFlag::new();
        let guard = flag.try_begin().unwrap();
        assert!(flag.is_set());
        assert!(flag.try_begin().is_none());
        drop(guard);
        assert!(!flag.is_set());
        assert!(flag.try_begin().is_some());
    }

    #[test]
    fn clones_observe_the_same_flag() {
        let flag = ThinkingFlag::new();
        let observer = flag.clone();
        let _guard = flag.try_begin().unwrap();
        assert!(observer.is_set());
    }

    #[test]
    fn guard_clears_on_panic_unwind() {
        let flag = ThinkingFlag::new();
        let f = flag.clone();
        let result = std::panic::catch_unwind(move || {
            let _guard = f.try_begin().unwrap();
            panic!("turn blew up");
        });
        assert!(result.is_err());
        assert!(!flag.is_set());
    }
}
