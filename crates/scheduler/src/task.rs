//! Self-issued future triggers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// A turn the agent asked to be woken up for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledTask {
    pub id: String,

    /// Never fires before this instant.
    pub fire_at: DateTime<Utc>,

    /// Free-form note the agent left for its future self.
    pub context: String,
}

impl ScheduledTask {
    pub fn new(fire_at: DateTime<Utc>, context: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            fire_at,
            context: context.into(),
        }
    }

    /// The synthetic message that starts the task's turn.
    pub fn trigger_message(&self) -> String {
        format!(
            "Running scheduled task at {}. Here is your context: {}.",
            self.fire_at.format("%Y-%m-%d %H:%M:%S UTC"),
            self.context
        )
    }
}

/// The pending scheduled tasks of one agent.
///
/// Cloning yields another handle on the same list: the self-scheduling tool
/// pushes into it, the scheduler consumes from it.
#[derive(Debug, Clone, Default)]
pub struct TaskList {
    tasks: Arc<RwLock<Vec<ScheduledTask>>>,
}

impl TaskList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a task firing at `fire_at`.
    pub async fn schedule_at(
        &self,
        fire_at: DateTime<Utc>,
        context: impl Into<String>,
    ) -> ScheduledTask {
        let task = ScheduledTask::new(fire_at, context);
        self.tasks.write().await.push(task.clone());
        task
    }

    /// Remove and return the earliest task with `fire_at <= now`.
    pub async fn take_due(&self, now: DateTime<Utc>) -> Option<ScheduledTask> {
        let mut tasks = self.tasks.write().await;
        let index = tasks
            .iter()
            .enumerate()
            .filter(|(_, t)| t.fire_at <= now)
            .min_by_key(|(_, t)| t.fire_at)
            .map(|(i, _)| i)?;
        Some(tasks.remove(index))
    }

    /// Put back a task that was taken but could not run yet.
    pub async fn restore(&self, task: ScheduledTask) {
        self.tasks.write().await.push(task);
    }

    /// All pending tasks, soonest first.
    pub async fn list(&self) -> Vec<ScheduledTask> {
        let mut tasks = self.tasks.read().await.clone();
        tasks.sort_by_key(|t| t.fire_at);
        tasks
    }

    pub async fn len(&self) -> usize {
        self.tasks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tasks.read().await.is_empty()
    }
}
