//! # vigil scheduler
//!
//! Decides when an agent takes a turn that nobody asked for directly.
//!
//! Two things wake an agent up:
//! - a [`ScheduledTask`] it created for itself through [`ScheduleSelfTool`]
//! - external [`Event`](vigil_core::Event)s waiting in its queue
//!
//! The [`Scheduler`] polls both on a fixed interval. It never starts a turn
//! while the agent is thinking; a due task that meets a busy agent is put
//! back and retried on a later tick.

pub mod schedule_tool;
pub mod task;

pub use schedule_tool::ScheduleSelfTool;
pub use task::{ScheduledTask, TaskList};

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use vigil_agent::Agent;
use vigil_core::error::Error;
use vigil_core::message::Message;

/// What one call to [`Scheduler::tick`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Scheduled tasks consumed, including those whose turn failed.
    pub tasks_fired: usize,

    /// Turns started only to process pending events.
    pub event_turns: usize,

    /// Due tasks put back because a turn was already running.
    pub deferred: usize,

    /// Turns that ended with an error.
    pub failed_turns: usize,
}

/// Receives the text of every turn the scheduler starts.
pub type ReplySink = Arc<dyn Fn(&str) + Send + Sync>;

/// Polls one agent's scheduled tasks and event queue.
#[derive(Clone)]
pub struct Scheduler {
    agent: Arc<Agent>,
    tasks: TaskList,
    tick_interval: Duration,
    on_reply: Option<ReplySink>,
}

impl Scheduler {
    pub fn new(agent: Arc<Agent>, tasks: TaskList) -> Self {
        Self {
            agent,
            tasks,
            tick_interval: Duration::from_secs(1),
            on_reply: None,
        }
    }

    /// Forward the text of scheduler-started turns, e.g. to stdout.
    pub fn with_reply_sink(mut self, sink: ReplySink) -> Self {
        self.on_reply = Some(sink);
        self
    }

    /// Set the polling period. Clamped to at least one millisecond.
    pub fn with_tick_interval(mut self, tick_interval: Duration) -> Self {
        self.tick_interval = tick_interval.max(Duration::from_millis(1));
        self
    }

    pub fn agent(&self) -> &Arc<Agent> {
        &self.agent
    }

    pub fn tasks(&self) -> &TaskList {
        &self.tasks
    }

    /// Run one scheduling pass.
    ///
    /// Every task due at the start of the pass gets its own turn, earliest
    /// first, one after another. Afterwards, if events are still pending and
    /// no turn is running, one more turn processes them.
    pub async fn tick(&self) -> TickReport {
        let mut report = TickReport::default();
        let now = Utc::now();

        while let Some(task) = self.tasks.take_due(now).await {
            if self.agent.is_thinking() {
                debug!(task_id = %task.id, "Agent busy, deferring scheduled task");
                self.tasks.restore(task).await;
                report.deferred += 1;
                break;
            }

            info!(task_id = %task.id, fire_at = %task.fire_at, "Running scheduled task");
            let message = Message::user(task.trigger_message());

            match self.agent.process(Some(message)).await {
                Ok(reply) => {
                    self.deliver(&reply);
                    report.tasks_fired += 1;
                }
                Err(Error::TurnInProgress) => {
                    debug!(task_id = %task.id, "Turn started elsewhere, deferring scheduled task");
                    self.tasks.restore(task).await;
                    report.deferred += 1;
                    break;
                }
                Err(e) => {
                    warn!(task_id = %task.id, error = %e, "Scheduled task turn failed");
                    report.tasks_fired += 1;
                    report.failed_turns += 1;
                }
            }
        }

        if !self.agent.is_thinking() && self.agent.has_pending_events() {
            info!("Processing pending events");
            match self.agent.process(None).await {
                Ok(reply) => {
                    self.deliver(&reply);
                    report.event_turns += 1;
                }
                Err(Error::TurnInProgress) => debug!("Turn started elsewhere, events stay queued"),
                Err(e) => {
                    warn!(error = %e, "Event turn failed");
                    report.event_turns += 1;
                    report.failed_turns += 1;
                }
            }
        }

        report
    }

    fn deliver(&self, reply: &str) {
        if let Some(sink) = &self.on_reply {
            if !reply.is_empty() {
                sink(reply);
            }
        }
    }

    /// Spawn the polling loop. It runs until the handle is aborted.
    pub fn start(&self) -> JoinHandle<()> {
        let scheduler = self.clone();

        info!(
            tick_ms = scheduler.tick_interval.as_millis() as u64,
            "Scheduler started"
        );

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(scheduler.tick_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                interval.tick().await;
                let report = scheduler.tick().await;
                if report != TickReport::default() {
                    debug!(?report, "Scheduler tick");
                }
            }
        })
    }
}
