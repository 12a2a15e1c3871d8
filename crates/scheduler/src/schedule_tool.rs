//! The `schedule_self` tool: the only way new scheduled tasks are created.

use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use serde::Deserialize;
use tracing::info;

use vigil_core::error::ToolError;
use vigil_core::tool::{Tool, parse_arguments};

use crate::task::TaskList;

const TOOL_NAME: &str = "schedule_self";

/// Lets the model wake itself up later with a note for its future self.
pub struct ScheduleSelfTool {
    tasks: TaskList,
}

#[derive(Debug, Deserialize)]
struct ScheduleArgs {
    delay_seconds: u64,
    context: String,
}

impl ScheduleSelfTool {
    pub fn new(tasks: TaskList) -> Self {
        Self { tasks }
    }
}

#[async_trait]
impl Tool for ScheduleSelfTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn description(&self) -> &str {
        "Schedule yourself to run again after a delay. Use this when no action is needed right now but you may want to act in a bit. The context is handed back to you when the task fires."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "delay_seconds": {
                    "type": "integer",
                    "minimum": 0,
                    "description": "In how many seconds to run again"
                },
                "context": {
                    "type": "string",
                    "description": "What you should know when the task fires"
                }
            },
            "required": ["delay_seconds", "context"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<String, ToolError> {
        let args: ScheduleArgs = parse_arguments(TOOL_NAME, arguments)?;

        let out_of_range = || ToolError::InvalidArguments {
            tool_name: TOOL_NAME.into(),
            reason: format!("delay_seconds {} is out of range", args.delay_seconds),
        };
        let delay = i64::try_from(args.delay_seconds)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .ok_or_else(out_of_range)?;
        let fire_at = Utc::now().checked_add_signed(delay).ok_or_else(out_of_range)?;

        let task = self.tasks.schedule_at(fire_at, args.context).await;
        info!(task_id = %task.id, fire_at = %task.fire_at, "Agent scheduled itself");

        Ok(format!(
            "Scheduled self to run at {}",
            task.fire_at.format("%Y-%m-%d %H:%M:%S UTC")
        ))
    }
}
