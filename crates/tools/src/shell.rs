//! Shell tool: run a command inside the agent's workspace.
//!
//! Commands go through `sh -c` (`cmd /C` on Windows). The tool keeps its
//! historical name `run_bash_command`, but nothing bash-specific is assumed.
//!
//! With an allowlist configured, only a single plain command may run: shell
//! operators that could chain or substitute another command are refused.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use vigil_core::error::ToolError;
use vigil_core::tool::{Tool, parse_arguments};

const TOOL_NAME: &str = "run_bash_command";

/// Characters that let one command line start another one.
const SHELL_CONTROL: &[char] = &[';', '&', '|', '`', '$', '<', '>', '(', ')', '\n', '\r'];

/// Execute shell commands with safety constraints.
pub struct ShellTool {
    /// Working directory for every command.
    root: PathBuf,
    /// If non-empty, only these commands are allowed.
    allowed_commands: Vec<String>,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct ShellArgs {
    command: String,
}

impl ShellTool {
    pub fn new(root: impl Into<PathBuf>, allowed_commands: Vec<String>) -> Self {
        Self {
            root: root.into(),
            allowed_commands,
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn check_allowed(&self, command: &str) -> Result<(), ToolError> {
        if self.allowed_commands.is_empty() {
            return Ok(()); // No allowlist = all commands allowed
        }

        let denied = |reason: String| ToolError::PermissionDenied {
            tool_name: TOOL_NAME.into(),
            reason,
        };

        if let Some(c) = command.chars().find(|c| SHELL_CONTROL.contains(c)) {
            return Err(denied(format!(
                "shell operator {c:?} is not allowed when an allowlist is configured"
            )));
        }

        let base_cmd = command.split_whitespace().next().unwrap_or("");
        if self.allowed_commands.iter().any(|a| a == base_cmd) {
            Ok(())
        } else {
            Err(denied(format!("Command '{base_cmd}' not in allowlist")))
        }
    }
}

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn description(&self) -> &str {
        "Run a shell command (POSIX sh) in the workspace and return its output. Use this tool if you need to perform a task that requires a shell command."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to run"
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<String, ToolError> {
        let ShellArgs { command } = parse_arguments(TOOL_NAME, arguments)?;

        self.check_allowed(&command)?;

        debug!(command = %command, root = %self.root.display(), "Executing shell command");

        let mut cmd = if cfg!(target_os = "windows") {
            let mut c = Command::new("cmd");
            c.args(["/C", &command]);
            c
        } else {
            let mut c = Command::new("sh");
            c.args(["-c", &command]);
            c
        };
        cmd.current_dir(&self.root).kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(ToolError::ExecutionFailed {
                    tool_name: TOOL_NAME.into(),
                    reason: e.to_string(),
                });
            }
            Err(_) => {
                return Err(ToolError::Timeout {
                    tool_name: TOOL_NAME.into(),
                    timeout_secs: self.timeout.as_secs(),
                });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        let mut result = format!("Output of the bash command: {}", stdout.trim_end());
        if !stderr.trim().is_empty() {
            result.push_str(&format!("\n[stderr]: {}", stderr.trim_end()));
        }
        if !output.status.success() {
            let code = output.status.code().unwrap_or(-1);
            warn!(command = %command, exit_code = code, "Command failed");
            result.push_str(&format!("\n[exit code: {code}]"));
        }

        Ok(result)
    }
}
