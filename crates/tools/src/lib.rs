//! Built-in host tools for vigil.
//!
//! Tools give the agent the ability to act on the machine it runs on. The
//! filesystem overview is not a tool: it feeds the `{environment}` section of
//! the system prompt.

pub mod filesystem;
pub mod shell;

use std::path::PathBuf;

use vigil_core::tool::ToolRegistry;

pub use filesystem::FilesystemOverview;
pub use shell::ShellTool;

/// Create a tool registry with the built-in host tools.
///
/// An empty `allowed_commands` lets the shell tool run anything.
pub fn default_registry(root: impl Into<PathBuf>, allowed_commands: Vec<String>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(ShellTool::new(root, allowed_commands)));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_has_shell() {
        let registry = default_registry(".", vec![]);
        assert_eq!(registry.names(), vec!["run_bash_command"]);
    }
}
