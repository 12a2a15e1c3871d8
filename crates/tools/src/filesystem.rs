//! A two-level directory listing of the agent's workspace.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use vigil_core::Environment;

const MAX_DEPTH: usize = 2;

/// Renders the workspace root plus two levels of subdirectories, one entry per
/// line, sorted by name, directories suffixed with `/`.
#[derive(Debug, Clone)]
pub struct FilesystemOverview {
    root: PathBuf,
}

impl FilesystemOverview {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn render(&self) -> String {
        let entries = match sorted_entries(&self.root) {
            Ok(entries) => entries,
            Err(e) => return format!("Error reading filesystem: {e}"),
        };

        let mut lines = Vec::new();
        walk(entries, 0, &mut lines);

        if lines.is_empty() {
            "Empty directory".into()
        } else {
            lines.join("\n")
        }
    }
}

impl Environment for FilesystemOverview {
    fn overview(&self) -> String {
        self.render()
    }
}

fn walk(entries: Vec<(String, PathBuf, bool)>, depth: usize, lines: &mut Vec<String>) {
    let indent = "  ".repeat(depth);

    for (name, path, is_dir) in entries {
        lines.push(format!("{indent}{name}{}", if is_dir { "/" } else { "" }));

        if is_dir && depth < MAX_DEPTH {
            match sorted_entries(&path) {
                Ok(children) => walk(children, depth + 1, lines),
                Err(_) => lines.push(format!("{indent}  [Error reading directory]")),
            }
        }
    }
}

fn sorted_entries(dir: &Path) -> io::Result<Vec<(String, PathBuf, bool)>> {
    let mut entries = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| {
            let path = entry.path();
            // Follows symlinks, so a link to a directory lists as one.
            let is_dir = path.is_dir();
            (entry.file_name().to_string_lossy().into_owned(), path, is_dir)
        })
        .collect::<Vec<_>>();
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(entries)
}
