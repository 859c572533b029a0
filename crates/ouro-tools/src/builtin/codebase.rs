// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use ouro_git::GitRepo;
use ouro_index::CodebaseIndexer;

use crate::tool::{Tool, ToolCall, ToolOutput};

/// Fresh file-tree + declaration snapshot of the working copy.
pub struct CodebaseContextTool {
    root: PathBuf,
}

impl CodebaseContextTool {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl Tool for CodebaseContextTool {
    fn name(&self) -> &str {
        "codebase_context"
    }

    fn description(&self) -> &str {
        "Re-index the working copy and return the current file tree and \
         declaration index. Use after structural changes to refresh your \
         picture of the codebase."
    }

    fn input_schema(&self) -> Value {
        json!({ "type": "object", "properties": {}, "additionalProperties": false })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        match CodebaseIndexer::new(&self.root).snapshot().await {
            Ok(snapshot) => ToolOutput::ok(&call.id, snapshot.as_context()),
            Err(e) => ToolOutput::err(&call.id, format!("indexing failed: {e}")),
        }
    }
}

/// Declarations of only the files touched relative to main.
pub struct CodebaseDiffTool {
    root: PathBuf,
    git: Arc<dyn GitRepo>,
}

impl CodebaseDiffTool {
    pub fn new(root: impl Into<PathBuf>, git: Arc<dyn GitRepo>) -> Self {
        Self {
            root: root.into(),
            git,
        }
    }
}

#[async_trait]
impl Tool for CodebaseDiffTool {
    fn name(&self) -> &str {
        "codebase_diff"
    }

    fn description(&self) -> &str {
        "Declaration index restricted to the files changed against main — a \
         quick structural view of what this change touches."
    }

    fn input_schema(&self) -> Value {
        json!({ "type": "object", "properties": {}, "additionalProperties": false })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let diff = match self.git.diff_against_main().await {
            Ok(d) => d,
            Err(e) => return ToolOutput::err(&call.id, format!("git diff failed: {e}")),
        };
        let changed: Vec<String> = diff
            .lines()
            .filter_map(|l| l.strip_prefix("+++ b/"))
            .filter(|p| *p != "/dev/null")
            .map(String::from)
            .collect();
        if changed.is_empty() {
            return ToolOutput::ok(&call.id, "No files changed against main.");
        }
        let index = tokio::task::spawn_blocking({
            let root = self.root.clone();
            move || ouro_index::build_declaration_index(&root)
        })
        .await;
        let index = match index {
            Ok(i) => i,
            Err(e) => return ToolOutput::err(&call.id, format!("indexing failed: {e}")),
        };
        let filtered: String = index
            .lines()
            .filter(|line| changed.iter().any(|path| line.starts_with(path.as_str())))
            .map(|l| format!("{l}\n"))
            .collect();
        if filtered.is_empty() {
            ToolOutput::ok(
                &call.id,
                format!("Changed files ({}), no declarations found.", changed.join(", ")),
            )
        } else {
            ToolOutput::ok(&call.id, filtered.trim_end().to_string())
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str) -> ToolCall {
        ToolCall {
            id: "c".into(),
            name: name.into(),
            input: json!({}),
        }
    }

    #[tokio::test]
    async fn context_tool_returns_tree_and_declarations() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("lib.rs"), "pub fn indexed() {}\n").unwrap();
        let tool = CodebaseContextTool::new(dir.path());
        let out = tool.execute(&call("codebase_context")).await;
        assert!(!out.is_error);
        assert!(out.content.contains("## File tree"));
        assert!(out.content.contains("pub fn indexed"));
    }

    #[tokio::test]
    async fn diff_tool_with_clean_tree_says_so() {
        let dir = tempfile::tempdir().unwrap();
        let git = Arc::new(ouro_git::mock::MockGit::new());
        let tool = CodebaseDiffTool::new(dir.path(), git);
        let out = tool.execute(&call("codebase_diff")).await;
        assert_eq!(out.content, "No files changed against main.");
    }
}
