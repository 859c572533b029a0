// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use ouro_git::GitRepo;

use crate::tool::{Tool, ToolCall, ToolOutput};

/// Overall output cap in lines.
const MAX_DIFF_LINES: usize = 500;

pub struct GitDiffTool {
    git: Arc<dyn GitRepo>,
}

impl GitDiffTool {
    pub fn new(git: Arc<dyn GitRepo>) -> Self {
        Self { git }
    }
}

/// Collapse added/deleted file bodies into one-line summaries and cap the
/// whole diff.  Full bodies of brand-new or deleted files carry no review
/// signal the model does not already have.
pub(crate) fn condense_diff(diff: &str) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut skipping = false;
    let mut skipped = 0usize;

    for line in diff.lines() {
        if line.starts_with("diff --git ") {
            if skipping && skipped > 0 {
                out.push(format!("  [{skipped} lines of file content omitted]"));
            }
            skipping = false;
            skipped = 0;
            out.push(line.to_string());
            continue;
        }
        if line.starts_with("new file mode") || line.starts_with("deleted file mode") {
            skipping = true;
            out.push(line.to_string());
            continue;
        }
        if skipping {
            if line.starts_with("+++")
                || line.starts_with("---")
                || line.starts_with("index ")
                || line.starts_with("@@")
            {
                out.push(line.to_string());
            } else {
                skipped += 1;
            }
            continue;
        }
        out.push(line.to_string());
    }
    if skipping && skipped > 0 {
        out.push(format!("  [{skipped} lines of file content omitted]"));
    }

    if out.len() > MAX_DIFF_LINES {
        let mut capped: Vec<String> = out.into_iter().take(MAX_DIFF_LINES).collect();
        capped.push("[diff truncated at 500 lines]".to_string());
        capped.join("\n")
    } else {
        out.join("\n")
    }
}

#[async_trait]
impl Tool for GitDiffTool {
    fn name(&self) -> &str {
        "git_diff"
    }

    fn description(&self) -> &str {
        "Show the accumulated diff of the branch and working copy against \
         main. New and deleted files are summarised rather than dumped; the \
         output is capped at 500 lines."
    }

    fn input_schema(&self) -> Value {
        json!({ "type": "object", "properties": {}, "additionalProperties": false })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        match self.git.diff_against_main().await {
            Ok(diff) if diff.trim().is_empty() => {
                ToolOutput::ok(&call.id, "No changes against main.")
            }
            Ok(diff) => ToolOutput::ok(&call.id, condense_diff(&diff)),
            Err(e) => ToolOutput::err(&call.id, format!("git diff failed: {e}")),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
