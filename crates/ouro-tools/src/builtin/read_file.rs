// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::edits::resolve_in_root;
use crate::regions::RegionTracker;
use crate::tool::{decode_input, Tool, ToolCall, ToolOutput};

#[derive(Deserialize)]
struct ReadFileInput {
    path: String,
    /// 1-indexed first line to return
    #[serde(default)]
    start_line: Option<u32>,
    /// 1-indexed last line to return (inclusive)
    #[serde(default)]
    end_line: Option<u32>,
}

pub struct ReadFileTool {
    root: PathBuf,
    tracker: Arc<RegionTracker>,
}

impl ReadFileTool {
    pub fn new(root: impl Into<PathBuf>, tracker: Arc<RegionTracker>) -> Self {
        Self {
            root: root.into(),
            tracker,
        }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a file from the working copy. Optionally pass start_line and \
         end_line (1-indexed, inclusive) to read a range. Prefer ranged reads \
         of large files: grep for the relevant region first, then read only \
         those lines."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path relative to the repository root"
                },
                "start_line": {
                    "type": "integer",
                    "description": "1-indexed first line to read"
                },
                "end_line": {
                    "type": "integer",
                    "description": "1-indexed last line to read (inclusive)"
                }
            },
            "required": ["path"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let input: ReadFileInput = match decode_input(call) {
            Ok(i) => i,
            Err(out) => return out,
        };
        let full = match resolve_in_root(&self.root, &input.path) {
            Ok(p) => p,
            Err(msg) => return ToolOutput::err(&call.id, msg),
        };

        debug!(path = %input.path, "read_file tool");
        let content = match tokio::fs::read_to_string(&full).await {
            Ok(c) => c,
            Err(e) => return ToolOutput::err(&call.id, format!("read error: {e}")),
        };

        let total_lines = content.lines().count() as u32;
        let start = input.start_line.unwrap_or(1).max(1);
        let end = input.end_line.unwrap_or(total_lines.max(1)).min(total_lines.max(1));
        if start > end || (total_lines > 0 && start > total_lines) {
            return ToolOutput::err(
                &call.id,
                format!("invalid range {start}..{end} for {} lines", total_lines),
            );
        }

        let slice: String = if input.start_line.is_none() && input.end_line.is_none() {
            content.clone()
        } else {
            content
                .lines()
                .skip(start as usize - 1)
                .take((end - start + 1) as usize)
                .collect::<Vec<_>>()
                .join("\n")
        };

        if total_lines > 0 {
            self.tracker
                .record(std::path::Path::new(&input.path), start, end.max(start));
        }
        ToolOutput::ok(&call.id, slice)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
