// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::edits::{resolve_in_root, EditOperation};
use crate::tool::{decode_input, Tool, ToolCall, ToolOutput};

#[derive(Deserialize)]
struct EditFileInput {
    path: String,
    old_string: String,
    new_string: String,
}

/// Records a `Replace` edit after validating that `old_string` occurs
/// exactly once in the file as it currently stands.  The working copy is
/// not modified here — accumulated edits are applied in one pass at commit
/// time.
pub struct EditFileTool {
    root: PathBuf,
}

impl EditFileTool {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl Tool for EditFileTool {
    fn name(&self) -> &str {
        "edit_file"
    }

    fn description(&self) -> &str {
        "Replace one occurrence of old_string with new_string in a file. \
         old_string must match the file content exactly (including \
         whitespace) and must be unique within the file — include enough \
         surrounding context to pin down the location. Express every edit \
         against the file as it exists now; edits are applied together when \
         the change is committed."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path relative to the repository root"
                },
                "old_string": {
                    "type": "string",
                    "description": "Exact text to replace; must occur exactly once"
                },
                "new_string": {
                    "type": "string",
                    "description": "Replacement text"
                }
            },
            "required": ["path", "old_string", "new_string"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let input: EditFileInput = match decode_input(call) {
            Ok(i) => i,
            Err(out) => return out,
        };
        let full = match resolve_in_root(&self.root, &input.path) {
            Ok(p) => p,
            Err(msg) => return ToolOutput::err(&call.id, msg),
        };
        if input.old_string.is_empty() {
            return ToolOutput::err(&call.id, "old_string must not be empty");
        }

        debug!(path = %input.path, "edit_file tool");
        let content = match tokio::fs::read_to_string(&full).await {
            Ok(c) => c,
            Err(e) => return ToolOutput::err(&call.id, format!("read error: {e}")),
        };
        match crate::edits::count_occurrences(&content, &input.old_string) {
            0 => {
                return ToolOutput::err(
                    &call.id,
                    format!(
                        "oldString not found in file {}. Re-read the file and \
                         copy the exact text to replace.",
                        input.path
                    ),
                )
            }
            1 => {}
            n => {
                return ToolOutput::err(
                    &call.id,
                    format!(
                        "oldString matches multiple locations ({n}) in {}. \
                         Include more surrounding context to make it unique.",
                        input.path
                    ),
                )
            }
        }

        ToolOutput::with_edit(
            &call.id,
            format!("Edit recorded for {}", input.path),
            EditOperation::Replace {
                path: input.path,
                old_string: input.old_string,
                new_string: input.new_string,
            },
        )
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
