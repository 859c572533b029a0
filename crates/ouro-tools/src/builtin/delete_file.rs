// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::edits::{resolve_in_root, EditOperation};
use crate::tool::{decode_input, Tool, ToolCall, ToolOutput};

#[derive(Deserialize)]
struct DeleteFileInput {
    path: String,
}

pub struct DeleteFileTool {
    root: PathBuf,
}

impl DeleteFileTool {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl Tool for DeleteFileTool {
    fn name(&self) -> &str {
        "delete_file"
    }

    fn description(&self) -> &str {
        "Delete a file from the working copy. Fails if the path does not exist."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path relative to the repository root"
                }
            },
            "required": ["path"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let input: DeleteFileInput = match decode_input(call) {
            Ok(i) => i,
            Err(out) => return out,
        };
        let full = match resolve_in_root(&self.root, &input.path) {
            Ok(p) => p,
            Err(msg) => return ToolOutput::err(&call.id, msg),
        };
        if !full.is_file() {
            return ToolOutput::err(&call.id, format!("file does not exist: {}", input.path));
        }
        ToolOutput::with_edit(
            &call.id,
            format!("Delete recorded for {}", input.path),
            EditOperation::Delete { path: input.path },
        )
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
