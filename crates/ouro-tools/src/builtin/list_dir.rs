// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::edits::resolve_in_root;
use crate::tool::{decode_input, Tool, ToolCall, ToolOutput};

#[derive(Deserialize)]
struct ListDirectoryInput {
    #[serde(default)]
    path: Option<String>,
}

pub struct ListDirectoryTool {
    root: PathBuf,
}

impl ListDirectoryTool {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl Tool for ListDirectoryTool {
    fn name(&self) -> &str {
        "list_directory"
    }

    fn description(&self) -> &str {
        "Non-recursive listing of one directory. Directories are suffixed \
         with '/'. Omit path to list the repository root."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Directory path relative to the repository root (default: root)"
                }
            },
            "additionalProperties": false
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let input: ListDirectoryInput = match decode_input(call) {
            Ok(i) => i,
            Err(out) => return out,
        };
        let rel = input.path.unwrap_or_default();
        let full = if rel.is_empty() {
            self.root.clone()
        } else {
            match resolve_in_root(&self.root, &rel) {
                Ok(p) => p,
                Err(msg) => return ToolOutput::err(&call.id, msg),
            }
        };

        let mut read_dir = match tokio::fs::read_dir(&full).await {
            Ok(rd) => rd,
            Err(e) => return ToolOutput::err(&call.id, format!("list error: {e}")),
        };
        let mut entries: Vec<String> = Vec::new();
        while let Ok(Some(entry)) = read_dir.next_entry().await {
            let name = entry.file_name().to_string_lossy().to_string();
            let is_dir = entry
                .file_type()
                .await
                .map(|t| t.is_dir())
                .unwrap_or(false);
            entries.push(if is_dir { format!("{name}/") } else { name });
        }
        entries.sort();
        if entries.is_empty() {
            ToolOutput::ok(&call.id, "(empty directory)")
        } else {
            ToolOutput::ok(&call.id, entries.join("\n"))
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
