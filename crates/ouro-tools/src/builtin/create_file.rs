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
struct CreateFileInput {
    path: String,
    content: String,
}

pub struct CreateFileTool {
    root: PathBuf,
}

impl CreateFileTool {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl Tool for CreateFileTool {
    fn name(&self) -> &str {
        "create_file"
    }

    fn description(&self) -> &str {
        "Create a new file with the given content. Parent directories are \
         created as needed. Fails if the path already exists — use edit_file \
         to change existing files."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path relative to the repository root"
                },
                "content": {
                    "type": "string",
                    "description": "Full file content"
                }
            },
            "required": ["path", "content"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let input: CreateFileInput = match decode_input(call) {
            Ok(i) => i,
            Err(out) => return out,
        };
        let full = match resolve_in_root(&self.root, &input.path) {
            Ok(p) => p,
            Err(msg) => return ToolOutput::err(&call.id, msg),
        };
        if full.exists() {
            return ToolOutput::err(
                &call.id,
                format!("file already exists: {} (use edit_file instead)", input.path),
            );
        }
        ToolOutput::with_edit(
            &call.id,
            format!("Create recorded for {}", input.path),
            EditOperation::Create {
                path: input.path,
                content: input.content,
            },
        )
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn call(input: Value) -> ToolCall {
        ToolCall {
            id: "c1".into(),
            name: "create_file".into(),
            input,
        }
    }

    #[tokio::test]
    async fn new_path_records_create_edit() {
        let dir = tempfile::tempdir().unwrap();
        let tool = CreateFileTool::new(dir.path());
        let out = tool
            .execute(&call(json!({"path": "src/new.rs", "content": "pub fn f() {}\n"})))
            .await;
        assert!(!out.is_error, "{}", out.content);
        assert!(matches!(out.edit, Some(EditOperation::Create { .. })));
        assert!(!dir.path().join("src/new.rs").exists(), "not applied yet");
    }

    #[tokio::test]
    async fn existing_path_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("taken.rs"), "x").unwrap();
        let tool = CreateFileTool::new(dir.path());
        let out = tool
            .execute(&call(json!({"path": "taken.rs", "content": "y"})))
            .await;
        assert!(out.is_error);
        assert!(out.content.contains("already exists"), "{}", out.content);
        assert!(out.edit.is_none());
    }
}
