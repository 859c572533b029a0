// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use ouro_memory::MemoryService;

use crate::tool::{decode_input, Tool, ToolCall, ToolOutput};

#[derive(Deserialize)]
struct NoteToSelfInput {
    content: String,
}

/// Pin a note that stays in every future context until dismissed.
pub struct NoteToSelfTool {
    memory: Arc<MemoryService>,
}

impl NoteToSelfTool {
    pub fn new(memory: Arc<MemoryService>) -> Self {
        Self { memory }
    }
}

#[async_trait]
impl Tool for NoteToSelfTool {
    fn name(&self) -> &str {
        "note_to_self"
    }

    fn description(&self) -> &str {
        "Pin a note to yourself. Pinned notes appear in every future \
         iteration's context until dismissed with dismiss_note. Use for \
         ongoing goals and hard-won constraints, not transient details."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "content": { "type": "string", "description": "The note to pin" }
            },
            "required": ["content"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let input: NoteToSelfInput = match decode_input(call) {
            Ok(i) => i,
            Err(out) => return out,
        };
        match self.memory.pin(&input.content).await {
            Ok(record) => ToolOutput::ok(
                &call.id,
                format!("Pinned note ({}): {}", record.id, record.summary),
            ),
            Err(e) => ToolOutput::err(&call.id, format!("failed to pin note: {e}")),
        }
    }
}

#[derive(Deserialize)]
struct DismissNoteInput {
    id: i64,
}

pub struct DismissNoteTool {
    memory: Arc<MemoryService>,
}

impl DismissNoteTool {
    pub fn new(memory: Arc<MemoryService>) -> Self {
        Self { memory }
    }
}

#[async_trait]
impl Tool for DismissNoteTool {
    fn name(&self) -> &str {
        "dismiss_note"
    }

    fn description(&self) -> &str {
        "Unpin a note by id (the number shown in 'Notes to self'). The entry \
         remains recallable as a past memory."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "id": { "type": "integer", "description": "Id of the pinned note" }
            },
            "required": ["id"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let input: DismissNoteInput = match decode_input(call) {
            Ok(i) => i,
            Err(out) => return out,
        };
        match self.memory.unpin(input.id) {
            Ok(true) => ToolOutput::ok(&call.id, format!("Dismissed note {}", input.id)),
            Ok(false) => ToolOutput::err(&call.id, format!("no pinned note with id {}", input.id)),
            Err(e) => ToolOutput::err(&call.id, format!("failed to dismiss note: {e}")),
        }
    }
}

#[derive(Deserialize)]
struct RecallMemoryInput {
    query: String,
}

pub struct RecallMemoryTool {
    memory: Arc<MemoryService>,
}

impl RecallMemoryTool {
    pub fn new(memory: Arc<MemoryService>) -> Self {
        Self { memory }
    }
}

#[async_trait]
impl Tool for RecallMemoryTool {
    fn name(&self) -> &str {
        "recall_memory"
    }

    fn description(&self) -> &str {
        "Search long-term memory. Full-text search first, falling back to a \
         literal scan; returns up to five entries with their full content."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "What to look for" }
            },
            "required": ["query"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let input: RecallMemoryInput = match decode_input(call) {
            Ok(i) => i,
            Err(out) => return out,
        };
        match self.memory.recall(&input.query) {
            Ok(result) => ToolOutput::ok(&call.id, result),
            Err(e) => ToolOutput::err(&call.id, format!("recall failed: {e}")),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use ouro_memory::Summarizer;
    use ouro_store::Store;

    struct EchoSummarizer;

    #[async_trait]
    impl Summarizer for EchoSummarizer {
        async fn summarize(&self, text: &str) -> anyhow::Result<String> {
            Ok(text.chars().take(60).collect())
        }
    }

    fn memory() -> Arc<MemoryService> {
        Arc::new(MemoryService::new(
            Arc::new(Store::open(None).unwrap()),
            Arc::new(EchoSummarizer),
            2_000,
        ))
    }

    fn call(name: &str, input: Value) -> ToolCall {
        ToolCall {
            id: "m".into(),
            name: name.into(),
            input,
        }
    }

    #[tokio::test]
    async fn pin_then_dismiss_round_trip() {
        let mem = memory();
        let pin = NoteToSelfTool::new(mem.clone());
        let dismiss = DismissNoteTool::new(mem.clone());

        let out = pin
            .execute(&call("note_to_self", json!({"content": "keep CI green"})))
            .await;
        assert!(!out.is_error, "{}", out.content);
        let id: i64 = out
            .content
            .split(['(', ')'])
            .nth(1)
            .and_then(|s| s.parse().ok())
            .expect("id in output");

        let out = dismiss
            .execute(&call("dismiss_note", json!({"id": id})))
            .await;
        assert!(!out.is_error, "{}", out.content);

        // Second dismissal finds nothing pinned.
        let out = dismiss
            .execute(&call("dismiss_note", json!({"id": id})))
            .await;
        assert!(out.is_error);
    }

    #[tokio::test]
    async fn recall_finds_stored_memory() {
        let mem = memory();
        mem.store("the flaky test was in scheduler.rs").await.unwrap();
        let recall = RecallMemoryTool::new(mem);
        let out = recall
            .execute(&call("recall_memory", json!({"query": "flaky"})))
            .await;
        assert!(out.content.contains("scheduler.rs"), "{}", out.content);
    }

    #[tokio::test]
    async fn recall_miss_is_not_an_error() {
        let mem = memory();
        let recall = RecallMemoryTool::new(mem);
        let out = recall
            .execute(&call("recall_memory", json!({"query": "nothing"})))
            .await;
        assert!(!out.is_error);
        assert!(out.content.starts_with("No memories matching"));
    }
}
