// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::edits::EditOperation;

/// A single tool invocation requested by the model.
#[derive(Debug, Clone)]
pub struct ToolCall {
    /// Opaque identifier from the model, echoed back in the result block
    pub id: String,
    pub name: String,
    /// Raw JSON arguments; each tool decodes them into its typed input
    pub input: Value,
}

/// The result of executing a tool.
///
/// `edit` is populated only when the execution succeeded and the tool's
/// effect is a working-copy mutation; the session collects these and the
/// driver applies them in one pass at commit time.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub call_id: String,
    pub content: String,
    /// True when the tool failed non-fatally; the message goes back to the
    /// model as an error result and the dialog continues.
    pub is_error: bool,
    pub edit: Option<EditOperation>,
}

impl ToolOutput {
    pub fn ok(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            content: content.into(),
            is_error: false,
            edit: None,
        }
    }

    pub fn err(call_id: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            content: msg.into(),
            is_error: true,
            edit: None,
        }
    }

    pub fn with_edit(call_id: impl Into<String>, content: impl Into<String>, edit: EditOperation) -> Self {
        Self {
            call_id: call_id.into(),
            content: content.into(),
            is_error: false,
            edit: Some(edit),
        }
    }
}

/// Decode a call's raw JSON input into a typed value.
///
/// Model tool calls arrive as free-form maps; this is the single point
/// where they become typed.  A decode failure is surfaced to the model as
/// an error result, never as a raw map leaking further in.
pub fn decode_input<T: DeserializeOwned>(call: &ToolCall) -> Result<T, ToolOutput> {
    serde_json::from_value(call.input.clone()).map_err(|e| {
        ToolOutput::err(
            &call.id,
            format!("invalid input for {}: {e}. Received: {}", call.name, call.input),
        )
    })
}

/// Trait implemented by every tool.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON Schema of the input object
    fn input_schema(&self) -> Value;
    /// Execute the tool.  Failures are wrapped in [`ToolOutput::err`] —
    /// executors never propagate errors across the loop boundary.
    async fn execute(&self, call: &ToolCall) -> ToolOutput;
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
