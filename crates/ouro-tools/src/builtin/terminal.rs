// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT

//! Terminal tools — the calls that end a phase session.
//!
//! The session loop watches for these by name; the tools themselves only
//! validate their input so a malformed terminal call bounces back to the
//! model instead of ending the session with garbage.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::tool::{decode_input, Tool, ToolCall, ToolOutput};

#[derive(Deserialize)]
struct SubmitPlanInput {
    title: String,
    #[allow(dead_code)]
    description: String,
    #[allow(dead_code)]
    implementation: String,
}

/// Terminal for the planner.
pub struct SubmitPlanTool;

#[async_trait]
impl Tool for SubmitPlanTool {
    fn name(&self) -> &str {
        "submit_plan"
    }

    fn description(&self) -> &str {
        "Submit the chosen plan. Call exactly once, when you have settled on \
         the next change: a short title, what the change is, and how to \
         implement it."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "title": {
                    "type": "string",
                    "description": "Short imperative title, e.g. 'add retry to fetch'"
                },
                "description": {
                    "type": "string",
                    "description": "What the change does and why it is worth making"
                },
                "implementation": {
                    "type": "string",
                    "description": "Concrete implementation steps, naming files"
                }
            },
            "required": ["title", "description", "implementation"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let input: SubmitPlanInput = match decode_input(call) {
            Ok(i) => i,
            Err(out) => return out,
        };
        if input.title.trim().is_empty() {
            return ToolOutput::err(&call.id, "plan title must not be empty");
        }
        ToolOutput::ok(&call.id, format!("Plan submitted: {}", input.title))
    }
}

/// Terminal for the builder and fixer.
pub struct DoneTool;

#[async_trait]
impl Tool for DoneTool {
    fn name(&self) -> &str {
        "done"
    }

    fn description(&self) -> &str {
        "Signal that the change is complete. Call when every edit needed for \
         the plan has been recorded."
    }

    fn input_schema(&self) -> Value {
        json!({ "type": "object", "properties": {}, "additionalProperties": false })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        ToolOutput::ok(&call.id, "Done.")
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
