// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0

//! The generic bounded-turn tool-use loop.
//!
//! One session drives one phase: call the model, execute every tool-use
//! block sequentially in declaration order, feed the results back, repeat
//! until the terminal tool is called or the turn budget runs out.  Every
//! tool-use block gets exactly one result block in the next user message —
//! providers reject the follow-up otherwise.

use std::sync::Arc;

use anyhow::bail;
use serde_json::Value;
use tracing::{debug, warn};

use ouro_config::Phase;
use ouro_model::{ContentBlock, Message};
use ouro_tools::{EditOperation, RegionTracker, ToolCall, ToolRegistry};

use crate::model_client::ModelClient;

/// When a turn with no tool use ends the session instead of failing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImplicitDone {
    /// Never: a tool-free turn is a hard session failure.
    Never,
    /// Only once at least one edit has been accumulated (builder, fixer).
    WithEdits,
    /// Always: the final text is the session's product (reflector).
    Always,
}

#[derive(Debug, Clone)]
pub struct PhaseSpec {
    pub phase: Phase,
    pub terminal_tool: String,
    pub max_turns: u32,
    pub implicit_done: ImplicitDone,
    pub tool_names: Vec<String>,
}

#[derive(Debug)]
pub struct SessionOutcome {
    /// Edits accumulated from successful edit-tool executions, in order.
    pub edits: Vec<EditOperation>,
    /// Input of the terminal tool call, when one was made.
    pub terminal_input: Option<Value>,
    /// Text of the final assistant message.
    pub final_text: String,
    /// True when the session returned partial progress at the turn limit.
    pub hit_turn_limit: bool,
}

pub struct AgentSession {
    model: Arc<ModelClient>,
    tools: Arc<ToolRegistry>,
    tracker: Arc<RegionTracker>,
    spec: PhaseSpec,
    messages: Vec<Message>,
    /// Never compressed; used for reflection and persistence.
    full_history: Vec<Message>,
    edits: Vec<EditOperation>,
}

impl AgentSession {
    pub fn new(
        model: Arc<ModelClient>,
        tools: Arc<ToolRegistry>,
        tracker: Arc<RegionTracker>,
        spec: PhaseSpec,
        initial_messages: Vec<Message>,
    ) -> Self {
        Self {
            model,
            tools,
            tracker,
            spec,
            full_history: initial_messages.clone(),
            messages: initial_messages,
            edits: Vec::new(),
        }
    }

    /// Rebuild the session for a fix attempt: a fresh message list under a
    /// new spec, the edit list reset, the full history preserved.
    pub fn reset_for_fix(&mut self, spec: PhaseSpec, initial_messages: Vec<Message>) {
        self.spec = spec;
        self.messages = initial_messages.clone();
        self.full_history.extend(initial_messages);
        self.edits.clear();
        self.tracker.clear();
    }

    pub fn full_history(&self) -> &[Message] {
        &self.full_history
    }

    fn tool_schemas(&self) -> Vec<ouro_model::ToolSchema> {
        self.tools
            .schemas_for(&self.spec.tool_names)
            .into_iter()
            .map(|s| ouro_model::ToolSchema {
                name: s.name,
                description: s.description,
                input_schema: s.input_schema,
            })
            .collect()
    }

    /// Run the loop to completion.
    pub async fn run(&mut self) -> anyhow::Result<SessionOutcome> {
        let schemas = self.tool_schemas();
        let max_turns = self.spec.max_turns.max(1);
        let mut final_text = String::new();

        for turn in 1..=max_turns {
            self.tracker.set_turn(turn);

            let response = self
                .model
                .call(self.spec.phase, &mut self.messages, &schemas)
                .await?;
            let assistant = response.to_message();
            self.messages.push(assistant.clone());
            self.full_history.push(assistant.clone());
            if !assistant.text().is_empty() {
                final_text = assistant.text();
            }

            let tool_uses: Vec<(String, String, Value)> = assistant
                .tool_uses()
                .into_iter()
                .map(|(id, name, input)| (id.to_string(), name.to_string(), input.clone()))
                .collect();

            if tool_uses.is_empty() {
                match self.spec.implicit_done {
                    ImplicitDone::Always => {
                        return Ok(self.finish(None, final_text, false));
                    }
                    ImplicitDone::WithEdits if !self.edits.is_empty() => {
                        debug!(phase = %self.spec.phase, "implicit termination with edits");
                        return Ok(self.finish(None, final_text, false));
                    }
                    _ => bail!(
                        "{} did not call any tools on turn {turn}",
                        self.spec.phase
                    ),
                }
            }

            // Execute sequentially in declaration order: a later tool in the
            // same turn observes the side effects of earlier ones.
            let mut results: Vec<ContentBlock> = Vec::with_capacity(tool_uses.len());
            let mut terminal_input: Option<Value> = None;
            for (id, name, input) in &tool_uses {
                let call = ToolCall {
                    id: id.clone(),
                    name: name.clone(),
                    input: input.clone(),
                };
                let output = self.tools.execute(&call).await;
                if !output.is_error {
                    if let Some(edit) = output.edit.clone() {
                        self.edits.push(edit);
                    }
                    if *name == self.spec.terminal_tool {
                        terminal_input = Some(input.clone());
                    }
                }
                results.push(ContentBlock::ToolResult {
                    tool_use_id: id.clone(),
                    content: output.content,
                    is_error: output.is_error,
                });
            }

            if terminal_input.is_some() {
                let result_msg = Message::tool_results(results);
                self.messages.push(result_msg.clone());
                self.full_history.push(result_msg);
                return Ok(self.finish(terminal_input, final_text, false));
            }

            // Remind the model of the budget on every non-terminal turn.
            if let Some(ContentBlock::ToolResult { content, .. }) = results.last_mut() {
                content.push_str(&format!(
                    "\n(Turn {turn} of {max_turns} — hard limit. Call {} when ready.)",
                    self.spec.terminal_tool
                ));
            }
            let result_msg = Message::tool_results(results);
            self.messages.push(result_msg.clone());
            self.full_history.push(result_msg);
        }

        if !self.edits.is_empty() {
            warn!(
                phase = %self.spec.phase,
                edits = self.edits.len(),
                "turn budget exhausted; returning partial progress"
            );
            return Ok(self.finish(None, final_text, true));
        }
        bail!(
            "{} exhausted {} turns without calling {}",
            self.spec.phase,
            max_turns,
            self.spec.terminal_tool
        )
    }

    fn finish(
        &mut self,
        terminal_input: Option<Value>,
        final_text: String,
        hit_turn_limit: bool,
    ) -> SessionOutcome {
        SessionOutcome {
            edits: std::mem::take(&mut self.edits),
            terminal_input,
            final_text,
            hit_turn_limit,
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
