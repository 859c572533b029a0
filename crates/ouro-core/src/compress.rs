// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0

//! Bounded-context discipline for long tool-use dialogs.
//!
//! Older tool results carry the bulk of a session's weight: full file
//! reads, directory listings, big diffs.  Before every compressed-phase
//! model call, results outside the protected window are rewritten to short
//! marker lines.  Only the `content` field of a result is ever touched, so
//! every `tool_use` id keeps its matching `tool_result`.

use std::collections::HashMap;

use serde_json::Value;

use ouro_config::{CompressionMode, SummarizationConfig};
use ouro_model::{ContentBlock, Message, Role};

/// Tool results at or below their threshold stay verbatim.
fn threshold_for(tool_name: &str) -> usize {
    match tool_name {
        "read_file" => 300,
        "grep_search" | "file_search" => 300,
        "list_directory" | "git_diff" | "codebase_context" | "codebase_diff" => 300,
        _ => 100,
    }
}

/// Memory tools are tiny and their results stay useful for the whole
/// session; they are never rewritten.
fn is_kept_verbatim(tool_name: &str) -> bool {
    matches!(tool_name, "note_to_self" | "dismiss_note" | "recall_memory")
}

#[derive(Debug, Clone)]
pub struct CompressionPolicy {
    pub mode: CompressionMode,
    /// Most-recent tool-result turns that are never modified (floor 1).
    pub protected_turns: usize,
    /// Builder only: cap for assistant text blocks outside the protected
    /// window; 0 disables the rule.
    pub assistant_text_cap: usize,
}

impl From<&SummarizationConfig> for CompressionPolicy {
    fn from(cfg: &SummarizationConfig) -> Self {
        Self {
            mode: cfg.mode,
            protected_turns: cfg.protected_turns.max(1),
            assistant_text_cap: cfg.assistant_text_cap,
        }
    }
}

/// Rewrite one oversized tool result into its marker form.
///
/// Applying this to its own output is a no-op in practice: every marker is
/// shorter than the threshold that triggers rewriting, and the unknown-tool
/// truncation is prefix-stable.
pub fn compress_tool_result(tool_name: &str, input: &Value, content: &str) -> String {
    let path = input.get("path").and_then(Value::as_str).unwrap_or("?");
    match tool_name {
        "read_file" => {
            format!("[Previously read {path} ({} lines)]", content.lines().count())
        }
        "grep_search" | "file_search" => {
            let query: String = input
                .get("query")
                .and_then(Value::as_str)
                .unwrap_or("?")
                .chars()
                .take(60)
                .collect();
            format!("[{} matches for \"{query}\"]", content.lines().count())
        }
        "list_directory" | "git_diff" | "codebase_context" | "codebase_diff" => {
            format!("[{tool_name}: {} lines]", content.lines().count())
        }
        _ => {
            let head: String = content.chars().take(100).collect();
            format!("{head} [...compressed]")
        }
    }
}

/// The hard-redact variant: tells the model in so many words that it no
/// longer knows this content.
fn redact_tool_result(tool_name: &str, input: &Value) -> String {
    match tool_name {
        "read_file" => {
            let path = input.get("path").and_then(Value::as_str).unwrap_or("?");
            format!(
                "[Content of {path} was removed from context — you do NOT know \
                 what this file contains. Re-read it if needed.]"
            )
        }
        _ => format!(
            "[Output of {tool_name} was removed from context — you do NOT know \
             its result. Re-run it if needed.]"
        ),
    }
}

/// Compress `messages` in place.
///
/// `truncate_assistant_text` enables the builder-only rule capping old
/// assistant text blocks.  The last `protected_turns` tool-result turns and
/// everything after them are never modified.
pub fn compress_messages(
    messages: &mut [Message],
    policy: &CompressionPolicy,
    truncate_assistant_text: bool,
) {
    // tool_use id → (tool name, input), for resolving each result's origin.
    let mut origin: HashMap<String, (String, Value)> = HashMap::new();
    for msg in messages.iter() {
        for (id, name, input) in msg.tool_uses() {
            origin.insert(id.to_string(), (name.to_string(), input.clone()));
        }
    }

    // A "turn" for protection purposes is a user message carrying tool
    // results.  Everything from the K-th-from-last such message onward is
    // protected.
    let protected = policy.protected_turns.max(1);
    let result_turns: Vec<usize> = messages
        .iter()
        .enumerate()
        .filter(|(_, m)| {
            m.role == Role::User
                && m.content
                    .iter()
                    .any(|b| matches!(b, ContentBlock::ToolResult { .. }))
        })
        .map(|(i, _)| i)
        .collect();
    let protected_from = if result_turns.len() <= protected {
        0
    } else {
        result_turns[result_turns.len() - protected]
    };
    if protected_from == 0 && !truncate_assistant_text {
        return;
    }

    for msg in messages.iter_mut().take(protected_from) {
        match msg.role {
            Role::User => {
                for block in msg.content.iter_mut() {
                    if let ContentBlock::ToolResult {
                        tool_use_id,
                        content,
                        ..
                    } = block
                    {
                        let Some((name, input)) = origin.get(tool_use_id) else {
                            continue;
                        };
                        if is_kept_verbatim(name) {
                            continue;
                        }
                        if content.len() <= threshold_for(name) {
                            continue;
                        }
                        *content = match policy.mode {
                            CompressionMode::Summarize => {
                                compress_tool_result(name, input, content)
                            }
                            CompressionMode::Redact => redact_tool_result(name, input),
                        };
                    }
                }
            }
            Role::Assistant if truncate_assistant_text && policy.assistant_text_cap > 0 => {
                for block in msg.content.iter_mut() {
                    if let ContentBlock::Text { text } = block {
                        if text.len() > policy.assistant_text_cap {
                            let mut cut = policy.assistant_text_cap;
                            while !text.is_char_boundary(cut) {
                                cut -= 1;
                            }
                            text.truncate(cut);
                            text.push_str("...");
                        }
                    }
                }
            }
            _ => {}
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
