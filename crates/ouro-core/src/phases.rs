// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0

//! Phase-specific instantiations of the agent session: planner, builder,
//! fixer, and reflector.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use ouro_config::{Config, Phase};
use ouro_git::GitRepo;
use ouro_memory::MemoryService;
use ouro_model::{ContentBlock, Message, Role};
use ouro_tools::{builtin, RegionTracker, ToolRegistry};

use crate::model_client::ModelClient;
use crate::prompts;
use crate::session::{AgentSession, ImplicitDone, PhaseSpec, SessionOutcome};

/// The planner's product, consumed by the builder.
#[derive(Debug, Clone, Deserialize)]
pub struct Plan {
    pub title: String,
    pub description: String,
    pub implementation: String,
}

/// Decode the `submit_plan` arguments into a [`Plan`].
pub fn parse_plan(value: &Value) -> anyhow::Result<Plan> {
    serde_json::from_value(value.clone()).context("submit_plan arguments did not form a plan")
}

// ─── Tool sets ────────────────────────────────────────────────────────────────

fn strings(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn planner_tools() -> Vec<String> {
    strings(&[
        "read_file",
        "grep_search",
        "file_search",
        "list_directory",
        "codebase_context",
        "recall_memory",
        "note_to_self",
        "dismiss_note",
        "submit_plan",
    ])
}

fn builder_tools() -> Vec<String> {
    strings(&[
        "read_file",
        "grep_search",
        "file_search",
        "list_directory",
        "edit_file",
        "create_file",
        "delete_file",
        "git_diff",
        "codebase_context",
        "codebase_diff",
        "recall_memory",
        "note_to_self",
        "dismiss_note",
        "done",
    ])
}

fn reflect_tools() -> Vec<String> {
    strings(&["recall_memory", "note_to_self", "dismiss_note", "done"])
}

/// Register every builtin tool against one workspace.
pub fn build_registry(
    workspace: &Path,
    git: Arc<dyn GitRepo>,
    memory: Arc<MemoryService>,
    tracker: Arc<RegionTracker>,
) -> ToolRegistry {
    let mut reg = ToolRegistry::new();
    reg.register(builtin::ReadFileTool::new(workspace, tracker));
    reg.register(builtin::GrepSearchTool::new(workspace));
    reg.register(builtin::FileSearchTool::new(workspace));
    reg.register(builtin::ListDirectoryTool::new(workspace));
    reg.register(builtin::EditFileTool::new(workspace));
    reg.register(builtin::CreateFileTool::new(workspace));
    reg.register(builtin::DeleteFileTool::new(workspace));
    reg.register(builtin::GitDiffTool::new(git.clone()));
    reg.register(builtin::CodebaseContextTool::new(workspace));
    reg.register(builtin::CodebaseDiffTool::new(workspace, git));
    reg.register(builtin::NoteToSelfTool::new(memory.clone()));
    reg.register(builtin::DismissNoteTool::new(memory.clone()));
    reg.register(builtin::RecallMemoryTool::new(memory));
    reg.register(builtin::SubmitPlanTool);
    reg.register(builtin::DoneTool);
    reg
}

// ─── Planner ──────────────────────────────────────────────────────────────────

pub async fn run_planner(
    model: Arc<ModelClient>,
    tools: Arc<ToolRegistry>,
    tracker: Arc<RegionTracker>,
    config: &Config,
) -> anyhow::Result<Plan> {
    let spec = PhaseSpec {
        phase: Phase::Planner,
        terminal_tool: "submit_plan".into(),
        max_turns: config.session.planner_max_turns,
        implicit_done: ImplicitDone::Never,
        tool_names: planner_tools(),
    };
    let mut session = AgentSession::new(
        model,
        tools,
        tracker,
        spec,
        vec![Message::user(prompts::planner_request())],
    );
    let outcome = session.run().await?;
    let input = outcome
        .terminal_input
        .context("planner ended without submitting a plan")?;
    let plan = parse_plan(&input)?;
    info!(title = %plan.title, "plan selected");
    Ok(plan)
}

// ─── Builder / fixer ──────────────────────────────────────────────────────────

/// Owns the builder session across the build and all fix attempts, so the
/// full history accumulates over the whole change.
pub struct BuildPhase {
    session: AgentSession,
    plan: Plan,
    fixer_max_turns: u32,
}

impl BuildPhase {
    pub fn new(
        model: Arc<ModelClient>,
        tools: Arc<ToolRegistry>,
        tracker: Arc<RegionTracker>,
        config: &Config,
        plan: Plan,
    ) -> Self {
        let spec = PhaseSpec {
            phase: Phase::Builder,
            terminal_tool: "done".into(),
            max_turns: config.session.builder_max_turns,
            implicit_done: ImplicitDone::WithEdits,
            tool_names: builder_tools(),
        };
        let session = AgentSession::new(
            model,
            tools,
            tracker,
            spec,
            vec![Message::user(prompts::builder_request(&plan))],
        );
        Self {
            session,
            plan,
            fixer_max_turns: config.session.fixer_max_turns,
        }
    }

    /// Initial build attempt.
    pub async fn build(&mut self) -> anyhow::Result<SessionOutcome> {
        self.session.run().await
    }

    /// Fix attempt: a fresh failure prompt restating the plan with the CI
    /// error verbatim; the accumulated edit list is reset, the full history
    /// is preserved.
    pub async fn fix(&mut self, error: &str) -> anyhow::Result<SessionOutcome> {
        let spec = PhaseSpec {
            phase: Phase::Fixer,
            terminal_tool: "done".into(),
            max_turns: self.fixer_max_turns,
            implicit_done: ImplicitDone::WithEdits,
            tool_names: builder_tools(),
        };
        self.session
            .reset_for_fix(spec, vec![Message::user(prompts::fixer_request(&self.plan, error))]);
        self.session.run().await
    }

    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    /// Plain-text rendering of the full (uncompressed) session history.
    pub fn history_text(&self) -> String {
        serialize_history(self.session.full_history())
    }
}

fn serialize_history(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| {
            let role = match m.role {
                Role::User => "User",
                Role::Assistant => "Assistant",
            };
            let text = m
                .content
                .iter()
                .map(|b| match b {
                    ContentBlock::Text { text } => text.clone(),
                    ContentBlock::Thinking { .. } => "[thinking]".to_string(),
                    ContentBlock::ToolUse { name, input, .. } => {
                        format!("[tool_call: {name}({input})]")
                    }
                    ContentBlock::ToolResult {
                        content, is_error, ..
                    } => {
                        if *is_error {
                            format!("[tool_error: {content}]")
                        } else {
                            format!("[tool_result: {content}]")
                        }
                    }
                })
                .collect::<Vec<_>>()
                .join("\n");
            format!("{role}: {text}")
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

// ─── Reflector ────────────────────────────────────────────────────────────────

/// Run the reflector and return the lesson text.  The caller stores it as
/// a memory; failures here are logged and ignored upstream — reflection is
/// opportunistic.
pub async fn run_reflector(
    model: Arc<ModelClient>,
    tools: Arc<ToolRegistry>,
    tracker: Arc<RegionTracker>,
    config: &Config,
    plan: &Plan,
    outcome: &str,
    history: &str,
) -> anyhow::Result<String> {
    let spec = PhaseSpec {
        phase: Phase::Reflect,
        terminal_tool: "done".into(),
        max_turns: config.session.reflect_max_turns,
        implicit_done: ImplicitDone::Always,
        tool_names: reflect_tools(),
    };
    let mut session = AgentSession::new(
        model,
        tools,
        tracker,
        spec,
        vec![Message::user(prompts::reflect_request(outcome, plan, history))],
    );
    let result = session.run().await?;
    Ok(result.final_text)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_plan_accepts_complete_arguments() {
        let plan = parse_plan(&json!({
            "title": "add-tests",
            "description": "Add test coverage",
            "implementation": "Add tests to config.ts"
        }))
        .unwrap();
        assert_eq!(plan.title, "add-tests");
    }

    #[test]
    fn parse_plan_rejects_missing_fields() {
        assert!(parse_plan(&json!({ "title": "x" })).is_err());
    }

    #[test]
    fn planner_tools_include_terminal_but_no_editors() {
        let tools = planner_tools();
        assert!(tools.contains(&"submit_plan".to_string()));
        assert!(!tools.contains(&"edit_file".to_string()));
        assert!(!tools.contains(&"create_file".to_string()));
    }

    #[test]
    fn builder_tools_include_editors_and_done() {
        let tools = builder_tools();
        for needed in ["edit_file", "create_file", "delete_file", "git_diff", "done"] {
            assert!(tools.contains(&needed.to_string()), "missing {needed}");
        }
        assert!(!tools.contains(&"submit_plan".to_string()));
    }

    #[test]
    fn serialize_history_renders_tools_and_roles() {
        let messages = vec![
            Message::user("implement the plan"),
            Message {
                role: Role::Assistant,
                content: vec![ContentBlock::ToolUse {
                    id: "t1".into(),
                    name: "read_file".into(),
                    input: json!({"path": "a.rs"}),
                }],
            },
            Message::tool_results(vec![ContentBlock::ToolResult {
                tool_use_id: "t1".into(),
                content: "contents".into(),
                is_error: false,
            }]),
        ];
        let text = serialize_history(&messages);
        assert!(text.starts_with("User: implement the plan"));
        assert!(text.contains("[tool_call: read_file"));
        assert!(text.contains("[tool_result: contents]"));
    }
}
