// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT

//! End-to-end iteration test: scripted model, mock git and host, real
//! store, real tool execution against a temp workspace.

use std::sync::Arc;

use serde_json::json;

use ouro_config::{CiConfig, Config};
use ouro_core::{Driver, LogBuffer};
use ouro_git::mock::MockGit;
use ouro_host::mock::MockHost;
use ouro_host::{CheckRun, CheckStatus};
use ouro_model::{ContentBlock, ModelResponse, ScriptedProvider};
use ouro_store::Store;

fn tool_use(id: &str, name: &str, input: serde_json::Value) -> ContentBlock {
    ContentBlock::ToolUse {
        id: id.into(),
        name: name.into(),
        input,
    }
}

fn response(blocks: Vec<ContentBlock>) -> ModelResponse {
    ModelResponse {
        content: blocks,
        stop_reason: Some("tool_use".into()),
        usage: Default::default(),
        model: String::new(),
    }
}

#[tokio::test]
async fn full_iteration_plans_builds_and_merges() {
    let workspace = tempfile::tempdir().unwrap();
    // Seed a file so the builder can read before editing.
    std::fs::write(
        workspace.path().join("config.ts"),
        "export const retries = 1;\n",
    )
    .unwrap();

    let script = vec![
        // Planner explores, then submits.
        response(vec![tool_use("p0", "read_file", json!({"path": "config.ts"}))]),
        response(vec![tool_use(
            "p1",
            "submit_plan",
            json!({
                "title": "raise retry count",
                "description": "Bump the default retry count",
                "implementation": "Change retries to 3 in config.ts"
            }),
        )]),
        // Memory: planned.
        ModelResponse::text("planned: raise retry count"),
        // Builder reads, edits, finishes.
        response(vec![tool_use("b0", "read_file", json!({"path": "config.ts"}))]),
        response(vec![
            tool_use(
                "b1",
                "edit_file",
                json!({
                    "path": "config.ts",
                    "old_string": "retries = 1",
                    "new_string": "retries = 3"
                }),
            ),
            tool_use("b2", "done", json!({})),
        ]),
        // Memory: merged.
        ModelResponse::text("merged: raise retry count"),
        // Reflector and its memory.
        ModelResponse::text("single-line config changes are easy wins"),
        ModelResponse::text("reflection stored"),
    ];

    let mut config = Config::for_tests();
    config.workspace_path = workspace.path().to_path_buf();
    config.ci = CiConfig {
        poll_interval_secs: 1,
        no_checks_timeout_secs: 5,
        timeout_secs: 30,
    };
    let store = Arc::new(Store::open(None).unwrap());
    let host = Arc::new(MockHost::new());
    host.push_check_poll(vec![CheckRun {
        id: 1,
        name: "ci".into(),
        status: CheckStatus::Completed,
        conclusion: Some("success".into()),
    }]);
    let git = Arc::new(MockGit::new());

    let driver = Driver::new(
        Arc::new(config),
        store.clone(),
        Arc::new(ScriptedProvider::new(script)),
        git.clone(),
        host.clone(),
        LogBuffer::new(),
    );

    let outcome = driver.run().await.unwrap();
    assert!(outcome.merged);
    assert_eq!(outcome.pr_number, Some(1));

    // The edit was applied to the working copy before the commit.
    let content = std::fs::read_to_string(workspace.path().join("config.ts")).unwrap();
    assert_eq!(content, "export const retries = 3;\n");

    // Branch name derives from the plan title.
    assert!(git
        .calls()
        .contains(&"create_branch ouro/raise-retry-count".to_string()));

    // Durable artifacts: memories, generated-call rows, usage summary, log.
    let memories = store.memories_newest_first().unwrap();
    assert!(memories
        .iter()
        .any(|m| m.content.starts_with("Planned change: raise retry count")));
    assert!(memories
        .iter()
        .any(|m| m.content.starts_with("Merged change: raise retry count")));
    let rows = store.generated_for_iteration(&outcome.iteration_id).unwrap();
    assert!(rows.len() >= 8, "every model call is recorded, got {}", rows.len());
    assert_eq!(store.iteration_log_count().unwrap(), 1);
}
