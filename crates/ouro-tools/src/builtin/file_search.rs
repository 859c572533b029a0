// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};
use walkdir::WalkDir;

use crate::tool::{decode_input, Tool, ToolCall, ToolOutput};

const MAX_RESULTS: usize = 50;

const SKIP_DIRS: &[&str] = &[".git", "node_modules", "target", "dist", "build", "coverage"];

#[derive(Deserialize)]
struct FileSearchInput {
    query: String,
}

pub struct FileSearchTool {
    root: PathBuf,
}

impl FileSearchTool {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

/// Translate a glob (`*`, `?`) into an anchored regex over the relative
/// path; a query without glob characters matches as a substring.
fn glob_to_regex(query: &str) -> Regex {
    if query.contains('*') || query.contains('?') {
        let mut pattern = String::from("^");
        for c in query.chars() {
            match c {
                '*' => pattern.push_str(".*"),
                '?' => pattern.push('.'),
                other => pattern.push_str(&regex::escape(&other.to_string())),
            }
        }
        pattern.push('$');
        Regex::new(&pattern).unwrap_or_else(|_| Regex::new("$^").expect("static regex"))
    } else {
        Regex::new(&regex::escape(query)).expect("escaped literal always parses")
    }
}

#[async_trait]
impl Tool for FileSearchTool {
    fn name(&self) -> &str {
        "file_search"
    }

    fn description(&self) -> &str {
        "Find files by name. Plain text matches as a substring of the \
         relative path; * and ? act as glob wildcards over the whole path."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Substring or glob pattern, e.g. 'config' or 'src/*.test.ts'"
                }
            },
            "required": ["query"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let input: FileSearchInput = match decode_input(call) {
            Ok(i) => i,
            Err(out) => return out,
        };
        let pattern = glob_to_regex(&input.query);
        let root = self.root.clone();

        let hits = tokio::task::spawn_blocking(move || {
            let mut hits: Vec<String> = Vec::new();
            let walker = WalkDir::new(&root)
                .sort_by_file_name()
                .into_iter()
                .filter_entry(|e| {
                    e.file_name()
                        .to_str()
                        .map(|n| !SKIP_DIRS.contains(&n))
                        .unwrap_or(true)
                });
            for entry in walker.flatten() {
                if !entry.file_type().is_file() {
                    continue;
                }
                let rel = entry
                    .path()
                    .strip_prefix(&root)
                    .unwrap_or(entry.path())
                    .to_string_lossy()
                    .to_string();
                if pattern.is_match(&rel) {
                    hits.push(rel);
                    if hits.len() >= MAX_RESULTS {
                        break;
                    }
                }
            }
            hits
        })
        .await;

        match hits {
            Ok(hits) if hits.is_empty() => {
                ToolOutput::ok(&call.id, format!("No files matching \"{}\".", input.query))
            }
            Ok(hits) => ToolOutput::ok(&call.id, hits.join("\n")),
            Err(e) => ToolOutput::err(&call.id, format!("search failed: {e}")),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
