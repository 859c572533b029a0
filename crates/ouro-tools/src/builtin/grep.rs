// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};
use walkdir::WalkDir;

use crate::edits::resolve_in_root;
use crate::tool::{decode_input, Tool, ToolCall, ToolOutput};

/// Matches beyond this count are cut with a notice; the leading matches are
/// the relevant ones.
const MAX_MATCHES: usize = 100;

const SKIP_DIRS: &[&str] = &[".git", "node_modules", "target", "dist", "build", "coverage"];

#[derive(Deserialize)]
struct GrepSearchInput {
    query: String,
    /// Restrict the search to this subtree.
    #[serde(default)]
    path: Option<String>,
}

pub struct GrepSearchTool {
    root: PathBuf,
}

impl GrepSearchTool {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl Tool for GrepSearchTool {
    fn name(&self) -> &str {
        "grep_search"
    }

    fn description(&self) -> &str {
        "Case-sensitive search across the working copy. The query is treated \
         as a regular expression when it parses as one, otherwise as a \
         literal string. Results are path:line: text, capped at 100 matches."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Regex or literal text to search for"
                },
                "path": {
                    "type": "string",
                    "description": "Optional subtree to restrict the search to"
                }
            },
            "required": ["query"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let input: GrepSearchInput = match decode_input(call) {
            Ok(i) => i,
            Err(out) => return out,
        };
        let base = match &input.path {
            Some(p) => match resolve_in_root(&self.root, p) {
                Ok(full) => full,
                Err(msg) => return ToolOutput::err(&call.id, msg),
            },
            None => self.root.clone(),
        };
        let pattern = match Regex::new(&input.query) {
            Ok(re) => re,
            Err(_) => match Regex::new(&regex::escape(&input.query)) {
                Ok(re) => re,
                Err(e) => return ToolOutput::err(&call.id, format!("bad query: {e}")),
            },
        };

        let root = self.root.clone();
        let result = tokio::task::spawn_blocking(move || {
            let mut matches: Vec<String> = Vec::new();
            let mut total = 0usize;
            let walker = WalkDir::new(&base)
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
                let Ok(content) = std::fs::read_to_string(entry.path()) else {
                    continue;
                };
                let rel = entry
                    .path()
                    .strip_prefix(&root)
                    .unwrap_or(entry.path())
                    .to_string_lossy()
                    .to_string();
                for (i, line) in content.lines().enumerate() {
                    if pattern.is_match(line) {
                        total += 1;
                        if matches.len() < MAX_MATCHES {
                            matches.push(format!("{rel}:{}: {}", i + 1, line.trim_end()));
                        }
                    }
                }
            }
            (matches, total)
        })
        .await;

        let (matches, total) = match result {
            Ok(r) => r,
            Err(e) => return ToolOutput::err(&call.id, format!("search failed: {e}")),
        };
        if matches.is_empty() {
            return ToolOutput::ok(&call.id, format!("No matches for \"{}\".", input.query));
        }
        let mut out = matches.join("\n");
        if total > MAX_MATCHES {
            out.push_str(&format!(
                "\n[... {} more matches omitted; use a more specific pattern ...]",
                total - MAX_MATCHES
            ));
        }
        ToolOutput::ok(&call.id, out)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> (tempfile::TempDir, GrepSearchTool) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(
            dir.path().join("src/lib.rs"),
            "pub fn alpha() {}\nfn beta() {}\npub fn gamma() {}\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.md"), "alpha is documented here\n").unwrap();
        let tool = GrepSearchTool::new(dir.path());
        (dir, tool)
    }

    fn call(input: Value) -> ToolCall {
        ToolCall {
            id: "g1".into(),
            name: "grep_search".into(),
            input,
        }
    }

    #[tokio::test]
    async fn literal_query_matches_with_locations() {
        let (_dir, tool) = fixture();
        let out = tool.execute(&call(json!({"query": "alpha"}))).await;
        assert!(!out.is_error, "{}", out.content);
        assert!(out.content.contains("src/lib.rs:1: pub fn alpha() {}"), "{}", out.content);
        assert!(out.content.contains("notes.md:1:"), "{}", out.content);
    }

    #[tokio::test]
    async fn regex_query_is_honoured() {
        let (_dir, tool) = fixture();
        let out = tool.execute(&call(json!({"query": "^pub fn \\w+"}))).await;
        assert!(out.content.contains("alpha"));
        assert!(out.content.contains("gamma"));
        assert!(!out.content.contains("beta"), "{}", out.content);
    }

    #[tokio::test]
    async fn search_is_case_sensitive() {
        let (_dir, tool) = fixture();
        let out = tool.execute(&call(json!({"query": "ALPHA"}))).await;
        assert!(out.content.starts_with("No matches"), "{}", out.content);
    }

    #[tokio::test]
    async fn path_restricts_the_subtree() {
        let (_dir, tool) = fixture();
        let out = tool
            .execute(&call(json!({"query": "alpha", "path": "src"})))
            .await;
        assert!(out.content.contains("src/lib.rs"));
        assert!(!out.content.contains("notes.md"), "{}", out.content);
    }

    #[tokio::test]
    async fn invalid_regex_falls_back_to_literal() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "weird (unclosed\n").unwrap();
        let tool = GrepSearchTool::new(dir.path());
        let out = tool.execute(&call(json!({"query": "(unclosed"}))).await;
        assert!(!out.is_error);
        assert!(out.content.contains("a.txt:1:"), "{}", out.content);
    }

    #[tokio::test]
    async fn match_cap_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let body: String = (0..150).map(|i| format!("needle {i}\n")).collect();
        std::fs::write(dir.path().join("big.txt"), body).unwrap();
        let tool = GrepSearchTool::new(dir.path());
        let out = tool.execute(&call(json!({"query": "needle"}))).await;
        assert!(out.content.contains("50 more matches omitted"), "{}", out.content);
    }
}
