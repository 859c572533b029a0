// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT

//! Declarative working-copy mutations.
//!
//! Tools validate and record [`EditOperation`]s during the dialog; the
//! driver applies the accumulated list in one ordered pass at commit time.
//! Application never stops at the first failure — the fixer needs to see
//! every broken operation at once.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum EditOperation {
    /// Replace exactly one occurrence of `old_string` in the file.
    Replace {
        path: String,
        old_string: String,
        new_string: String,
    },
    /// Create a new file (parents included); the path must not exist yet.
    Create { path: String, content: String },
    /// Remove an existing file.
    Delete { path: String },
}

impl EditOperation {
    pub fn path(&self) -> &str {
        match self {
            EditOperation::Replace { path, .. } => path,
            EditOperation::Create { path, .. } => path,
            EditOperation::Delete { path } => path,
        }
    }

    fn describe(&self) -> String {
        match self {
            EditOperation::Replace { path, .. } => format!("replace in {path}"),
            EditOperation::Create { path, .. } => format!("create {path}"),
            EditOperation::Delete { path } => format!("delete {path}"),
        }
    }
}

/// Apply `edits` in recorded order under `root`.
///
/// Failures accumulate; if any occurred, the returned error names every
/// failing operation.  An empty list is a successful no-op.
pub async fn apply_edits(root: &Path, edits: &[EditOperation]) -> anyhow::Result<()> {
    let mut failures: Vec<String> = Vec::new();

    for edit in edits {
        if let Err(msg) = apply_one(root, edit).await {
            failures.push(format!("{}: {msg}", edit.describe()));
        }
    }

    if failures.is_empty() {
        Ok(())
    } else {
        anyhow::bail!("{} edit(s) failed:\n{}", failures.len(), failures.join("\n"))
    }
}

async fn apply_one(root: &Path, edit: &EditOperation) -> Result<(), String> {
    match edit {
        EditOperation::Replace {
            path,
            old_string,
            new_string,
        } => {
            let full = root.join(path);
            let content = tokio::fs::read_to_string(&full)
                .await
                .map_err(|e| format!("read error: {e}"))?;
            match count_occurrences(&content, old_string) {
                0 => return Err(format!("oldString not found in file {path}")),
                1 => {}
                n => return Err(format!("oldString matches multiple locations ({n}) in {path}")),
            }
            // Single substitution, byte-exact: whitespace and newlines in
            // both strings are preserved as-is.
            let updated = content.replacen(old_string.as_str(), new_string.as_str(), 1);
            tokio::fs::write(&full, updated)
                .await
                .map_err(|e| format!("write error: {e}"))
        }
        EditOperation::Create { path, content } => {
            let full = root.join(path);
            if full.exists() {
                return Err(format!("file already exists: {path}"));
            }
            if let Some(parent) = full.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| format!("mkdir error: {e}"))?;
            }
            tokio::fs::write(&full, content)
                .await
                .map_err(|e| format!("write error: {e}"))
        }
        EditOperation::Delete { path } => {
            let full = root.join(path);
            if !full.exists() {
                return Err(format!("file does not exist: {path}"));
            }
            tokio::fs::remove_file(&full)
                .await
                .map_err(|e| format!("remove error: {e}"))
        }
    }
}

pub(crate) fn count_occurrences(haystack: &str, needle: &str) -> usize {
    if needle.is_empty() {
        return 0;
    }
    haystack.matches(needle).count()
}

/// Resolve a model-supplied relative path under `root`, rejecting escapes.
pub(crate) fn resolve_in_root(root: &Path, path: &str) -> Result<PathBuf, String> {
    use std::path::Component;
    let rel = Path::new(path);
    if rel.is_absolute() {
        return Err(format!("absolute paths are not allowed: {path}"));
    }
    let mut depth: i32 = 0;
    for comp in rel.components() {
        match comp {
            Component::ParentDir => {
                depth -= 1;
                if depth < 0 {
                    return Err(format!("path escapes the working copy: {path}"));
                }
            }
            Component::Normal(_) => depth += 1,
            _ => {}
        }
    }
    Ok(root.join(rel))
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
