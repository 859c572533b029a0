// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0

//! Codebase indexing for the planner and builder prompts.
//!
//! Two passes over the working copy: an indented file-tree view and a
//! line-anchored declaration index.  The passes are independent and run
//! concurrently on the blocking pool.

use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::debug;
use walkdir::WalkDir;

/// Directories never worth showing to the model.
const SKIP_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    "target",
    "dist",
    "build",
    "coverage",
    ".next",
];

/// Extensions scanned for declarations.
const SOURCE_EXTS: &[&str] = &["rs", "ts", "tsx", "js", "jsx", "py", "go"];

/// Per-file line cap for the declaration scan; generated monsters add noise
/// without adding signal.
const MAX_DECL_LINES_PER_FILE: usize = 200;

#[derive(Debug, Clone)]
pub struct CodebaseSnapshot {
    /// Indented tree of the working copy.
    pub file_tree: String,
    /// `path:line: declaration` index of functions, types, and exports.
    pub declarations: String,
}

impl CodebaseSnapshot {
    /// Render the snapshot as a prompt context block.
    pub fn as_context(&self) -> String {
        format!(
            "## File tree\n{}\n\n## Declarations\n{}",
            self.file_tree, self.declarations
        )
    }
}

pub struct CodebaseIndexer {
    root: PathBuf,
}

impl CodebaseIndexer {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Produce both views.  The passes are independent, so they run in
    /// parallel on the blocking pool.
    pub async fn snapshot(&self) -> anyhow::Result<CodebaseSnapshot> {
        let tree_root = self.root.clone();
        let decl_root = self.root.clone();
        let (file_tree, declarations) = tokio::join!(
            tokio::task::spawn_blocking(move || build_file_tree(&tree_root)),
            tokio::task::spawn_blocking(move || build_declaration_index(&decl_root)),
        );
        Ok(CodebaseSnapshot {
            file_tree: file_tree?,
            declarations: declarations?,
        })
    }
}

fn is_skipped(entry: &walkdir::DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|name| SKIP_DIRS.contains(&name))
        .unwrap_or(false)
}

/// Indented tree view, directories first at each level.
pub fn build_file_tree(root: &Path) -> String {
    let mut out = String::new();
    let walker = WalkDir::new(root)
        .min_depth(1)
        .sort_by(|a, b| {
            let ad = a.file_type().is_dir();
            let bd = b.file_type().is_dir();
            bd.cmp(&ad).then_with(|| a.file_name().cmp(b.file_name()))
        })
        .into_iter()
        .filter_entry(|e| !is_skipped(e));

    for entry in walker.flatten() {
        let depth = entry.depth();
        let name = entry.file_name().to_string_lossy();
        let indent = "  ".repeat(depth.saturating_sub(1));
        if entry.file_type().is_dir() {
            out.push_str(&format!("{indent}{name}/\n"));
        } else {
            out.push_str(&format!("{indent}{name}\n"));
        }
    }
    out
}

/// Line-anchored declarations across all source files under `root`.
pub fn build_declaration_index(root: &Path) -> String {
    let decl_re = declaration_regex();
    let mut out = String::new();
    let walker = WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_skipped(e));

    for entry in walker.flatten() {
        if !entry.file_type().is_file() {
            continue;
        }
        let ext = entry
            .path()
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");
        if !SOURCE_EXTS.contains(&ext) {
            continue;
        }
        let Ok(content) = std::fs::read_to_string(entry.path()) else {
            continue;
        };
        let rel = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .to_string();
        let mut emitted = 0usize;
        for (i, line) in content.lines().enumerate() {
            if emitted >= MAX_DECL_LINES_PER_FILE {
                debug!(file = %rel, "declaration scan capped");
                break;
            }
            let trimmed = line.trim_start();
            if decl_re.is_match(trimmed) {
                out.push_str(&format!("{rel}:{}: {}\n", i + 1, trimmed.trim_end()));
                emitted += 1;
            }
        }
    }
    out
}

fn declaration_regex() -> Regex {
    Regex::new(
        r"^(pub(\(.*\))?\s+)?(async\s+)?(fn|struct|enum|trait|impl|mod|const|static|type)\s+\w+|^(export\s+)?(default\s+)?(async\s+)?(function|class|interface|type|const|enum)\s+\w+|^def\s+\w+|^class\s+\w+|^func\s+\w+",
    )
    .expect("static regex")
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::create_dir_all(dir.path().join("node_modules/left-pad")).unwrap();
        std::fs::write(
            dir.path().join("src/lib.rs"),
            "pub fn visible() {}\n\nstruct Hidden;\n\npub struct Config {\n    field: u32,\n}\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("src/app.ts"),
            "export function render(): void {}\nconst helper = 1;\nexport class App {}\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("README.md"), "# readme\n").unwrap();
        std::fs::write(
            dir.path().join("node_modules/left-pad/index.js"),
            "function leftPad() {}\n",
        )
        .unwrap();
        dir
    }

    #[test]
    fn file_tree_lists_files_with_indentation() {
        let dir = fixture();
        let tree = build_file_tree(dir.path());
        assert!(tree.contains("src/"), "{tree}");
        assert!(tree.contains("  lib.rs"), "{tree}");
        assert!(tree.contains("README.md"), "{tree}");
    }

    #[test]
    fn file_tree_skips_vendored_dirs() {
        let dir = fixture();
        let tree = build_file_tree(dir.path());
        assert!(!tree.contains("node_modules"), "{tree}");
        assert!(!tree.contains("left-pad"), "{tree}");
    }

    #[test]
    fn declarations_are_line_anchored() {
        let dir = fixture();
        let decls = build_declaration_index(dir.path());
        assert!(decls.contains("src/lib.rs:1: pub fn visible() {}"), "{decls}");
        assert!(decls.contains("src/lib.rs:4: pub struct Config {"), "{decls}");
    }

    #[test]
    fn declarations_cover_typescript_exports() {
        let dir = fixture();
        let decls = build_declaration_index(dir.path());
        assert!(decls.contains("app.ts:1: export function render"), "{decls}");
        assert!(decls.contains("app.ts:3: export class App"), "{decls}");
    }

    #[test]
    fn non_source_files_are_not_scanned() {
        let dir = fixture();
        let decls = build_declaration_index(dir.path());
        assert!(!decls.contains("README.md"), "{decls}");
        assert!(!decls.contains("left-pad"), "{decls}");
    }

    #[tokio::test]
    async fn snapshot_runs_both_passes() {
        let dir = fixture();
        let snapshot = CodebaseIndexer::new(dir.path()).snapshot().await.unwrap();
        assert!(snapshot.file_tree.contains("lib.rs"));
        assert!(snapshot.declarations.contains("pub fn visible"));
        let ctx = snapshot.as_context();
        assert!(ctx.starts_with("## File tree"));
        assert!(ctx.contains("## Declarations"));
    }
}
