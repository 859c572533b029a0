// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0

//! Summarize-on-write long-term memory.
//!
//! Every stored entry gets a model-generated one-sentence summary at write
//! time; the summary is what appears in the assembled context, while the
//! full content stays retrievable via `recall`.  Pinned entries are notes
//! to self, always shown until explicitly unpinned.
//!
//! The crate depends only on the [`Summarizer`] capability, not on the
//! model client — the driver wires a model-backed summarizer at startup.

use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use tracing::debug;

use ouro_store::{MemoryRecord, Store};

/// Maximum entries returned by `recall`.
const RECALL_LIMIT: usize = 5;

/// System prompt used when summarising a memory at write time.
pub const SUMMARIZE_PROMPT: &str =
    "Write a single concise sentence summarizing the following. Be specific — \
     include names, numbers, outcomes. No preamble.";

/// The one capability memory needs from the model layer.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, text: &str) -> anyhow::Result<String>;
}

pub struct MemoryService {
    store: Arc<Store>,
    summarizer: Arc<dyn Summarizer>,
    /// Soft token budget for `get_context` (chars/4 heuristic).
    context_budget_tokens: usize,
}

impl MemoryService {
    pub fn new(
        store: Arc<Store>,
        summarizer: Arc<dyn Summarizer>,
        context_budget_tokens: usize,
    ) -> Self {
        Self {
            store,
            summarizer,
            context_budget_tokens,
        }
    }

    /// Store an unpinned past memory.
    pub async fn store(&self, content: &str) -> anyhow::Result<MemoryRecord> {
        self.write(content, false).await
    }

    /// Store a pinned note to self.
    pub async fn pin(&self, content: &str) -> anyhow::Result<MemoryRecord> {
        self.write(content, true).await
    }

    async fn write(&self, content: &str, pinned: bool) -> anyhow::Result<MemoryRecord> {
        let summary = self.summarizer.summarize(content).await?;
        let summary = if summary.trim().is_empty() {
            // The summary must never be empty; fall back to a content slice.
            content.chars().take(120).collect()
        } else {
            summary.trim().to_string()
        };
        debug!(pinned, "storing memory: {summary}");
        Ok(self.store.insert_memory(content, &summary, pinned)?)
    }

    /// Unpin a note.  Returns `false` for unknown or already-unpinned ids.
    pub fn unpin(&self, id: i64) -> anyhow::Result<bool> {
        Ok(self.store.unpin_memory(id)?)
    }

    /// Assemble the memory context block shown to the planner.
    ///
    /// All pinned notes come first (newest first, always included), then
    /// unpinned memories newest-first until the soft token budget would be
    /// exceeded.
    pub fn get_context(&self) -> anyhow::Result<String> {
        if self.store.memory_count()? == 0 {
            return Ok("No memories yet. This is your first run.".to_string());
        }

        let mut out = String::new();
        let pinned = self.store.pinned_memories()?;
        if !pinned.is_empty() {
            out.push_str("## Notes to self\n");
            for m in &pinned {
                out.push_str(&format!("- ({}) {}\n", m.id, m.summary));
            }
        }

        let unpinned = self.store.unpinned_memories_newest_first()?;
        if !unpinned.is_empty() {
            let mut past = String::from("## Past\n");
            let budget_chars = self.context_budget_tokens * 4;
            let mut used = out.len() + past.len();
            let mut any = false;
            for m in &unpinned {
                let line = format!(
                    "- ({}) [{}] {}\n",
                    m.id,
                    m.created_at.format("%Y-%m-%d %H:%M"),
                    m.summary
                );
                if used + line.len() > budget_chars {
                    break;
                }
                used += line.len();
                past.push_str(&line);
                any = true;
            }
            if any {
                out.push_str(&past);
            }
        }

        Ok(out.trim_end().to_string())
    }

    /// Two-pass recall: full-text index search ranked by score; when that
    /// yields nothing, a regex scan (query metacharacters escaped) over
    /// summary and content, newest first.  Capped at five results.
    pub fn recall(&self, query: &str) -> anyhow::Result<String> {
        let mut hits = self.store.search_memories(query, RECALL_LIMIT)?;
        if hits.is_empty() {
            hits = self.regex_fallback(query)?;
        }
        if hits.is_empty() {
            return Ok(format!("No memories matching \"{query}\"."));
        }
        let mut out = String::new();
        for m in &hits {
            out.push_str(&format!(
                "({}) [{}]{} {}\n{}\n\n",
                m.id,
                m.created_at.format("%Y-%m-%d %H:%M"),
                if m.pinned { " [pinned]" } else { "" },
                m.summary,
                m.content,
            ));
        }
        Ok(out.trim_end().to_string())
    }

    fn regex_fallback(&self, query: &str) -> anyhow::Result<Vec<MemoryRecord>> {
        let pattern = Regex::new(&format!("(?i){}", regex::escape(query)))?;
        let mut hits = Vec::new();
        for m in self.store.memories_newest_first()? {
            if pattern.is_match(&m.summary) || pattern.is_match(&m.content) {
                hits.push(m);
                if hits.len() >= RECALL_LIMIT {
                    break;
                }
            }
        }
        Ok(hits)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    /// Summarizer that prefixes instead of calling a model.
    struct EchoSummarizer;

    #[async_trait]
    impl Summarizer for EchoSummarizer {
        async fn summarize(&self, text: &str) -> anyhow::Result<String> {
            Ok(format!("summary: {}", text.chars().take(40).collect::<String>()))
        }
    }

    struct EmptySummarizer;

    #[async_trait]
    impl Summarizer for EmptySummarizer {
        async fn summarize(&self, _text: &str) -> anyhow::Result<String> {
            Ok("   ".into())
        }
    }

    fn service() -> MemoryService {
        MemoryService::new(
            Arc::new(Store::open(None).unwrap()),
            Arc::new(EchoSummarizer),
            2_000,
        )
    }

    #[tokio::test]
    async fn first_run_context_is_exact_string() {
        let svc = service();
        assert_eq!(
            svc.get_context().unwrap(),
            "No memories yet. This is your first run."
        );
    }

    #[tokio::test]
    async fn stored_memory_gets_a_summary() {
        let svc = service();
        let m = svc.store("we merged the retry-loop change").await.unwrap();
        assert!(m.summary.starts_with("summary:"));
        assert!(!m.pinned);
    }

    #[tokio::test]
    async fn empty_summary_falls_back_to_content_slice() {
        let svc = MemoryService::new(
            Arc::new(Store::open(None).unwrap()),
            Arc::new(EmptySummarizer),
            2_000,
        );
        let m = svc.store("content that must appear").await.unwrap();
        assert!(m.summary.contains("content that must appear"));
    }

    #[tokio::test]
    async fn pinned_notes_always_head_the_context() {
        let svc = service();
        svc.store("an old past memory").await.unwrap();
        svc.pin("always remember to run the linter").await.unwrap();
        let ctx = svc.get_context().unwrap();
        let notes_pos = ctx.find("## Notes to self").expect("notes section");
        let past_pos = ctx.find("## Past").expect("past section");
        assert!(notes_pos < past_pos);
        assert!(ctx.contains("linter"));
    }

    #[tokio::test]
    async fn unpin_removes_note_from_context() {
        let svc = service();
        let note = svc.pin("temporary note").await.unwrap();
        assert!(svc.get_context().unwrap().contains("## Notes to self"));
        assert!(svc.unpin(note.id).unwrap());
        let ctx = svc.get_context().unwrap();
        assert!(!ctx.contains("## Notes to self"));
        // The entry survives as a past memory.
        assert!(ctx.contains("temporary note"));
    }

    #[tokio::test]
    async fn context_respects_token_budget() {
        let svc = MemoryService::new(
            Arc::new(Store::open(None).unwrap()),
            Arc::new(EchoSummarizer),
            40, // 160 chars — room for the header and roughly one line
        );
        for i in 0..20 {
            svc.store(&format!("memory number {i} with some padding text"))
                .await
                .unwrap();
        }
        let ctx = svc.get_context().unwrap();
        assert!(ctx.len() <= 40 * 4 + 16, "context too large: {} chars", ctx.len());
    }

    #[tokio::test]
    async fn budget_stops_before_line_that_would_overflow() {
        let svc = MemoryService::new(
            Arc::new(Store::open(None).unwrap()),
            Arc::new(EchoSummarizer),
            60,
        );
        for i in 0..10 {
            svc.store(&format!("entry {i}")).await.unwrap();
        }
        let ctx = svc.get_context().unwrap();
        // Newest-first: the latest entry must be present, the oldest absent.
        assert!(ctx.contains("entry 9"));
        assert!(!ctx.contains("entry 0"));
    }

    #[tokio::test]
    async fn recall_uses_full_text_first() {
        let svc = service();
        svc.store("the tokenizer bug lived in lexer.rs").await.unwrap();
        svc.store("unrelated memory about CI pipelines").await.unwrap();
        let out = svc.recall("tokenizer").unwrap();
        assert!(out.contains("lexer.rs"));
        assert!(!out.contains("CI pipelines"));
    }

    #[tokio::test]
    async fn recall_falls_through_to_regex_for_fts_hostile_query() {
        let svc = service();
        svc.store("error code E0308 mismatched types").await.unwrap();
        // Parentheses break FTS MATCH syntax; the regex pass must catch it.
        let out = svc.recall("E0308 (mismatched").unwrap();
        // Query as a whole doesn't literally appear; regex-escaped literal
        // search of the full string finds nothing → miss message.
        assert!(out.starts_with("No memories matching"));
        let out = svc.recall("E0308").unwrap();
        assert!(out.contains("mismatched types"));
    }

    #[tokio::test]
    async fn recall_miss_message_is_exact() {
        let svc = service();
        svc.store("something").await.unwrap();
        assert_eq!(
            svc.recall("zzz-no-such-topic").unwrap(),
            "No memories matching \"zzz-no-such-topic\"."
        );
    }

    #[tokio::test]
    async fn recall_caps_at_five_results() {
        let svc = service();
        for i in 0..8 {
            svc.store(&format!("shared-keyword memory {i}")).await.unwrap();
        }
        let out = svc.recall("shared-keyword").unwrap();
        let count = out.matches("shared-keyword").count();
        // Each hit prints summary + content; 5 hits → 10 occurrences max.
        assert!(count <= 10, "too many hits rendered: {count}");
        let blocks = out.split("\n\n").count();
        assert!(blocks <= 5, "more than five results: {blocks}");
    }

    #[tokio::test]
    async fn recall_returns_full_content_not_just_summary() {
        let svc = service();
        svc.store("long form content with the details of the fix")
            .await
            .unwrap();
        let out = svc.recall("details").unwrap();
        assert!(out.contains("long form content with the details of the fix"));
    }
}
