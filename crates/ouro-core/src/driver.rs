// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0

//! The iteration driver: one invocation of the program is one run of this
//! state machine.
//!
//! Plan → build → commit → await CI → fix-or-merge, looping over plans
//! until one change merges.  Store writes along the way are best-effort;
//! the guaranteed-release section at the end flushes the log buffer and
//! persists the usage summary no matter how the iteration ended.

use std::sync::Arc;

use anyhow::Context;
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use ouro_config::Config;
use ouro_git::GitRepo;
use ouro_host::{await_checks, logs::extract_coverage, HostClient, PullRequest};
use ouro_index::CodebaseIndexer;
use ouro_memory::MemoryService;
use ouro_model::Provider;
use ouro_store::{GeneratedUsageRow, Store};
use ouro_tools::{apply_edits, RegionTracker};

use crate::logbuf::LogBuffer;
use crate::model_client::{CallContext, ModelClient, ModelSummarizer};
use crate::phases::{build_registry, run_planner, run_reflector, BuildPhase};

#[derive(Debug)]
pub struct IterationOutcome {
    pub iteration_id: String,
    pub merged: bool,
    pub pr_number: Option<u64>,
    /// Plans attempted before one merged.
    pub plans_attempted: u32,
}

pub struct Driver {
    config: Arc<Config>,
    store: Arc<Store>,
    provider: Arc<dyn Provider>,
    git: Arc<dyn GitRepo>,
    host: Arc<dyn HostClient>,
    logbuf: LogBuffer,
}

impl Driver {
    pub fn new(
        config: Arc<Config>,
        store: Arc<Store>,
        provider: Arc<dyn Provider>,
        git: Arc<dyn GitRepo>,
        host: Arc<dyn HostClient>,
        logbuf: LogBuffer,
    ) -> Self {
        Self {
            config,
            store,
            provider,
            git,
            host,
            logbuf,
        }
    }

    /// Run one full iteration.
    ///
    /// Whatever happens inside, the log buffer is flushed and the usage
    /// summary persisted before this returns; a crash additionally leaves a
    /// crash memory behind (tolerating store failure).
    pub async fn run(&self) -> anyhow::Result<IterationOutcome> {
        let iteration_id = Uuid::new_v4().to_string();
        info!(iteration_id = %iteration_id, "iteration starting");

        let result = self.run_iteration(&iteration_id).await;

        if let Err(e) = &result {
            let content = format!("Iteration {iteration_id} crashed: {e:#}");
            let summary: String = content.chars().take(160).collect();
            if let Err(se) = self.store.insert_memory(&content, &summary, false) {
                warn!("failed to store crash memory: {se}");
            }
        }

        // Guaranteed release: usage summary and log flush, best-effort.
        let rows = self
            .store
            .generated_for_iteration(&iteration_id)
            .unwrap_or_default();
        if let Err(e) = self
            .store
            .insert_usage_summary(&iteration_id, &build_usage_summary(&rows))
        {
            warn!("failed to persist usage summary: {e}");
        }
        let entries = self.logbuf.drain();
        if let Err(e) = self.store.insert_iteration_log(&iteration_id, &entries) {
            warn!("failed to persist iteration log: {e}");
        }

        result
    }

    async fn run_iteration(&self, iteration_id: &str) -> anyhow::Result<IterationOutcome> {
        let config = &self.config;
        let model = Arc::new(ModelClient::new(
            self.provider.clone(),
            self.store.clone(),
            config.clone(),
            iteration_id,
        ));
        let summarizer = Arc::new(ModelSummarizer::new(model.clone()));
        let memory = Arc::new(MemoryService::new(
            self.store.clone(),
            summarizer,
            config.driver.memory_context_budget_tokens,
        ));

        // Stale PRs from a previous run are closed and their branches
        // deleted; only the agent's own PRs are touched, and branch
        // deletion failures are ignored.
        match self
            .host
            .list_open_prs_by_author(&config.github.agent_login)
            .await
        {
            Ok(stale) => {
                for pr in stale {
                    info!(number = pr.number, head = %pr.head, "closing stale pull request");
                    if let Err(e) = self.host.close_pr(pr.number).await {
                        warn!(number = pr.number, "failed to close stale PR: {e}");
                    }
                    let _ = self.host.delete_branch(&pr.head).await;
                }
            }
            Err(e) => warn!("could not list stale pull requests: {e}"),
        }

        self.git
            .clone_fresh()
            .await
            .context("failed to clone the target repository")?;

        let workspace = config.workspace_path.clone();
        let tracker = Arc::new(RegionTracker::new());
        let tools = Arc::new(build_registry(
            &workspace,
            self.git.clone(),
            memory.clone(),
            tracker.clone(),
        ));

        let mut plans_attempted = 0u32;
        loop {
            plans_attempted += 1;

            // Gather planning context: memory, codebase, recent history,
            // latest green coverage on main.
            let memory_ctx = memory.get_context().unwrap_or_else(|e| {
                warn!("memory context unavailable: {e}");
                String::new()
            });
            let snapshot = CodebaseIndexer::new(&workspace).snapshot().await?;
            let git_log = self
                .git
                .recent_log(config.driver.git_log_count)
                .await
                .unwrap_or_default();
            let coverage = match self.host.latest_main_run_log().await {
                Ok(Some(log)) => extract_coverage(&log),
                _ => None,
            };
            let mut planner_context =
                format!("## Memory\n{memory_ctx}\n\n## Recent commits\n{git_log}");
            if let Some(table) = coverage {
                planner_context.push_str(&format!("\n\n## Coverage on main\n{table}"));
            }
            model.set_context(CallContext {
                codebase: Some(snapshot.as_context()),
                planner_context: Some(planner_context),
            });

            let plan = run_planner(model.clone(), tools.clone(), tracker.clone(), config).await?;
            self.remember(
                &memory,
                format!("Planned change: {} — {}", plan.title, plan.description),
            )
            .await;

            let branch = format!("{}/{}", config.driver.branch_prefix, slugify(&plan.title));
            self.git
                .create_branch(&branch)
                .await
                .context("failed to create branch")?;

            let mut build = BuildPhase::new(
                model.clone(),
                tools.clone(),
                tracker.clone(),
                config,
                plan.clone(),
            );

            let mut last_error = String::new();
            let mut edits = match build.build().await {
                Ok(outcome) => outcome.edits,
                Err(e) => {
                    last_error = format!("{e:#}");
                    Vec::new()
                }
            };

            let mut pr: Option<PullRequest> = None;
            let mut merged_pr: Option<u64> = None;

            for attempt in 0..=config.driver.max_fix_retries {
                if attempt == 0 {
                    if edits.is_empty() {
                        if last_error.is_empty() {
                            last_error = "no edit operations".to_string();
                        }
                        continue;
                    }
                } else {
                    self.remember(
                        &memory,
                        format!(
                            "Attempt {attempt} for \"{}\" failed: {}",
                            plan.title,
                            truncate_chars(&last_error, 400)
                        ),
                    )
                    .await;
                    match build.fix(&last_error).await {
                        Ok(outcome) if !outcome.edits.is_empty() => edits = outcome.edits,
                        Ok(_) => {
                            last_error = format!(
                                "fixer produced no edit operations (previous error: {})",
                                truncate_chars(&last_error, 200)
                            );
                            continue;
                        }
                        Err(e) => {
                            last_error = format!("{e:#}");
                            continue;
                        }
                    }
                }

                if let Err(e) = apply_edits(&workspace, &edits).await {
                    last_error = format!("{e:#}");
                    continue;
                }

                let message = if attempt == 0 {
                    plan.title.clone()
                } else {
                    format!("fix: {} (attempt {attempt})", plan.title)
                };
                if let Err(e) = self.git.commit_all(&message).await {
                    last_error = format!("commit failed: {e}");
                    continue;
                }
                if let Err(e) = self.git.push(&branch, attempt > 0).await {
                    last_error = format!("push failed: {e}");
                    continue;
                }
                if pr.is_none() {
                    match self
                        .host
                        .open_pr(&branch, "main", &plan.title, &plan.description)
                        .await
                    {
                        Ok(opened) => {
                            info!(number = opened.number, url = %opened.url, "pull request opened");
                            pr = Some(opened);
                        }
                        Err(e) => {
                            last_error = format!("failed to open pull request: {e}");
                            continue;
                        }
                    }
                }

                let sha = self.git.head_sha().await.context("rev-parse HEAD failed")?;
                let checks = await_checks(self.host.as_ref(), &sha, &config.ci).await?;
                if !checks.passed {
                    last_error = checks
                        .error
                        .unwrap_or_else(|| "checks failed without output".to_string());
                    info!(attempt, "CI failed; entering fix path");
                    continue;
                }

                // The PR was opened before the CI wait on this attempt.
                let Some(number) = pr.as_ref().map(|p| p.number) else {
                    last_error = "no pull request open after green checks".to_string();
                    continue;
                };
                if let Err(e) = self.host.merge_pr(number).await {
                    last_error = format!("merge failed: {e}");
                    continue;
                }
                let _ = self.host.delete_branch(&branch).await;
                merged_pr = Some(number);
                break;
            }

            if let Some(number) = merged_pr {
                info!(number, plan = %plan.title, "change merged");
                self.remember(
                    &memory,
                    format!("Merged change: {} (PR #{number})", plan.title),
                )
                .await;
                self.reflect(&model, &tools, &tracker, &memory, &build, "merged")
                    .await;
                return Ok(IterationOutcome {
                    iteration_id: iteration_id.to_string(),
                    merged: true,
                    pr_number: Some(number),
                    plans_attempted,
                });
            }

            // Retries exhausted: abandon this plan and start over with a
            // clean workspace.
            info!(plan = %plan.title, "giving up on plan");
            if let Some(p) = &pr {
                if let Err(e) = self.host.close_pr(p.number).await {
                    warn!(number = p.number, "failed to close abandoned PR: {e}");
                }
            }
            let _ = self.host.delete_branch(&branch).await;
            self.remember(
                &memory,
                format!(
                    "Gave up on plan \"{}\" after {} attempts: {}",
                    plan.title,
                    config.driver.max_fix_retries + 1,
                    truncate_chars(&last_error, 400)
                ),
            )
            .await;
            self.reflect(&model, &tools, &tracker, &memory, &build, "gave up")
                .await;
            self.git
                .reset_to_main()
                .await
                .context("workspace reset failed")?;
        }
    }

    /// Store-and-swallow: a memory write must never abort an iteration.
    async fn remember(&self, memory: &MemoryService, content: String) {
        if let Err(e) = memory.store(&content).await {
            warn!("failed to store memory: {e:#}");
        }
    }

    /// Reflection is opportunistic: failures are logged and ignored.
    async fn reflect(
        &self,
        model: &Arc<ModelClient>,
        tools: &Arc<ouro_tools::ToolRegistry>,
        tracker: &Arc<RegionTracker>,
        memory: &MemoryService,
        build: &BuildPhase,
        outcome: &str,
    ) {
        match run_reflector(
            model.clone(),
            tools.clone(),
            tracker.clone(),
            &self.config,
            build.plan(),
            outcome,
            &build.history_text(),
        )
        .await
        {
            Ok(lesson) if !lesson.trim().is_empty() => {
                self.remember(memory, format!("Reflection: {}", lesson.trim()))
                    .await;
            }
            Ok(_) => {}
            Err(e) => warn!("reflector failed: {e:#}"),
        }
    }
}

/// Branch-slug form of a plan title: lowercase, `[a-z0-9-]` only, runs of
/// other characters collapsed to single dashes, at most 60 characters.
/// Deterministic, so repeated titles produce the same slug.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut last_dash = true;
    for c in title.chars() {
        let c = c.to_ascii_lowercase();
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            slug.push(c);
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
        if slug.len() >= 60 {
            break;
        }
    }
    slug.truncate(60);
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max).collect();
        format!("{head}…")
    }
}

/// Aggregate an iteration's generated-call rows into the persisted
/// usage-summary document: per-phase breakdown plus totals.
pub fn build_usage_summary(rows: &[GeneratedUsageRow]) -> Value {
    fn bucket() -> Value {
        json!({
            "calls": 0,
            "input_tokens": 0,
            "output_tokens": 0,
            "cache_read_tokens": 0,
            "cache_write_5m_tokens": 0,
            "cache_write_1h_tokens": 0,
            "cost": 0.0,
        })
    }

    fn add(bucket: &mut Value, row: &GeneratedUsageRow) {
        let bump = |b: &mut Value, key: &str, v: u64| {
            b[key] = json!(b[key].as_u64().unwrap_or(0) + v);
        };
        bump(bucket, "calls", 1);
        bump(bucket, "input_tokens", row.input_tokens);
        bump(bucket, "output_tokens", row.output_tokens);
        bump(bucket, "cache_read_tokens", row.cache_read_tokens);
        bump(bucket, "cache_write_5m_tokens", row.cache_write_5m_tokens);
        bump(bucket, "cache_write_1h_tokens", row.cache_write_1h_tokens);
        bucket["cost"] = json!(bucket["cost"].as_f64().unwrap_or(0.0) + row.cost);
    }

    let mut total = bucket();
    let mut by_phase = serde_json::Map::new();
    for row in rows {
        add(&mut total, row);
        let entry = by_phase.entry(row.phase.clone()).or_insert_with(bucket);
        add(entry, row);
    }
    json!({ "total": total, "by_phase": Value::Object(by_phase) })
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
