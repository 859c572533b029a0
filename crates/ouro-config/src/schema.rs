// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// The named role of a model call.
///
/// Each phase selects a model, a max-token ceiling, a system prompt, and a
/// tool set.  `Memory` and `Summarizer` are the two phases whose message
/// lists are never compressed before submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Chooses the next change to make
    Planner,
    /// Edits the working copy through tools
    Builder,
    /// Repairs a change after a CI failure
    Fixer,
    /// Post-iteration retrospective
    Reflect,
    /// Memory summarisation at write time
    Memory,
    /// Generic one-shot summarisation
    Summarizer,
}

impl Phase {
    /// Phases whose conversations are compressed before every model call.
    pub fn is_compressed(self) -> bool {
        !matches!(self, Phase::Memory | Phase::Summarizer)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Phase::Planner => "planner",
            Phase::Builder => "builder",
            Phase::Fixer => "fixer",
            Phase::Reflect => "reflect",
            Phase::Memory => "memory",
            Phase::Summarizer => "summarizer",
        };
        write!(f, "{s}")
    }
}

/// Run environment.  Dev and test use an in-memory store; production opens
/// the database file named by `OURO_DB_PATH`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunEnv {
    #[default]
    Dev,
    Test,
    Production,
}

impl std::fmt::Display for RunEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunEnv::Dev => write!(f, "dev"),
            RunEnv::Test => write!(f, "test"),
            RunEnv::Production => write!(f, "production"),
        }
    }
}

/// Model selection for one phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseModelConfig {
    /// Model id forwarded to the provider API
    pub model: String,
    /// Maximum tokens to request in a single completion
    pub max_tokens: u32,
}

/// The phase → model map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseMap {
    pub planner: PhaseModelConfig,
    pub builder: PhaseModelConfig,
    pub fixer: PhaseModelConfig,
    pub reflect: PhaseModelConfig,
    pub memory: PhaseModelConfig,
    pub summarizer: PhaseModelConfig,
}

impl PhaseMap {
    pub fn for_phase(&self, phase: Phase) -> &PhaseModelConfig {
        match phase {
            Phase::Planner => &self.planner,
            Phase::Builder => &self.builder,
            Phase::Fixer => &self.fixer,
            Phase::Reflect => &self.reflect,
            Phase::Memory => &self.memory,
            Phase::Summarizer => &self.summarizer,
        }
    }
}

impl Default for PhaseMap {
    fn default() -> Self {
        let big = |max_tokens| PhaseModelConfig {
            model: "claude-sonnet-4-5".into(),
            max_tokens,
        };
        let small = |max_tokens| PhaseModelConfig {
            model: "claude-haiku-4-5".into(),
            max_tokens,
        };
        Self {
            planner: big(4096),
            builder: big(8192),
            fixer: big(8192),
            reflect: big(2048),
            memory: small(512),
            summarizer: small(1024),
        }
    }
}

/// Turn budgets for the phase sessions.
///
/// The builder and fixer budgets are intentionally separate fields: a fix
/// attempt starts from a fresh failure prompt and should not inherit
/// whatever budget the original build consumed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_planner_max_turns")]
    pub planner_max_turns: u32,
    #[serde(default = "default_builder_max_turns")]
    pub builder_max_turns: u32,
    #[serde(default = "default_fixer_max_turns")]
    pub fixer_max_turns: u32,
    #[serde(default = "default_reflect_max_turns")]
    pub reflect_max_turns: u32,
}

fn default_planner_max_turns() -> u32 {
    10
}
fn default_builder_max_turns() -> u32 {
    40
}
fn default_fixer_max_turns() -> u32 {
    30
}
fn default_reflect_max_turns() -> u32 {
    4
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            planner_max_turns: default_planner_max_turns(),
            builder_max_turns: default_builder_max_turns(),
            fixer_max_turns: default_fixer_max_turns(),
            reflect_max_turns: default_reflect_max_turns(),
        }
    }
}

/// How older tool results are rewritten to keep the context bounded.
///
/// `Summarize` (default) replaces an oversized old tool result with a short
/// semantic marker line.  `Redact` replaces it with an explicit
/// you-do-not-know-this notice; use it when model hallucination of stale
/// file contents is a bigger risk than the extra re-reads it causes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionMode {
    #[default]
    Summarize,
    Redact,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizationConfig {
    #[serde(default)]
    pub mode: CompressionMode,
    /// Number of most-recent turns whose tool results are never rewritten.
    /// The in-flight results must survive, so the floor is 1.
    #[serde(default = "default_protected_turns")]
    pub protected_turns: usize,
    /// Builder only: assistant text blocks older than the protected window
    /// are truncated to this many characters.
    #[serde(default = "default_assistant_text_cap")]
    pub assistant_text_cap: usize,
}

fn default_protected_turns() -> usize {
    2
}
fn default_assistant_text_cap() -> usize {
    2000
}

impl Default for SummarizationConfig {
    fn default() -> Self {
        Self {
            mode: CompressionMode::Summarize,
            protected_turns: default_protected_turns(),
            assistant_text_cap: default_assistant_text_cap(),
        }
    }
}

/// Retry policy for rate-limited provider calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_retries() -> u32 {
    5
}
fn default_initial_delay_ms() -> u64 {
    1_000
}
fn default_max_delay_ms() -> u64 {
    60_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

/// Batch API polling policy.  Poll delay backs off exponentially between
/// `poll_interval_ms` and `max_poll_interval_ms`; there is no total timeout
/// (the provider bounds batch lifetime).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    #[serde(default = "default_batch_poll_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_batch_max_poll_ms")]
    pub max_poll_interval_ms: u64,
}

fn default_batch_poll_ms() -> u64 {
    2_000
}
fn default_batch_max_poll_ms() -> u64 {
    60_000
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_batch_poll_ms(),
            max_poll_interval_ms: default_batch_max_poll_ms(),
        }
    }
}

/// CI wait policy.  Two timeouts: `no_checks_timeout_secs` applies only
/// until the first check run is observed for the commit; `timeout_secs`
/// bounds the whole wait.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CiConfig {
    #[serde(default = "default_ci_poll_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_no_checks_timeout_secs")]
    pub no_checks_timeout_secs: u64,
    #[serde(default = "default_ci_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_ci_poll_secs() -> u64 {
    30
}
fn default_no_checks_timeout_secs() -> u64 {
    300
}
fn default_ci_timeout_secs() -> u64 {
    1_800
}

impl Default for CiConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_ci_poll_secs(),
            no_checks_timeout_secs: default_no_checks_timeout_secs(),
            timeout_secs: default_ci_timeout_secs(),
        }
    }
}

/// Top-level iteration policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverConfig {
    /// CI-failure fix attempts after the initial build (attempt 0).
    #[serde(default = "default_max_fix_retries")]
    pub max_fix_retries: u32,
    /// Branch names are `<branch_prefix>/<slug>`.
    #[serde(default = "default_branch_prefix")]
    pub branch_prefix: String,
    /// Commits of recent history shown to the planner.
    #[serde(default = "default_git_log_count")]
    pub git_log_count: usize,
    /// Soft token budget for the memory context block (chars/4 heuristic).
    #[serde(default = "default_memory_budget_tokens")]
    pub memory_context_budget_tokens: usize,
}

fn default_max_fix_retries() -> u32 {
    3
}
fn default_branch_prefix() -> String {
    "ouro".into()
}
fn default_git_log_count() -> usize {
    15
}
fn default_memory_budget_tokens() -> usize {
    2_000
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            max_fix_retries: default_max_fix_retries(),
            branch_prefix: default_branch_prefix(),
            git_log_count: default_git_log_count(),
            memory_context_budget_tokens: default_memory_budget_tokens(),
        }
    }
}

/// GitHub connection parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubConfig {
    pub token: String,
    pub owner: String,
    pub repo: String,
    /// The account the agent authenticates as.  Stale-PR cleanup closes only
    /// pull requests authored by this login.
    #[serde(default = "default_agent_login")]
    pub agent_login: String,
}

fn default_agent_login() -> String {
    "ouro-agent".into()
}

/// Anthropic connection parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicConfig {
    pub api_key: String,
    /// Base URL override for proxies and tests.
    #[serde(default)]
    pub base_url: Option<String>,
}

/// Fully validated startup configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub env: RunEnv,
    pub github: GithubConfig,
    pub anthropic: AnthropicConfig,
    /// Directory the target repository is cloned into (recreated fresh each
    /// startup).
    pub workspace_path: PathBuf,
    /// SQLite database path.  Required in production; ignored in dev/test
    /// (in-memory store).
    #[serde(default)]
    pub db_path: Option<PathBuf>,
    #[serde(default)]
    pub phases: PhaseMap,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub summarization: SummarizationConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub ci: CiConfig,
    #[serde(default)]
    pub driver: DriverConfig,
}

impl Config {
    /// A config usable in unit tests: dev env, dummy credentials, temp
    /// workspace path.
    pub fn for_tests() -> Self {
        Self {
            env: RunEnv::Test,
            github: GithubConfig {
                token: "test-token".into(),
                owner: "octocat".into(),
                repo: "spoon-knife".into(),
                agent_login: default_agent_login(),
            },
            anthropic: AnthropicConfig {
                api_key: "test-key".into(),
                base_url: None,
            },
            workspace_path: std::env::temp_dir().join("ouro-test-workspace"),
            db_path: None,
            phases: PhaseMap::default(),
            session: SessionConfig::default(),
            summarization: SummarizationConfig::default(),
            retry: RetryConfig::default(),
            batch: BatchConfig::default(),
            ci: CiConfig::default(),
            driver: DriverConfig::default(),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_display_round_trip() {
        for (phase, s) in [
            (Phase::Planner, "planner"),
            (Phase::Builder, "builder"),
            (Phase::Fixer, "fixer"),
            (Phase::Reflect, "reflect"),
            (Phase::Memory, "memory"),
            (Phase::Summarizer, "summarizer"),
        ] {
            assert_eq!(phase.to_string(), s);
        }
    }

    #[test]
    fn memory_and_summarizer_phases_are_never_compressed() {
        assert!(!Phase::Memory.is_compressed());
        assert!(!Phase::Summarizer.is_compressed());
        assert!(Phase::Planner.is_compressed());
        assert!(Phase::Builder.is_compressed());
        assert!(Phase::Fixer.is_compressed());
        assert!(Phase::Reflect.is_compressed());
    }

    #[test]
    fn phase_map_routes_each_phase() {
        let map = PhaseMap::default();
        assert_eq!(map.for_phase(Phase::Builder).model, map.builder.model);
        assert_eq!(map.for_phase(Phase::Memory).model, map.memory.model);
    }

    #[test]
    fn builder_and_fixer_budgets_are_separate_fields() {
        let s = SessionConfig::default();
        assert!(s.builder_max_turns > 0);
        assert!(s.fixer_max_turns > 0);
        // A parsed config can set them independently.
        let parsed: SessionConfig =
            serde_json::from_str(r#"{"builder_max_turns": 7, "fixer_max_turns": 3}"#).unwrap();
        assert_eq!(parsed.builder_max_turns, 7);
        assert_eq!(parsed.fixer_max_turns, 3);
    }

    #[test]
    fn summarization_defaults() {
        let s = SummarizationConfig::default();
        assert_eq!(s.mode, CompressionMode::Summarize);
        assert!(s.protected_turns >= 1);
        assert_eq!(s.assistant_text_cap, 2000);
    }

    #[test]
    fn run_env_default_is_dev() {
        assert_eq!(RunEnv::default(), RunEnv::Dev);
    }

    #[test]
    fn config_serialises_and_deserialises() {
        let cfg = Config::for_tests();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(back.github.owner, "octocat");
        assert_eq!(back.env, RunEnv::Test);
    }
}
