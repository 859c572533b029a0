// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::PathBuf;

use thiserror::Error;

use crate::schema::{
    AnthropicConfig, BatchConfig, CiConfig, Config, DriverConfig, GithubConfig, PhaseMap,
    RetryConfig, RunEnv, SessionConfig, SummarizationConfig,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingVar(&'static str),
    #[error("invalid value for {var}: {value:?} ({reason})")]
    InvalidVar {
        var: &'static str,
        value: String,
        reason: &'static str,
    },
}

fn required(var: &'static str) -> Result<String, ConfigError> {
    match std::env::var(var) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ConfigError::MissingVar(var)),
    }
}

fn optional(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}

/// Build a validated [`Config`] from process environment variables.
///
/// Always required: `ANTHROPIC_API_KEY`, `GITHUB_TOKEN`, `GITHUB_OWNER`,
/// `GITHUB_REPO`.  Production additionally requires `OURO_DB_PATH`; dev and
/// test run against an in-memory store.  Optional: `OURO_ENV`
/// (`dev`/`test`/`production`), `LOG_LEVEL`, `WORKSPACE_PATH`,
/// `OURO_AGENT_LOGIN`, `ANTHROPIC_BASE_URL`.
pub fn load_from_env() -> Result<Config, ConfigError> {
    let env = match optional("OURO_ENV").as_deref() {
        None | Some("dev") => RunEnv::Dev,
        Some("test") => RunEnv::Test,
        Some("production") => RunEnv::Production,
        Some(other) => {
            return Err(ConfigError::InvalidVar {
                var: "OURO_ENV",
                value: other.to_string(),
                reason: "expected dev, test, or production",
            })
        }
    };

    let github = GithubConfig {
        token: required("GITHUB_TOKEN")?,
        owner: required("GITHUB_OWNER")?,
        repo: required("GITHUB_REPO")?,
        agent_login: optional("OURO_AGENT_LOGIN").unwrap_or_else(|| "ouro-agent".into()),
    };

    let anthropic = AnthropicConfig {
        api_key: required("ANTHROPIC_API_KEY")?,
        base_url: optional("ANTHROPIC_BASE_URL"),
    };

    let db_path = match env {
        RunEnv::Production => Some(PathBuf::from(required("OURO_DB_PATH")?)),
        RunEnv::Dev | RunEnv::Test => optional("OURO_DB_PATH").map(PathBuf::from),
    };

    let workspace_path = optional("WORKSPACE_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::temp_dir().join("ouro-workspace"));

    Ok(Config {
        env,
        github,
        anthropic,
        workspace_path,
        db_path,
        phases: PhaseMap::default(),
        session: SessionConfig::default(),
        summarization: SummarizationConfig::default(),
        retry: RetryConfig::default(),
        batch: BatchConfig::default(),
        ci: CiConfig::default(),
        driver: DriverConfig::default(),
    })
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
