// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use ouro_core::{Driver, LogBuffer};
use ouro_git::CliGit;
use ouro_host::GitHubClient;
use ouro_model::AnthropicClient;
use ouro_store::Store;

/// An autonomous self-improving coding agent.  Runs one iteration: plan a
/// change, build it, open a pull request, wait for CI, fix or merge.  All
/// configuration comes from environment variables.
#[derive(Parser)]
#[command(name = "ouro", version, about)]
struct Cli {}

#[tokio::main]
async fn main() -> ExitCode {
    let Cli {} = Cli::parse();

    let config = match ouro_config::load_from_env() {
        Ok(cfg) => Arc::new(cfg),
        Err(e) => {
            eprintln!("configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let logbuf = LogBuffer::new();
    init_logging(&logbuf);

    let db_path = match config.env {
        ouro_config::RunEnv::Production => config.db_path.clone(),
        // Dev and test run against an in-memory database.
        _ => None,
    };
    let store = match Store::open(db_path.as_deref()) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            eprintln!("store error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let provider = Arc::new(AnthropicClient::new(
        config.anthropic.api_key.clone(),
        config.anthropic.base_url.clone(),
        config.retry.clone(),
        config.batch.clone(),
    ));
    let git = Arc::new(CliGit::new(
        config.workspace_path.clone(),
        CliGit::github_remote_url(
            &config.github.token,
            &config.github.owner,
            &config.github.repo,
        ),
        config.github.agent_login.clone(),
        format!("{}@users.noreply.github.com", config.github.agent_login),
    ));
    let host = Arc::new(GitHubClient::new(
        config.github.token.clone(),
        config.github.owner.clone(),
        config.github.repo.clone(),
    ));

    let driver = Driver::new(config, store.clone(), provider, git, host, logbuf.clone());
    let result = driver.run().await;

    // The driver has already flushed its logs; release the store last.
    store.close();

    match result {
        Ok(outcome) => {
            tracing::info!(
                iteration_id = %outcome.iteration_id,
                pr = ?outcome.pr_number,
                plans = outcome.plans_attempted,
                "iteration merged"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("iteration failed: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Stderr logging filtered by `LOG_LEVEL`, plus the capture layer feeding
/// the per-iteration log buffer.
fn init_logging(logbuf: &LogBuffer) {
    let level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into());
    let filter = EnvFilter::try_new(&level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(logbuf.layer())
        .init();
}
