// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0

//! Code-host adapter: pull requests, check runs, and CI log retrieval.
//!
//! The [`HostClient`] trait is the seam the iteration driver talks through;
//! [`GitHubClient`] implements it against the GitHub REST API and
//! [`mock::MockHost`] backs tests.

use async_trait::async_trait;
use thiserror::Error;

mod checks;
mod github;
pub mod logs;
pub mod mock;

pub use checks::{await_checks, ChecksOutcome};
pub use github::GitHubClient;

#[derive(Debug, Clone, Error)]
pub enum HostError {
    #[error("authentication failed: {0}")]
    AuthFailed(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("rate limited")]
    RateLimited,
    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },
    #[error("network error: {0}")]
    NetworkError(String),
}

/// An open pull request as returned from list/create calls.
#[derive(Debug, Clone)]
pub struct PullRequest {
    pub number: u64,
    pub url: String,
    pub head: String,
    pub author: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    Queued,
    InProgress,
    Completed,
}

/// One CI check run attached to a commit.
#[derive(Debug, Clone)]
pub struct CheckRun {
    pub id: u64,
    pub name: String,
    pub status: CheckStatus,
    /// Set once `status == Completed`: `success`, `failure`, `cancelled`, …
    pub conclusion: Option<String>,
}

impl CheckRun {
    pub fn succeeded(&self) -> bool {
        self.status == CheckStatus::Completed && self.conclusion.as_deref() == Some("success")
    }

    pub fn failed(&self) -> bool {
        self.status == CheckStatus::Completed
            && !matches!(self.conclusion.as_deref(), Some("success") | Some("neutral") | Some("skipped"))
    }
}

/// Operations the driver needs from the code host.
#[async_trait]
pub trait HostClient: Send + Sync {
    async fn list_open_prs_by_author(&self, author: &str) -> Result<Vec<PullRequest>, HostError>;
    async fn open_pr(
        &self,
        head: &str,
        base: &str,
        title: &str,
        body: &str,
    ) -> Result<PullRequest, HostError>;
    async fn close_pr(&self, number: u64) -> Result<(), HostError>;
    async fn merge_pr(&self, number: u64) -> Result<(), HostError>;
    async fn delete_branch(&self, branch: &str) -> Result<(), HostError>;
    /// Check runs currently attached to a commit SHA.
    async fn check_runs(&self, sha: &str) -> Result<Vec<CheckRun>, HostError>;
    /// Raw log text of one check run.
    async fn check_log(&self, check_run_id: u64) -> Result<String, HostError>;
    /// Log text of the most recent successful workflow run on the default
    /// branch, used for coverage extraction.  `None` when no such run exists.
    async fn latest_main_run_log(&self) -> Result<Option<String>, HostError>;
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn run(status: CheckStatus, conclusion: Option<&str>) -> CheckRun {
        CheckRun {
            id: 1,
            name: "test".into(),
            status,
            conclusion: conclusion.map(String::from),
        }
    }

    #[test]
    fn succeeded_requires_completed_success() {
        assert!(run(CheckStatus::Completed, Some("success")).succeeded());
        assert!(!run(CheckStatus::InProgress, None).succeeded());
        assert!(!run(CheckStatus::Completed, Some("failure")).succeeded());
    }

    #[test]
    fn neutral_and_skipped_are_not_failures() {
        assert!(!run(CheckStatus::Completed, Some("neutral")).failed());
        assert!(!run(CheckStatus::Completed, Some("skipped")).failed());
        assert!(run(CheckStatus::Completed, Some("failure")).failed());
        assert!(run(CheckStatus::Completed, Some("cancelled")).failed());
        assert!(!run(CheckStatus::InProgress, None).failed());
    }
}
