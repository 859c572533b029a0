// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::time::Duration;

use tracing::{debug, info};

use ouro_config::CiConfig;

use crate::logs::extract_failure_slice;
use crate::{HostClient, HostError};

/// Result of waiting for CI on one commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksOutcome {
    pub passed: bool,
    /// Extracted failure output when `passed` is false.
    pub error: Option<String>,
}

impl ChecksOutcome {
    fn pass() -> Self {
        Self {
            passed: true,
            error: None,
        }
    }

    fn fail(error: impl Into<String>) -> Self {
        Self {
            passed: false,
            error: Some(error.into()),
        }
    }
}

/// Poll check runs for `sha` until all succeed, any fails, or a timeout
/// elapses.
///
/// Two timeouts apply: `no_checks_timeout_secs` only until the first check
/// run is observed for the commit, and `timeout_secs` for the whole wait.
/// On failure the failing check's log is fetched and reduced to the
/// relevant slice.
pub async fn await_checks(
    host: &dyn HostClient,
    sha: &str,
    cfg: &CiConfig,
) -> Result<ChecksOutcome, HostError> {
    let started = tokio::time::Instant::now();
    let poll = Duration::from_secs(cfg.poll_interval_secs.max(1));
    let no_checks_timeout = Duration::from_secs(cfg.no_checks_timeout_secs);
    let overall_timeout = Duration::from_secs(cfg.timeout_secs);
    let mut any_check_seen = false;

    loop {
        let runs = host.check_runs(sha).await?;
        if runs.is_empty() {
            if !any_check_seen && started.elapsed() >= no_checks_timeout {
                return Ok(ChecksOutcome::fail("no checks started"));
            }
        } else {
            any_check_seen = true;

            if let Some(failed) = runs.iter().find(|r| r.failed()) {
                info!(check = %failed.name, conclusion = ?failed.conclusion, "check failed");
                let error = match host.check_log(failed.id).await {
                    Ok(log) => extract_failure_slice(&log),
                    Err(e) => format!(
                        "check \"{}\" concluded {} (log unavailable: {e})",
                        failed.name,
                        failed.conclusion.as_deref().unwrap_or("failure"),
                    ),
                };
                return Ok(ChecksOutcome::fail(error));
            }

            // No failures above; once everything has completed, the commit
            // is green (neutral/skipped conclusions count as non-failing).
            if runs.iter().all(|r| r.status == crate::CheckStatus::Completed) {
                debug!(count = runs.len(), "all checks concluded without failure");
                return Ok(ChecksOutcome::pass());
            }
        }

        if started.elapsed() >= overall_timeout {
            return Ok(ChecksOutcome::fail("timed out waiting for checks"));
        }
        tokio::time::sleep(poll).await;
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockHost;
    use crate::{CheckRun, CheckStatus};

    fn run(id: u64, status: CheckStatus, conclusion: Option<&str>) -> CheckRun {
        CheckRun {
            id,
            name: format!("check-{id}"),
            status,
            conclusion: conclusion.map(String::from),
        }
    }

    fn cfg() -> CiConfig {
        CiConfig {
            poll_interval_secs: 1,
            no_checks_timeout_secs: 10,
            timeout_secs: 60,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn all_checks_green_passes() {
        let host = MockHost::new();
        host.push_check_poll(vec![run(1, CheckStatus::InProgress, None)]);
        host.push_check_poll(vec![
            run(1, CheckStatus::Completed, Some("success")),
            run(2, CheckStatus::Completed, Some("success")),
        ]);
        let outcome = await_checks(&host, "sha", &cfg()).await.unwrap();
        assert!(outcome.passed);
        assert!(outcome.error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn any_failure_fails_with_extracted_log() {
        let host = MockHost::new();
        host.set_check_log(3, "##[group]Run tests\nFAIL src/x.test.ts\nTests: 1 failed\n##[endgroup]\n");
        host.push_check_poll(vec![
            run(3, CheckStatus::Completed, Some("failure")),
            run(4, CheckStatus::InProgress, None),
        ]);
        let outcome = await_checks(&host, "sha", &cfg()).await.unwrap();
        assert!(!outcome.passed);
        let err = outcome.error.unwrap();
        assert!(err.contains("FAIL src/x.test.ts"), "{err}");
    }

    #[tokio::test(start_paused = true)]
    async fn no_checks_within_timeout_fails() {
        let host = MockHost::new();
        // Every poll returns an empty list.
        let outcome = await_checks(&host, "sha", &cfg()).await.unwrap();
        assert!(!outcome.passed);
        assert_eq!(outcome.error.as_deref(), Some("no checks started"));
    }

    #[tokio::test(start_paused = true)]
    async fn no_checks_timeout_disarmed_after_first_check_appears() {
        let host = MockHost::new();
        // One check appears, then disappears from subsequent polls; the
        // overall timeout governs from there on.
        host.push_check_poll(vec![run(1, CheckStatus::Queued, None)]);
        host.push_check_poll(vec![]);
        let outcome = await_checks(&host, "sha", &cfg()).await.unwrap();
        assert!(!outcome.passed);
        assert_eq!(outcome.error.as_deref(), Some("timed out waiting for checks"));
    }

    #[tokio::test(start_paused = true)]
    async fn in_progress_checks_eventually_time_out() {
        let host = MockHost::new();
        host.push_check_poll(vec![run(1, CheckStatus::InProgress, None)]);
        let outcome = await_checks(&host, "sha", &cfg()).await.unwrap();
        assert!(!outcome.passed);
        assert_eq!(outcome.error.as_deref(), Some("timed out waiting for checks"));
    }

    #[tokio::test(start_paused = true)]
    async fn log_fetch_failure_still_reports_check_name() {
        let host = MockHost::new();
        // No log registered for id 9 → MockHost returns NotFound.
        host.push_check_poll(vec![run(9, CheckStatus::Completed, Some("failure"))]);
        let outcome = await_checks(&host, "sha", &cfg()).await.unwrap();
        assert!(!outcome.passed);
        let err = outcome.error.unwrap();
        assert!(err.contains("check-9"), "{err}");
    }
}
