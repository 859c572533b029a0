// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0

//! Scripted [`HostClient`](crate::HostClient) for tests.
//!
//! Check-run polling replays a queue of snapshots (the last one repeats
//! once the queue drains, an empty queue always reports no checks), PR
//! numbers increment from 1, and every mutating call is recorded for
//! assertions.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::{CheckRun, HostClient, HostError, PullRequest};

#[derive(Default)]
pub struct MockHost {
    calls: Mutex<Vec<String>>,
    check_polls: Mutex<VecDeque<Vec<CheckRun>>>,
    last_poll: Mutex<Option<Vec<CheckRun>>>,
    check_logs: Mutex<HashMap<u64, String>>,
    open_prs: Mutex<Vec<PullRequest>>,
    main_run_log: Mutex<Option<String>>,
    next_pr: AtomicU64,
}

impl MockHost {
    pub fn new() -> Self {
        Self {
            next_pr: AtomicU64::new(1),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    /// Queue one check-run snapshot; polls consume the queue in order and
    /// repeat the final snapshot once it drains.
    pub fn push_check_poll(&self, runs: Vec<CheckRun>) {
        self.check_polls.lock().unwrap().push_back(runs);
    }

    pub fn set_check_log(&self, check_run_id: u64, log: impl Into<String>) {
        self.check_logs.lock().unwrap().insert(check_run_id, log.into());
    }

    /// Seed the open-PR list returned for the agent's author filter.
    pub fn seed_open_pr(&self, number: u64, head: impl Into<String>, author: impl Into<String>) {
        self.open_prs.lock().unwrap().push(PullRequest {
            number,
            url: format!("https://example.test/pull/{number}"),
            head: head.into(),
            author: author.into(),
        });
    }

    pub fn set_main_run_log(&self, log: impl Into<String>) {
        *self.main_run_log.lock().unwrap() = Some(log.into());
    }
}

#[async_trait]
impl HostClient for MockHost {
    async fn list_open_prs_by_author(&self, author: &str) -> Result<Vec<PullRequest>, HostError> {
        self.record(format!("list_open_prs_by_author {author}"));
        Ok(self
            .open_prs
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.author == author)
            .cloned()
            .collect())
    }

    async fn open_pr(
        &self,
        head: &str,
        base: &str,
        title: &str,
        _body: &str,
    ) -> Result<PullRequest, HostError> {
        let number = self.next_pr.fetch_add(1, Ordering::SeqCst);
        self.record(format!("open_pr {head} -> {base}: {title}"));
        Ok(PullRequest {
            number,
            url: format!("https://example.test/pull/{number}"),
            head: head.to_string(),
            author: "ouro-agent".into(),
        })
    }

    async fn close_pr(&self, number: u64) -> Result<(), HostError> {
        self.record(format!("close_pr {number}"));
        Ok(())
    }

    async fn merge_pr(&self, number: u64) -> Result<(), HostError> {
        self.record(format!("merge_pr {number}"));
        Ok(())
    }

    async fn delete_branch(&self, branch: &str) -> Result<(), HostError> {
        self.record(format!("delete_branch {branch}"));
        Ok(())
    }

    async fn check_runs(&self, _sha: &str) -> Result<Vec<CheckRun>, HostError> {
        let mut queue = self.check_polls.lock().unwrap();
        if let Some(runs) = queue.pop_front() {
            *self.last_poll.lock().unwrap() = Some(runs.clone());
            return Ok(runs);
        }
        Ok(self.last_poll.lock().unwrap().clone().unwrap_or_default())
    }

    async fn check_log(&self, check_run_id: u64) -> Result<String, HostError> {
        self.check_logs
            .lock()
            .unwrap()
            .get(&check_run_id)
            .cloned()
            .ok_or_else(|| HostError::NotFound(format!("no log for check run {check_run_id}")))
    }

    async fn latest_main_run_log(&self) -> Result<Option<String>, HostError> {
        Ok(self.main_run_log.lock().unwrap().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CheckStatus;

    #[tokio::test]
    async fn poll_queue_repeats_last_snapshot() {
        let host = MockHost::new();
        host.push_check_poll(vec![]);
        host.push_check_poll(vec![CheckRun {
            id: 1,
            name: "ci".into(),
            status: CheckStatus::Completed,
            conclusion: Some("success".into()),
        }]);
        assert!(host.check_runs("sha").await.unwrap().is_empty());
        assert_eq!(host.check_runs("sha").await.unwrap().len(), 1);
        // Queue drained — last snapshot repeats.
        assert_eq!(host.check_runs("sha").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn pr_numbers_increment() {
        let host = MockHost::new();
        let a = host.open_pr("h1", "main", "t", "b").await.unwrap();
        let b = host.open_pr("h2", "main", "t", "b").await.unwrap();
        assert_eq!(a.number, 1);
        assert_eq!(b.number, 2);
    }

    #[tokio::test]
    async fn author_filter_applies() {
        let host = MockHost::new();
        host.seed_open_pr(3, "ouro/stale", "ouro-agent");
        host.seed_open_pr(4, "human/branch", "a-human");
        let prs = host.list_open_prs_by_author("ouro-agent").await.unwrap();
        assert_eq!(prs.len(), 1);
        assert_eq!(prs[0].number, 3);
    }
}
