// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0

//! In-memory [`GitRepo`](crate::GitRepo) for driver tests.
//!
//! Records every operation and hands out deterministic commit SHAs, so a
//! test can assert on the exact sequence of git calls an iteration made
//! without a repository on disk.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::{GitError, GitRepo};

#[derive(Default)]
pub struct MockGit {
    calls: Mutex<Vec<String>>,
    commits: AtomicU64,
}

impl MockGit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every git operation performed, in order, rendered as short command
    /// strings (`"create_branch ouro/add-tests"`, `"push ouro/add-tests"`).
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl GitRepo for MockGit {
    async fn clone_fresh(&self) -> Result<(), GitError> {
        self.record("clone_fresh".into());
        Ok(())
    }

    async fn create_branch(&self, name: &str) -> Result<(), GitError> {
        self.record(format!("create_branch {name}"));
        Ok(())
    }

    async fn checkout(&self, reference: &str) -> Result<(), GitError> {
        self.record(format!("checkout {reference}"));
        Ok(())
    }

    async fn commit_all(&self, message: &str) -> Result<(), GitError> {
        self.record(format!("commit {message}"));
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn push(&self, branch: &str, force: bool) -> Result<(), GitError> {
        if force {
            self.record(format!("push --force {branch}"));
        } else {
            self.record(format!("push {branch}"));
        }
        Ok(())
    }

    async fn head_sha(&self) -> Result<String, GitError> {
        let n = self.commits.load(Ordering::SeqCst);
        Ok(format!("{n:040x}"))
    }

    async fn recent_log(&self, count: usize) -> Result<String, GitError> {
        self.record(format!("log -{count}"));
        Ok("abc1234 initial commit\n".into())
    }

    async fn diff_against_main(&self) -> Result<String, GitError> {
        Ok(String::new())
    }

    async fn reset_to_main(&self) -> Result<(), GitError> {
        self.record("reset_to_main".into());
        Ok(())
    }
}
