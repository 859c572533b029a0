// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::{CheckRun, CheckStatus, HostClient, HostError, PullRequest};

const DEFAULT_API_BASE: &str = "https://api.github.com";
const USER_AGENT_VALUE: &str = "ouro-agent";

/// GitHub REST implementation of [`HostClient`].
#[derive(Debug, Clone)]
pub struct GitHubClient {
    client: Client,
    token: String,
    owner: String,
    repo: String,
    api_base: String,
}

impl GitHubClient {
    pub fn new(
        token: impl Into<String>,
        owner: impl Into<String>,
        repo: impl Into<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            token: token.into(),
            owner: owner.into(),
            repo: repo.into(),
            api_base: DEFAULT_API_BASE.into(),
        }
    }

    /// Custom API base for GitHub Enterprise or a test server.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.token))
                .unwrap_or_else(|_| HeaderValue::from_static("Bearer invalid")),
        );
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static("2022-11-28"),
        );
        headers
    }

    fn repo_url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/{}/{}",
            self.api_base, self.owner, self.repo, path
        )
    }

    async fn handle<T: for<'de> Deserialize<'de>>(&self, resp: Response) -> Result<T, HostError> {
        let status = resp.status();
        if status.is_success() {
            resp.json().await.map_err(|e| HostError::ApiError {
                status: status.as_u16(),
                message: format!("failed to parse response: {e}"),
            })
        } else {
            Err(error_for(status, resp).await)
        }
    }

    async fn expect_success(&self, resp: Response) -> Result<(), HostError> {
        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(error_for(status, resp).await)
        }
    }
}

async fn error_for(status: StatusCode, resp: Response) -> HostError {
    #[derive(Deserialize)]
    struct ErrBody {
        message: String,
    }
    let message = resp
        .json::<ErrBody>()
        .await
        .map(|b| b.message)
        .unwrap_or_else(|_| "unknown error".into());
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => HostError::AuthFailed(message),
        StatusCode::NOT_FOUND => HostError::NotFound(message),
        StatusCode::TOO_MANY_REQUESTS => HostError::RateLimited,
        _ => HostError::ApiError {
            status: status.as_u16(),
            message,
        },
    }
}

fn net(e: reqwest::Error) -> HostError {
    HostError::NetworkError(e.to_string())
}

// ─── Wire types ───────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct GhPull {
    number: u64,
    html_url: String,
    head: GhRef,
    user: GhUser,
}

#[derive(Deserialize)]
struct GhRef {
    #[serde(rename = "ref")]
    ref_name: String,
}

#[derive(Deserialize)]
struct GhUser {
    login: String,
}

impl From<GhPull> for PullRequest {
    fn from(p: GhPull) -> Self {
        PullRequest {
            number: p.number,
            url: p.html_url,
            head: p.head.ref_name,
            author: p.user.login,
        }
    }
}

#[derive(Deserialize)]
struct GhCheckRuns {
    check_runs: Vec<GhCheckRun>,
}

#[derive(Deserialize)]
struct GhCheckRun {
    id: u64,
    name: String,
    status: String,
    conclusion: Option<String>,
}

impl From<GhCheckRun> for CheckRun {
    fn from(c: GhCheckRun) -> Self {
        let status = match c.status.as_str() {
            "completed" => CheckStatus::Completed,
            "in_progress" => CheckStatus::InProgress,
            _ => CheckStatus::Queued,
        };
        CheckRun {
            id: c.id,
            name: c.name,
            status,
            conclusion: c.conclusion,
        }
    }
}

#[derive(Deserialize)]
struct GhWorkflowRuns {
    workflow_runs: Vec<GhWorkflowRun>,
}

#[derive(Deserialize)]
struct GhWorkflowRun {
    id: u64,
}

#[derive(Deserialize)]
struct GhJobs {
    jobs: Vec<GhJob>,
}

#[derive(Deserialize)]
struct GhJob {
    id: u64,
}

// ─── HostClient impl ──────────────────────────────────────────────────────────

#[async_trait::async_trait]
impl HostClient for GitHubClient {
    async fn list_open_prs_by_author(&self, author: &str) -> Result<Vec<PullRequest>, HostError> {
        let url = self.repo_url("pulls?state=open&per_page=100");
        let resp = self
            .client
            .get(&url)
            .headers(self.headers())
            .send()
            .await
            .map_err(net)?;
        let pulls: Vec<GhPull> = self.handle(resp).await?;
        Ok(pulls
            .into_iter()
            .filter(|p| p.user.login == author)
            .map(Into::into)
            .collect())
    }

    async fn open_pr(
        &self,
        head: &str,
        base: &str,
        title: &str,
        body: &str,
    ) -> Result<PullRequest, HostError> {
        debug!(head, base, "opening pull request");
        let resp = self
            .client
            .post(self.repo_url("pulls"))
            .headers(self.headers())
            .json(&json!({ "head": head, "base": base, "title": title, "body": body }))
            .send()
            .await
            .map_err(net)?;
        let pr: GhPull = self.handle(resp).await?;
        Ok(pr.into())
    }

    async fn close_pr(&self, number: u64) -> Result<(), HostError> {
        let resp = self
            .client
            .patch(self.repo_url(&format!("pulls/{number}")))
            .headers(self.headers())
            .json(&json!({ "state": "closed" }))
            .send()
            .await
            .map_err(net)?;
        self.expect_success(resp).await
    }

    async fn merge_pr(&self, number: u64) -> Result<(), HostError> {
        let resp = self
            .client
            .put(self.repo_url(&format!("pulls/{number}/merge")))
            .headers(self.headers())
            .json(&json!({ "merge_method": "squash" }))
            .send()
            .await
            .map_err(net)?;
        self.expect_success(resp).await
    }

    async fn delete_branch(&self, branch: &str) -> Result<(), HostError> {
        let resp = self
            .client
            .delete(self.repo_url(&format!("git/refs/heads/{branch}")))
            .headers(self.headers())
            .send()
            .await
            .map_err(net)?;
        self.expect_success(resp).await
    }

    async fn check_runs(&self, sha: &str) -> Result<Vec<CheckRun>, HostError> {
        let resp = self
            .client
            .get(self.repo_url(&format!("commits/{sha}/check-runs")))
            .headers(self.headers())
            .send()
            .await
            .map_err(net)?;
        let runs: GhCheckRuns = self.handle(resp).await?;
        Ok(runs.check_runs.into_iter().map(Into::into).collect())
    }

    async fn check_log(&self, check_run_id: u64) -> Result<String, HostError> {
        // Check-run ids from the Checks API double as Actions job ids, whose
        // log endpoint serves plain text (after a redirect reqwest follows).
        let resp = self
            .client
            .get(self.repo_url(&format!("actions/jobs/{check_run_id}/logs")))
            .headers(self.headers())
            .send()
            .await
            .map_err(net)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(error_for(status, resp).await);
        }
        resp.text().await.map_err(net)
    }

    async fn latest_main_run_log(&self) -> Result<Option<String>, HostError> {
        let resp = self
            .client
            .get(self.repo_url(
                "actions/runs?branch=main&status=success&per_page=1",
            ))
            .headers(self.headers())
            .send()
            .await
            .map_err(net)?;
        let runs: GhWorkflowRuns = self.handle(resp).await?;
        let Some(run) = runs.workflow_runs.into_iter().next() else {
            return Ok(None);
        };
        let resp = self
            .client
            .get(self.repo_url(&format!("actions/runs/{}/jobs", run.id)))
            .headers(self.headers())
            .send()
            .await
            .map_err(net)?;
        let jobs: GhJobs = self.handle(resp).await?;
        let mut combined = String::new();
        for job in jobs.jobs {
            match self.check_log(job.id).await {
                Ok(log) => {
                    combined.push_str(&log);
                    combined.push('\n');
                }
                // A job whose log has expired should not sink the others.
                Err(HostError::NotFound(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(if combined.is_empty() {
            None
        } else {
            Some(combined)
        })
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
