// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::time::Duration;

use anyhow::{bail, Context};
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, warn};

use ouro_config::{BatchConfig, RetryConfig};

use crate::provider::Provider;
use crate::types::{MessagesRequest, ModelResponse, SystemBlock};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";

pub struct AnthropicClient {
    api_key: String,
    base_url: String,
    retry: RetryConfig,
    batch: BatchConfig,
    client: reqwest::Client,
}

impl AnthropicClient {
    pub fn new(
        api_key: impl Into<String>,
        base_url: Option<String>,
        retry: RetryConfig,
        batch: BatchConfig,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.into()),
            retry,
            batch,
            client: reqwest::Client::new(),
        }
    }

    fn request(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .post(format!("{}{path}", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .get(format!("{}{path}", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
    }

    /// Delay before retry `attempt` (0-based): `min(max, initial * 2^attempt)`.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let ms = self
            .retry
            .initial_delay_ms
            .saturating_mul(1u64 << attempt.min(20))
            .min(self.retry.max_delay_ms);
        Duration::from_millis(ms)
    }

    async fn post_with_retry(&self, path: &str, body: &Value) -> anyhow::Result<Value> {
        let mut attempt = 0u32;
        loop {
            let resp = self
                .request(path)
                .json(body)
                .send()
                .await
                .context("anthropic request failed")?;
            let status = resp.status();
            if status.as_u16() == 429 {
                if attempt >= self.retry.max_retries {
                    let text = resp.text().await.unwrap_or_default();
                    bail!("anthropic rate limit persisted after {attempt} retries: {text}");
                }
                let delay = self.backoff_delay(attempt);
                warn!(attempt, delay_ms = delay.as_millis() as u64, "rate limited; backing off");
                tokio::time::sleep(delay).await;
                attempt += 1;
                continue;
            }
            if !status.is_success() {
                let text = resp.text().await.unwrap_or_default();
                bail!("anthropic error {status}: {text}");
            }
            return resp.json::<Value>().await.context("invalid anthropic response body");
        }
    }
}

/// Build the `/v1/messages` request body.
///
/// System blocks flagged for caching carry an ephemeral cache-control
/// marker; the volatile suffix blocks stay uncached so the stable prefix is
/// reusable across calls.
pub(crate) fn build_body(req: &MessagesRequest) -> Value {
    let mut body = json!({
        "model": req.model,
        "max_tokens": req.max_tokens,
        "messages": req.messages,
    });
    if !req.system.is_empty() {
        body["system"] = json!(req
            .system
            .iter()
            .map(system_block_json)
            .collect::<Vec<Value>>());
    }
    if !req.tools.is_empty() {
        body["tools"] = json!(req
            .tools
            .iter()
            .map(|t| json!({
                "name": t.name,
                "description": t.description,
                "input_schema": t.input_schema,
            }))
            .collect::<Vec<Value>>());
    }
    body
}

fn system_block_json(block: &SystemBlock) -> Value {
    if block.cache {
        json!({
            "type": "text",
            "text": block.text,
            "cache_control": { "type": "ephemeral" },
        })
    } else {
        json!({ "type": "text", "text": block.text })
    }
}

fn parse_response(v: Value) -> anyhow::Result<ModelResponse> {
    serde_json::from_value(v).context("unexpected anthropic message shape")
}

#[async_trait]
impl Provider for AnthropicClient {
    async fn complete(&self, req: &MessagesRequest) -> anyhow::Result<ModelResponse> {
        let body = build_body(req);
        debug!(model = %req.model, messages = req.messages.len(), "anthropic /v1/messages");
        let v = self.post_with_retry("/v1/messages", &body).await?;
        parse_response(v)
    }

    async fn complete_batch(&self, reqs: &[MessagesRequest]) -> anyhow::Result<Vec<ModelResponse>> {
        let ts = chrono::Utc::now().timestamp_millis();
        let requests: Vec<Value> = reqs
            .iter()
            .enumerate()
            .map(|(i, r)| {
                json!({
                    "custom_id": batch_custom_id(ts, i),
                    "params": build_body(r),
                })
            })
            .collect();

        let created = self
            .post_with_retry("/v1/messages/batches", &json!({ "requests": requests }))
            .await?;
        let batch_id = created["id"]
            .as_str()
            .context("batch creation response missing id")?
            .to_string();
        debug!(batch_id = %batch_id, count = reqs.len(), "submitted message batch");

        // Poll until the batch ends.  Delay backs off between the configured
        // bounds; there is no total timeout here — the provider bounds batch
        // lifetime on its side.
        let mut delay = Duration::from_millis(self.batch.poll_interval_ms);
        let max_delay = Duration::from_millis(self.batch.max_poll_interval_ms);
        loop {
            let status = self
                .get(&format!("/v1/messages/batches/{batch_id}"))
                .send()
                .await
                .context("batch status request failed")?
                .json::<Value>()
                .await
                .context("invalid batch status body")?;
            if status["processing_status"].as_str() == Some("ended") {
                break;
            }
            tokio::time::sleep(delay).await;
            delay = (delay * 2).min(max_delay);
        }

        let results_text = self
            .get(&format!("/v1/messages/batches/{batch_id}/results"))
            .send()
            .await
            .context("batch results request failed")?
            .text()
            .await
            .context("invalid batch results body")?;

        collect_batch_results(&results_text, ts, reqs.len())
    }
}

pub(crate) fn batch_custom_id(ts: i64, index: usize) -> String {
    format!("req-{ts}-{index}")
}

/// Map the provider's JSONL result stream back onto request order.
///
/// Any errored result fails the whole batch with the provider's error text;
/// any index absent from the stream fails it with the missing list.
pub(crate) fn collect_batch_results(
    jsonl: &str,
    ts: i64,
    expected: usize,
) -> anyhow::Result<Vec<ModelResponse>> {
    let mut slots: Vec<Option<ModelResponse>> = (0..expected).map(|_| None).collect();
    for line in jsonl.lines().filter(|l| !l.trim().is_empty()) {
        let v: Value = serde_json::from_str(line).context("invalid batch result line")?;
        let custom_id = v["custom_id"].as_str().unwrap_or_default();
        let Some(index) = custom_id
            .strip_prefix(&format!("req-{ts}-"))
            .and_then(|s| s.parse::<usize>().ok())
        else {
            continue;
        };
        if index >= expected {
            continue;
        }
        let result = &v["result"];
        match result["type"].as_str() {
            Some("succeeded") => {
                slots[index] = Some(parse_response(result["message"].clone())?);
            }
            Some("errored") => {
                bail!(
                    "batch request {custom_id} errored: {}",
                    result["error"].to_string()
                );
            }
            other => {
                bail!("batch request {custom_id} ended in unexpected state: {other:?}");
            }
        }
    }
    let missing: Vec<usize> = slots
        .iter()
        .enumerate()
        .filter_map(|(i, s)| s.is_none().then_some(i))
        .collect();
    if !missing.is_empty() {
        bail!("batch results missing indices: {missing:?}");
    }
    Ok(slots.into_iter().map(|s| s.unwrap()).collect())
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
