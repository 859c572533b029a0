// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0

//! Phase-aware model client.
//!
//! Wraps the raw provider with everything a phase call needs: system-block
//! assembly (with cache markers), pre-call compression for long dialogs,
//! cost computation, and best-effort persistence of one
//! `GeneratedCallRecord` per call.  Store failures are logged and swallowed
//! so accounting can never abort an iteration.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::{debug, warn};

use ouro_config::{Config, Phase};
use ouro_memory::Summarizer;
use ouro_model::{
    compute_cost, MessagesRequest, Message, ModelResponse, Provider, SystemBlock, ToolSchema,
};
use ouro_store::{GeneratedCallRecord, Store};

use crate::compress::{compress_messages, CompressionPolicy};
use crate::prompts::phase_prompt;

/// Per-iteration context injected into system blocks.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    /// File tree + declaration index; shown to planner and builder.
    pub codebase: Option<String>,
    /// Memory context, recent git log, latest-main coverage; planner only.
    pub planner_context: Option<String>,
}

pub struct ModelClient {
    provider: Arc<dyn Provider>,
    store: Arc<Store>,
    config: Arc<Config>,
    iteration_id: String,
    context: Mutex<CallContext>,
}

impl ModelClient {
    pub fn new(
        provider: Arc<dyn Provider>,
        store: Arc<Store>,
        config: Arc<Config>,
        iteration_id: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            store,
            config,
            iteration_id: iteration_id.into(),
            context: Mutex::new(CallContext::default()),
        }
    }

    pub fn iteration_id(&self) -> &str {
        &self.iteration_id
    }

    /// Replace the per-iteration context (called once per planning round).
    pub fn set_context(&self, ctx: CallContext) {
        *self.context.lock().unwrap() = ctx;
    }

    fn build_system(&self, phase: Phase) -> Vec<SystemBlock> {
        let ctx = self.context.lock().unwrap().clone();
        let mut blocks = vec![SystemBlock::cached(phase_prompt(phase))];
        if matches!(phase, Phase::Planner | Phase::Builder) {
            if let Some(codebase) = ctx.codebase {
                blocks.push(SystemBlock::cached(codebase));
            }
        }
        if phase == Phase::Planner {
            if let Some(extra) = ctx.planner_context {
                // Volatile: changes every iteration, kept out of the cache.
                blocks.push(SystemBlock::plain(extra));
            }
        }
        blocks
    }

    fn build_request(
        &self,
        phase: Phase,
        messages: &[Message],
        tools: &[ToolSchema],
    ) -> MessagesRequest {
        let phase_cfg = self.config.phases.for_phase(phase);
        MessagesRequest {
            model: phase_cfg.model.clone(),
            max_tokens: phase_cfg.max_tokens,
            system: self.build_system(phase),
            messages: messages.to_vec(),
            tools: tools.to_vec(),
        }
    }

    fn record(&self, phase: Phase, req: &MessagesRequest, resp: &ModelResponse, batch: bool) {
        let usage = resp.usage;
        let cost = compute_cost(&req.model, &usage, batch);
        let record = GeneratedCallRecord {
            iteration_id: self.iteration_id.clone(),
            phase: phase.to_string(),
            model: req.model.clone(),
            system: serde_json::json!(req
                .system
                .iter()
                .map(|b| b.text.clone())
                .collect::<Vec<_>>()),
            messages: serde_json::to_value(&req.messages).unwrap_or_default(),
            response: serde_json::to_value(&resp.content).unwrap_or_default(),
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            cache_read_tokens: usage.cache_read_input_tokens,
            cache_write_5m_tokens: usage.cache_write_5m(),
            cache_write_1h_tokens: usage.cache_write_1h(),
            cost,
            batch,
            stop_reason: resp.stop_reason.clone(),
        };
        if let Err(e) = self.store.record_generated(record) {
            warn!(phase = %phase, "failed to record generated call: {e}");
        }
    }

    /// One model call for `phase`.
    ///
    /// For every phase except `memory` and `summarizer` the running message
    /// list is compressed in place first, so the caller's session carries
    /// the compacted history forward.
    pub async fn call(
        &self,
        phase: Phase,
        messages: &mut Vec<Message>,
        tools: &[ToolSchema],
    ) -> anyhow::Result<ModelResponse> {
        if phase.is_compressed() {
            let policy = CompressionPolicy::from(&self.config.summarization);
            let truncate_text = matches!(phase, Phase::Builder | Phase::Fixer);
            compress_messages(messages, &policy, truncate_text);
        }
        let req = self.build_request(phase, messages, tools);
        debug!(phase = %phase, model = %req.model, messages = req.messages.len(), "model call");
        let resp = self.provider.complete(&req).await?;
        self.record(phase, &req, &resp, false);
        Ok(resp)
    }

    /// One batched call: all requests share the phase and tool set and are
    /// billed at the batch discount.
    pub async fn call_batch(
        &self,
        phase: Phase,
        conversations: Vec<Vec<Message>>,
    ) -> anyhow::Result<Vec<ModelResponse>> {
        let reqs: Vec<MessagesRequest> = conversations
            .iter()
            .map(|msgs| self.build_request(phase, msgs, &[]))
            .collect();
        let responses = self.provider.complete_batch(&reqs).await?;
        for (req, resp) in reqs.iter().zip(responses.iter()) {
            self.record(phase, req, resp, true);
        }
        Ok(responses)
    }
}

/// Model-backed [`Summarizer`], wired into the memory service at startup.
/// Breaking the driver ↔ memory ↔ model cycle at this seam keeps the
/// memory crate free of any model dependency.
pub struct ModelSummarizer {
    client: Arc<ModelClient>,
}

impl ModelSummarizer {
    pub fn new(client: Arc<ModelClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Summarizer for ModelSummarizer {
    async fn summarize(&self, text: &str) -> anyhow::Result<String> {
        let mut messages = vec![Message::user(text)];
        let resp = self.client.call(Phase::Memory, &mut messages, &[]).await?;
        Ok(resp.to_message().text().trim().to_string())
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use ouro_model::{ContentBlock, ScriptedProvider, Usage};
    use serde_json::json;

    fn client_with(script: Vec<ModelResponse>) -> (Arc<ModelClient>, Arc<ScriptedProvider>, Arc<Store>) {
        let provider = Arc::new(ScriptedProvider::new(script));
        let store = Arc::new(Store::open(None).unwrap());
        let client = Arc::new(ModelClient::new(
            provider.clone(),
            store.clone(),
            Arc::new(Config::for_tests()),
            "iter-test",
        ));
        (client, provider, store)
    }

    fn response_with_usage(text: &str, input: u64, output: u64) -> ModelResponse {
        ModelResponse {
            usage: Usage {
                input_tokens: input,
                output_tokens: output,
                ..Usage::default()
            },
            ..ModelResponse::text(text)
        }
    }

    #[tokio::test]
    async fn call_records_one_generated_row() {
        let (client, _provider, store) = client_with(vec![response_with_usage("ok", 100, 10)]);
        let mut messages = vec![Message::user("hi")];
        client.call(Phase::Planner, &mut messages, &[]).await.unwrap();
        let rows = store.generated_for_iteration("iter-test").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].phase, "planner");
        assert!(!rows[0].batch);
        assert!(rows[0].cost > 0.0);
    }

    #[tokio::test]
    async fn planner_system_carries_phase_prompt_and_context() {
        let (client, provider, _store) = client_with(vec![ModelResponse::text("ok")]);
        client.set_context(CallContext {
            codebase: Some("## File tree\nsrc/".into()),
            planner_context: Some("## Notes to self\n- keep CI green".into()),
        });
        let mut messages = vec![Message::user("plan")];
        client.call(Phase::Planner, &mut messages, &[]).await.unwrap();

        let req = &provider.requests()[0];
        assert_eq!(req.system.len(), 3);
        assert!(req.system[0].cache, "phase prompt block is cached");
        assert!(req.system[1].cache, "codebase block is cached");
        assert!(!req.system[2].cache, "volatile context is not cached");
        assert!(req.system[2].text.contains("keep CI green"));
    }

    #[tokio::test]
    async fn builder_gets_codebase_but_not_planner_context() {
        let (client, provider, _store) = client_with(vec![ModelResponse::text("ok")]);
        client.set_context(CallContext {
            codebase: Some("tree".into()),
            planner_context: Some("memories".into()),
        });
        let mut messages = vec![Message::user("build")];
        client.call(Phase::Builder, &mut messages, &[]).await.unwrap();
        let req = &provider.requests()[0];
        assert_eq!(req.system.len(), 2);
        assert!(!req.system.iter().any(|b| b.text.contains("memories")));
    }

    #[tokio::test]
    async fn memory_phase_is_not_compressed() {
        let (client, provider, _store) = client_with(vec![ModelResponse::text("summary")]);
        // A long old tool-result dialog that WOULD be compressed for other
        // phases; for the memory phase it must pass through untouched.
        let big = "x".repeat(5_000);
        let mut messages = vec![Message::user(big.clone())];
        client.call(Phase::Memory, &mut messages, &[]).await.unwrap();
        assert_eq!(provider.requests()[0].messages[0].text(), big);
    }

    #[tokio::test]
    async fn builder_call_compresses_old_tool_results_in_place() {
        let (client, provider, _store) = client_with(vec![ModelResponse::text("ok")]);
        let mut messages = vec![Message::user("start")];
        for i in 0..5 {
            messages.push(Message {
                role: ouro_model::Role::Assistant,
                content: vec![ContentBlock::ToolUse {
                    id: format!("tu{i}"),
                    name: "read_file".into(),
                    input: json!({"path": format!("f{i}.rs")}),
                }],
            });
            messages.push(Message::tool_results(vec![ContentBlock::ToolResult {
                tool_use_id: format!("tu{i}"),
                content: "line\n".repeat(500),
                is_error: false,
            }]));
        }
        client.call(Phase::Builder, &mut messages, &[]).await.unwrap();

        // The caller's own list was rewritten, not just the outgoing copy.
        let first_result = match &messages[2].content[0] {
            ContentBlock::ToolResult { content, .. } => content.clone(),
            _ => panic!("expected tool result"),
        };
        assert!(first_result.starts_with("[Previously read f0.rs"), "{first_result}");
        // And the outgoing request saw the same compacted form.
        let sent = &provider.requests()[0].messages[2];
        assert!(sent.text().is_empty());
    }

    #[tokio::test]
    async fn batch_rows_are_marked_and_discounted() {
        let (client, _provider, store) = client_with(vec![
            response_with_usage("a", 200_000, 0),
            response_with_usage("b", 200_000, 0),
        ]);
        client
            .call_batch(
                Phase::Summarizer,
                vec![vec![Message::user("one")], vec![Message::user("two")]],
            )
            .await
            .unwrap();
        let rows = store.generated_for_iteration("iter-test").unwrap();
        assert_eq!(rows.len(), 2);
        for row in &rows {
            assert!(row.batch);
            let full = compute_cost(&row.model, &Usage {
                input_tokens: row.input_tokens,
                ..Usage::default()
            }, false);
            assert!((row.cost - full * 0.5).abs() < 1e-12);
        }
    }

    #[tokio::test]
    async fn summarizer_trait_returns_response_text() {
        let (client, _provider, _store) = client_with(vec![ModelResponse::text("  a summary  ")]);
        let summarizer = ModelSummarizer::new(client);
        let out = summarizer.summarize("long content").await.unwrap();
        assert_eq!(out, "a summary");
    }
}
