// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;

use crate::types::{MessagesRequest, ModelResponse};

/// The provider seam.
///
/// `AnthropicClient` is the production implementation; `ScriptedProvider`
/// backs session and driver tests.  Higher layers (system-context assembly,
/// compression, cost recording) live above this trait so a scripted test
/// provider exercises them for free.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Execute one request and return the complete response.
    ///
    /// Implementations retry transient rate limits internally; any error
    /// returned here is terminal for the call.
    async fn complete(&self, req: &MessagesRequest) -> anyhow::Result<ModelResponse>;

    /// Execute a batch of requests, returning responses in request order.
    ///
    /// The whole batch fails if any individual request errored or is missing
    /// from the provider's result stream.
    async fn complete_batch(&self, reqs: &[MessagesRequest]) -> anyhow::Result<Vec<ModelResponse>>;
}
