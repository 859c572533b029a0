// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::VecDeque;
use std::sync::Mutex;

use anyhow::bail;
use async_trait::async_trait;

use crate::provider::Provider;
use crate::types::{MessagesRequest, ModelResponse};

/// A provider that replays a fixed script of responses.
///
/// Each `complete` call pops the next response; `complete_batch` pops one
/// per request.  Every request is recorded for assertions.  Running past
/// the end of the script is a test bug and fails loudly.
#[derive(Default)]
pub struct ScriptedProvider {
    script: Mutex<VecDeque<ModelResponse>>,
    requests: Mutex<Vec<MessagesRequest>>,
}

impl ScriptedProvider {
    pub fn new(responses: Vec<ModelResponse>) -> Self {
        Self {
            script: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Append another response to the script.
    pub fn push(&self, response: ModelResponse) {
        self.script.lock().unwrap().push_back(response);
    }

    /// All requests seen so far, in call order.
    pub fn requests(&self) -> Vec<MessagesRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Number of responses not yet consumed.
    pub fn remaining(&self) -> usize {
        self.script.lock().unwrap().len()
    }

    fn pop(&self) -> anyhow::Result<ModelResponse> {
        match self.script.lock().unwrap().pop_front() {
            Some(r) => Ok(r),
            None => bail!("scripted provider exhausted: no response left for this call"),
        }
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    async fn complete(&self, req: &MessagesRequest) -> anyhow::Result<ModelResponse> {
        self.requests.lock().unwrap().push(req.clone());
        self.pop()
    }

    async fn complete_batch(&self, reqs: &[MessagesRequest]) -> anyhow::Result<Vec<ModelResponse>> {
        let mut out = Vec::with_capacity(reqs.len());
        for req in reqs {
            self.requests.lock().unwrap().push(req.clone());
            out.push(self.pop()?);
        }
        Ok(out)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
