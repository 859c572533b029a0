// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod anthropic;
mod mock;
mod pricing;
mod provider;
mod types;

pub use anthropic::AnthropicClient;
pub use mock::ScriptedProvider;
pub use pricing::{compute_cost, price_for, PriceRow};
pub use provider::Provider;
pub use types::*;
