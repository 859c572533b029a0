// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use crate::types::Usage;

/// USD per million tokens for one model family.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceRow {
    /// Model-id prefix this row applies to
    pub prefix: &'static str,
    pub input: f64,
    pub output: f64,
    pub cache_read: f64,
    pub cache_write_5m: f64,
    pub cache_write_1h: f64,
}

/// Batch API requests are billed at half the normal rate.
const BATCH_MULTIPLIER: f64 = 0.5;

const PRICES: &[PriceRow] = &[
    PriceRow {
        prefix: "claude-opus-4",
        input: 15.0,
        output: 75.0,
        cache_read: 1.50,
        cache_write_5m: 18.75,
        cache_write_1h: 30.0,
    },
    PriceRow {
        prefix: "claude-sonnet-4",
        input: 3.0,
        output: 15.0,
        cache_read: 0.30,
        cache_write_5m: 3.75,
        cache_write_1h: 6.0,
    },
    PriceRow {
        prefix: "claude-haiku-4",
        input: 1.0,
        output: 5.0,
        cache_read: 0.10,
        cache_write_5m: 1.25,
        cache_write_1h: 2.0,
    },
];

/// Fallback used for model ids with no matching row.  Priced at the
/// mid-tier rate so unknown models are never under-billed to zero.
const DEFAULT_ROW: PriceRow = PriceRow {
    prefix: "",
    input: 3.0,
    output: 15.0,
    cache_read: 0.30,
    cache_write_5m: 3.75,
    cache_write_1h: 6.0,
};

/// Look up the price row for `model` by longest-prefix match.
pub fn price_for(model: &str) -> &'static PriceRow {
    PRICES
        .iter()
        .filter(|row| model.starts_with(row.prefix))
        .max_by_key(|row| row.prefix.len())
        .unwrap_or(&DEFAULT_ROW)
}

/// Monetary cost of one call in USD.
///
/// Each token class is priced per million tokens; batch requests apply a
/// flat 0.5 multiplier.  Zero-token usage costs zero.
pub fn compute_cost(model: &str, usage: &Usage, batch: bool) -> f64 {
    let row = price_for(model);
    let per_mtok = |tokens: u64, rate: f64| tokens as f64 * rate / 1_000_000.0;
    let cost = per_mtok(usage.input_tokens, row.input)
        + per_mtok(usage.output_tokens, row.output)
        + per_mtok(usage.cache_read_input_tokens, row.cache_read)
        + per_mtok(usage.cache_write_5m(), row.cache_write_5m)
        + per_mtok(usage.cache_write_1h(), row.cache_write_1h);
    if batch {
        cost * BATCH_MULTIPLIER
    } else {
        cost
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CacheCreation;

    fn usage(input: u64, output: u64) -> Usage {
        Usage {
            input_tokens: input,
            output_tokens: output,
            ..Usage::default()
        }
    }

    #[test]
    fn zero_usage_costs_zero() {
        assert_eq!(compute_cost("claude-sonnet-4-5", &Usage::default(), false), 0.0);
        assert_eq!(compute_cost("claude-sonnet-4-5", &Usage::default(), true), 0.0);
    }

    #[test]
    fn batch_is_exactly_half() {
        let u = Usage {
            input_tokens: 123_456,
            output_tokens: 7_890,
            cache_read_input_tokens: 4_000,
            cache_creation_input_tokens: 2_000,
            cache_creation: Some(CacheCreation {
                ephemeral_5m_input_tokens: 1_500,
                ephemeral_1h_input_tokens: 500,
            }),
        };
        let full = compute_cost("claude-sonnet-4-5", &u, false);
        let batched = compute_cost("claude-sonnet-4-5", &u, true);
        assert!(full > 0.0);
        assert!((batched - full / 2.0).abs() < 1e-12);
    }

    #[test]
    fn unknown_model_uses_default_row() {
        let u = usage(1_000_000, 0);
        let cost = compute_cost("totally-unknown-model", &u, false);
        assert!((cost - DEFAULT_ROW.input).abs() < 1e-12);
    }

    #[test]
    fn prefix_match_selects_family() {
        assert_eq!(price_for("claude-opus-4-6").input, 15.0);
        assert_eq!(price_for("claude-haiku-4-5").input, 1.0);
        assert_eq!(price_for("claude-sonnet-4-5-20250929").input, 3.0);
    }

    #[test]
    fn one_million_output_tokens_costs_output_rate() {
        let cost = compute_cost("claude-haiku-4-5", &usage(0, 1_000_000), false);
        assert!((cost - 5.0).abs() < 1e-12);
    }

    #[test]
    fn cache_classes_priced_separately() {
        let u = Usage {
            cache_read_input_tokens: 1_000_000,
            ..Usage::default()
        };
        let cost = compute_cost("claude-sonnet-4-5", &u, false);
        assert!((cost - 0.30).abs() < 1e-12);

        let u = Usage {
            cache_creation_input_tokens: 1_000_000,
            ..Usage::default()
        };
        // No TTL split: the aggregate is billed at the 5-minute write rate.
        let cost = compute_cost("claude-sonnet-4-5", &u, false);
        assert!((cost - 3.75).abs() < 1e-12);
    }
}
