//! Model pricing tables and cost estimation.
//!
//! Prices are USD per million tokens. Cached input tokens are a subset of
//! input tokens billed at the cached rate; reasoning tokens are a subset of
//! output tokens billed at whichever rate [`ReasoningRate`] selects.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::aggregator::TokenCounts;

/// Rate at which reasoning tokens are billed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningRate {
    Input,
    #[default]
    Output,
}

impl std::str::FromStr for ReasoningRate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "input" => Ok(ReasoningRate::Input),
            "output" => Ok(ReasoningRate::Output),
            other => Err(format!("unknown reasoning rate '{}' (expected input or output)", other)),
        }
    }
}

/// Per-million-token prices for one model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPrice {
    pub input_per_million: f64,
    /// Falls back to the input price when absent
    #[serde(default)]
    pub cached_input_per_million: Option<f64>,
    pub output_per_million: f64,
}

impl ModelPrice {
    pub const fn new(input: f64, cached: Option<f64>, output: f64) -> Self {
        Self {
            input_per_million: input,
            cached_input_per_million: cached,
            output_per_million: output,
        }
    }
}

/// Estimated cost of a model bucket
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Cost {
    pub input_cost: f64,
    pub output_cost: f64,
    pub total: f64,
}

/// Price table with a configurable reasoning rate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingTable {
    #[serde(default)]
    pub reasoning_rate: ReasoningRate,
    #[serde(default = "default_prices")]
    pub models: BTreeMap<String, ModelPrice>,
}

impl Default for PricingTable {
    fn default() -> Self {
        Self {
            reasoning_rate: ReasoningRate::default(),
            models: default_prices(),
        }
    }
}

fn default_prices() -> BTreeMap<String, ModelPrice> {
    [
        ("o4-mini-deep-research", ModelPrice::new(2.0, Some(0.5), 8.0)),
        ("o3-deep-research", ModelPrice::new(10.0, Some(2.5), 40.0)),
        ("o3-pro", ModelPrice::new(20.0, None, 80.0)),
        ("o3", ModelPrice::new(2.0, Some(0.5), 8.0)),
        ("o4-mini", ModelPrice::new(1.1, Some(0.275), 4.4)),
        ("gpt-4o", ModelPrice::new(2.5, Some(1.25), 10.0)),
        ("gpt-4.1", ModelPrice::new(2.0, Some(0.5), 8.0)),
    ]
    .into_iter()
    .map(|(name, price)| (name.to_string(), price))
    .collect()
}

impl PricingTable {
    pub fn with_reasoning_rate(mut self, rate: ReasoningRate) -> Self {
        self.reasoning_rate = rate;
        self
    }

    /// Look up a model's price: exact match, then the longest known prefix
    /// (so dated snapshots like `o3-2025-04-16` resolve to `o3`).
    pub fn price_for(&self, model: &str) -> Option<&ModelPrice> {
        if let Some(price) = self.models.get(model) {
            return Some(price);
        }
        self.models
            .iter()
            .filter(|(name, _)| model.starts_with(name.as_str()))
            .max_by_key(|(name, _)| name.len())
            .map(|(_, price)| price)
    }

    /// Estimate the cost of a model's accumulated usage.
    ///
    /// Returns `None` for models with no known price.
    #[allow(clippy::cast_precision_loss)] // token counts never approach 2^52
    pub fn estimate(&self, model: &str, counts: &TokenCounts) -> Option<Cost> {
        let price = self.price_for(model)?;
        let per = |tokens: u64, rate: f64| tokens as f64 / 1_000_000.0 * rate;

        let cached = counts.cached_tokens.min(counts.input_tokens);
        let fresh_input = counts.input_tokens - cached;
        let cached_rate = price
            .cached_input_per_million
            .unwrap_or(price.input_per_million);

        let reasoning = counts.reasoning_tokens.min(counts.output_tokens);
        let (input_cost, output_cost) = match self.reasoning_rate {
            ReasoningRate::Output => (
                per(fresh_input, price.input_per_million) + per(cached, cached_rate),
                per(counts.output_tokens, price.output_per_million),
            ),
            ReasoningRate::Input => (
                per(fresh_input, price.input_per_million)
                    + per(cached, cached_rate)
                    + per(reasoning, price.input_per_million),
                per(counts.output_tokens - reasoning, price.output_per_million),
            ),
        };

        Some(Cost {
            input_cost,
            output_cost,
            total: input_cost + output_cost,
        })
    }
}

/// Format a cost value for display.
///
/// Uses 4 decimal places for values under $0.01, 2 otherwise.
pub fn format_cost(cost: f64) -> String {
    if cost < 0.01 {
        format!("${:.4}", cost)
    } else {
        format!("${:.2}", cost)
    }
}
