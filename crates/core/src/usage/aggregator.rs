//! # Usage Aggregator
//!
//! Running token totals across every agent invocation of a run, keyed by
//! model and by operation, plus a grand total.

use serde::Serialize;
use std::collections::BTreeMap;

use super::pricing::{format_cost, Cost, PricingTable};
use super::record::{OperationTag, UsageRecord};

/// Summed token counters for one bucket
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TokenCounts {
    pub requests: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    pub cached_tokens: u64,
    pub reasoning_tokens: u64,
}

impl TokenCounts {
    fn add(&mut self, record: &UsageRecord) {
        self.requests = self.requests.saturating_add(record.requests);
        self.input_tokens = self.input_tokens.saturating_add(record.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(record.output_tokens);
        self.total_tokens = self.total_tokens.saturating_add(record.total_tokens);
        self.cached_tokens = self.cached_tokens.saturating_add(record.cached_tokens);
        self.reasoning_tokens = self.reasoning_tokens.saturating_add(record.reasoning_tokens);
    }

    /// Parenthesised detail such as `(3 requests, 200 cached, 50 reasoning)`
    fn detail(&self) -> String {
        let mut parts = vec![format!("{} requests", with_commas(self.requests))];
        if self.cached_tokens > 0 {
            parts.push(format!("{} cached", with_commas(self.cached_tokens)));
        }
        if self.reasoning_tokens > 0 {
            parts.push(format!("{} reasoning", with_commas(self.reasoning_tokens)));
        }
        format!("({})", parts.join(", "))
    }
}

/// Aggregate over all records seen so far
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UsageTotals {
    pub by_model: BTreeMap<String, TokenCounts>,
    pub by_operation: BTreeMap<OperationTag, TokenCounts>,
    pub grand_total: TokenCounts,
}

/// Serializable usage report, persisted as `token_usage.json`
#[derive(Debug, Clone, Serialize)]
pub struct UsageReport {
    pub total_usage: TokenCounts,
    pub by_model: BTreeMap<String, TokenCounts>,
    pub by_operation: BTreeMap<OperationTag, TokenCounts>,
    pub detailed_history: Vec<UsageRecord>,
    pub estimated_cost: BTreeMap<String, Cost>,
}

/// The run's single usage accumulator.
///
/// Owned by the coordinator and mutated only by the active stage.
#[derive(Debug, Clone, Default)]
pub struct UsageAggregator {
    totals: UsageTotals,
    history: Vec<UsageRecord>,
    pricing: PricingTable,
}

impl UsageAggregator {
    pub fn new(pricing: PricingTable) -> Self {
        Self {
            totals: UsageTotals::default(),
            history: Vec::new(),
            pricing,
        }
    }

    /// Merge a record into its model, operation and grand-total buckets
    pub fn add(&mut self, record: UsageRecord) {
        tracing::debug!(
            model = %record.model,
            operation = %record.operation,
            total_tokens = record.total_tokens,
            "Recording usage"
        );
        self.totals
            .by_model
            .entry(record.model.clone())
            .or_default()
            .add(&record);
        self.totals
            .by_operation
            .entry(record.operation)
            .or_default()
            .add(&record);
        self.totals.grand_total.add(&record);
        self.history.push(record);
    }

    /// Snapshot of the current totals
    pub fn report(&self) -> UsageTotals {
        self.totals.clone()
    }

    pub fn history(&self) -> &[UsageRecord] {
        &self.history
    }

    /// Full report including history and cost estimates
    pub fn usage_report(&self) -> UsageReport {
        let estimated_cost = self
            .totals
            .by_model
            .iter()
            .filter_map(|(model, counts)| {
                self.pricing
                    .estimate(model, counts)
                    .map(|cost| (model.clone(), cost))
            })
            .collect();

        UsageReport {
            total_usage: self.totals.grand_total,
            by_model: self.totals.by_model.clone(),
            by_operation: self.totals.by_operation.clone(),
            detailed_history: self.history.clone(),
            estimated_cost,
        }
    }

    /// Deterministic breakdown: per-model lines, per-operation lines, then
    /// the grand total.
    pub fn format_summary(&self) -> String {
        self.render("## Token Usage Statistics")
    }

    /// Summary for the final report, whose own usage is not part of the
    /// cost estimate it contains.
    pub fn format_report_summary(&self) -> String {
        self.render("## Token Usage Statistics (not included in cost estimates)")
    }

    fn render(&self, header: &str) -> String {
        let totals = &self.totals;
        let mut lines = vec![header.to_string(), String::new(), "### By Model:".to_string()];

        for (model, counts) in &totals.by_model {
            let cost = self
                .pricing
                .estimate(model, counts)
                .map(|c| format!(" ~{}", format_cost(c.total)))
                .unwrap_or_default();
            lines.push(format!(
                "- **{}:** {} tokens {}{}",
                model,
                with_commas(counts.total_tokens),
                counts.detail(),
                cost
            ));
        }

        lines.push(String::new());
        lines.push("### By Operation:".to_string());
        for (operation, counts) in &totals.by_operation {
            lines.push(format!(
                "- **{}:** {} tokens {}",
                operation,
                with_commas(counts.total_tokens),
                counts.detail()
            ));
        }

        let grand = &totals.grand_total;
        lines.push(String::new());
        lines.push(format!(
            "**Total Usage:** {} tokens ({} input, {} output) {}",
            with_commas(grand.total_tokens),
            with_commas(grand.input_tokens),
            with_commas(grand.output_tokens),
            grand.detail()
        ));

        let estimated: f64 = totals
            .by_model
            .iter()
            .filter_map(|(model, counts)| self.pricing.estimate(model, counts))
            .map(|c| c.total)
            .sum();
        if estimated > 0.0 {
            lines.push(format!("**Estimated Cost:** {}", format_cost(estimated)));
        }

        lines.join("\n")
    }
}

/// Format an integer with thousands separators (`1234567` -> `1,234,567`)
pub fn with_commas(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
