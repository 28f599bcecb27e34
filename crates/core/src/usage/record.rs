//! # Usage Records
//!
//! One observation of model consumption, extracted leniently from whatever
//! usage payload the vendor reported.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::workflow::StageKind;

/// Label attributing usage to a stage/mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationTag {
    /// Research stage
    Research,
    /// Critique after an in-run research stage
    Critique,
    /// Critique of externally supplied research
    CritiqueOnly,
    /// Critique with a live handoff route back to research
    ResearchCritiqueIterative,
    /// Final report after in-run stages
    FinalReport,
    /// Final report from persisted research and critique
    FinalReportOnly,
}

impl OperationTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationTag::Research => "research",
            OperationTag::Critique => "critique",
            OperationTag::CritiqueOnly => "critique_only",
            OperationTag::ResearchCritiqueIterative => "research_critique_iterative",
            OperationTag::FinalReport => "final_report",
            OperationTag::FinalReportOnly => "final_report_only",
        }
    }

    /// Stage this operation runs as
    pub fn stage(&self) -> StageKind {
        match self {
            OperationTag::Research => StageKind::Research,
            OperationTag::Critique
            | OperationTag::CritiqueOnly
            | OperationTag::ResearchCritiqueIterative => StageKind::Critique,
            OperationTag::FinalReport | OperationTag::FinalReportOnly => StageKind::FinalReport,
        }
    }

    /// File name of the raw event log for this operation
    pub fn raw_log_file(&self) -> &'static str {
        match self {
            OperationTag::Research => "raw_events_research.json",
            OperationTag::Critique => "raw_events_critique_after_research.json",
            OperationTag::CritiqueOnly => "raw_events_critique.json",
            OperationTag::ResearchCritiqueIterative => "raw_events_iterative.json",
            OperationTag::FinalReport => "raw_events_final_report.json",
            OperationTag::FinalReportOnly => "raw_events_final_report_only.json",
        }
    }
}

impl fmt::Display for OperationTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Token counters reported by a vendor for one or more model round trips.
///
/// Every field is optional in the wire payload; anything missing, negative
/// or of the wrong type reads as zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsagePayload {
    pub requests: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    pub cached_tokens: u64,
    pub reasoning_tokens: u64,
}

impl UsagePayload {
    /// Extract counters from a vendor usage object.
    ///
    /// Understands the Responses API shape (`input_tokens_details.cached_tokens`,
    /// `output_tokens_details.reasoning_tokens`) and the Chat Completions
    /// aliases (`prompt_tokens`, `completion_tokens`). A payload with no
    /// `requests` field counts as a single request.
    pub fn from_value(value: &serde_json::Value) -> Self {
        let field = |path: &[&str]| -> Option<u64> {
            let mut cur = value;
            for key in path {
                cur = cur.get(*key)?;
            }
            cur.as_u64()
        };

        let input_tokens = field(&["input_tokens"])
            .or_else(|| field(&["prompt_tokens"]))
            .unwrap_or(0);
        let output_tokens = field(&["output_tokens"])
            .or_else(|| field(&["completion_tokens"]))
            .unwrap_or(0);
        let total_tokens = field(&["total_tokens"])
            .unwrap_or_else(|| input_tokens.saturating_add(output_tokens));
        let cached_tokens = field(&["input_tokens_details", "cached_tokens"])
            .or_else(|| field(&["prompt_tokens_details", "cached_tokens"]))
            .unwrap_or(0)
            .min(input_tokens);
        let reasoning_tokens = field(&["output_tokens_details", "reasoning_tokens"])
            .or_else(|| field(&["completion_tokens_details", "reasoning_tokens"]))
            .unwrap_or(0);

        Self {
            requests: field(&["requests"]).unwrap_or(1),
            input_tokens,
            output_tokens,
            total_tokens,
            cached_tokens,
            reasoning_tokens,
        }
    }

    /// Merge another round trip into this payload
    pub fn merge(&mut self, other: &UsagePayload) {
        self.requests = self.requests.saturating_add(other.requests);
        self.input_tokens = self.input_tokens.saturating_add(other.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(other.output_tokens);
        self.total_tokens = self.total_tokens.saturating_add(other.total_tokens);
        self.cached_tokens = self.cached_tokens.saturating_add(other.cached_tokens);
        self.reasoning_tokens = self.reasoning_tokens.saturating_add(other.reasoning_tokens);
    }
}

/// One completed agent invocation's consumption
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub model: String,
    pub operation: OperationTag,
    pub requests: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    pub cached_tokens: u64,
    pub reasoning_tokens: u64,
    pub timestamp: DateTime<Utc>,
}

impl UsageRecord {
    pub fn new(model: impl Into<String>, operation: OperationTag, payload: &UsagePayload) -> Self {
        Self {
            model: model.into(),
            operation,
            requests: payload.requests,
            input_tokens: payload.input_tokens,
            output_tokens: payload.output_tokens,
            total_tokens: payload.total_tokens,
            // Cached tokens are a subset of input tokens.
            cached_tokens: payload.cached_tokens.min(payload.input_tokens),
            reasoning_tokens: payload.reasoning_tokens,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_responses_usage_shape() {
        let payload = UsagePayload::from_value(&json!({
            "input_tokens": 1200,
            "input_tokens_details": { "cached_tokens": 200 },
            "output_tokens": 800,
            "output_tokens_details": { "reasoning_tokens": 500 },
            "total_tokens": 2000
        }));
        assert_eq!(payload.requests, 1);
        assert_eq!(payload.input_tokens, 1200);
        assert_eq!(payload.cached_tokens, 200);
        assert_eq!(payload.reasoning_tokens, 500);
        assert_eq!(payload.total_tokens, 2000);
    }

    #[test]
    fn test_malformed_fields_read_as_zero() {
        let payload = UsagePayload::from_value(&json!({
            "input_tokens": "lots",
            "output_tokens": -4,
            "input_tokens_details": null,
            "output_tokens_details": { "reasoning_tokens": 3.5 }
        }));
        assert_eq!(payload.input_tokens, 0);
        assert_eq!(payload.output_tokens, 0);
        assert_eq!(payload.cached_tokens, 0);
        assert_eq!(payload.reasoning_tokens, 0);
        assert_eq!(payload.total_tokens, 0);
    }

    #[test]
    fn test_cached_never_exceeds_input() {
        let payload = UsagePayload::from_value(&json!({
            "input_tokens": 5,
            "input_tokens_details": { "cached_tokens": 10 }
        }));
        assert_eq!(payload.cached_tokens, 5);

        let inflated = UsagePayload {
            input_tokens: 3,
            cached_tokens: 9,
            ..payload
        };
        let record = UsageRecord::new("o3-pro", OperationTag::Critique, &inflated);
        assert!(record.input_tokens >= record.cached_tokens);
        assert_eq!(record.cached_tokens, 3);
    }

    #[test]
    fn test_non_object_payload() {
        let payload = UsagePayload::from_value(&json!("not usage"));
        assert_eq!(payload.input_tokens, 0);
        assert_eq!(payload.requests, 1);
    }

    #[test]
    fn test_total_defaults_to_sum() {
        let payload = UsagePayload::from_value(&json!({
            "prompt_tokens": 10,
            "completion_tokens": 5
        }));
        assert_eq!(payload.total_tokens, 15);
    }

    #[test]
    fn test_operation_tag_serialization() {
        let json = serde_json::to_string(&OperationTag::ResearchCritiqueIterative).unwrap();
        assert_eq!(json, "\"research_critique_iterative\"");
        assert_eq!(OperationTag::CritiqueOnly.stage(), StageKind::Critique);
        assert_eq!(OperationTag::FinalReportOnly.to_string(), "final_report_only");
    }
}
