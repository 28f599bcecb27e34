//! # Veritas Models
//!
//! Per-stage model selection and turn budgets.

use serde::{Deserialize, Serialize};

use crate::workflow::StageKind;

pub const DEFAULT_RESEARCH_MODEL: &str = "o4-mini-deep-research";
pub const DEFAULT_CRITIQUE_MODEL: &str = "o3-pro";
pub const DEFAULT_FINAL_REPORT_MODEL: &str = "o4-mini";

pub const MAX_TURNS_RESEARCH: u32 = 15;
pub const MAX_TURNS_CRITIQUE: u32 = 25;
pub const MAX_TURNS_FINAL_REPORT: u32 = 15;

/// Configuration for one stage's model
///
/// ## Example
/// ```rust
/// use veritas_core::models::ModelConfig;
///
/// let config = ModelConfig::new("o3-pro").with_max_turns(25);
/// assert_eq!(config.max_turns, 25);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelConfig {
    /// Model name (e.g., "o3-pro", "gpt-4.1")
    pub model: String,
    /// Upper bound on model round trips for one invocation
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,
    /// Ask the model for a reasoning summary
    #[serde(default = "default_true")]
    pub reasoning_summary: bool,
}

fn default_max_turns() -> u32 {
    MAX_TURNS_RESEARCH
}

fn default_true() -> bool {
    true
}

impl ModelConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            max_turns: default_max_turns(),
            reasoning_summary: true,
        }
    }

    pub fn with_max_turns(mut self, max_turns: u32) -> Self {
        self.max_turns = max_turns;
        self
    }

    pub fn without_reasoning_summary(mut self) -> Self {
        self.reasoning_summary = false;
        self
    }
}

/// Model configuration for each stage
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StageModels {
    pub research: ModelConfig,
    pub critique: ModelConfig,
    pub final_report: ModelConfig,
}

impl Default for StageModels {
    fn default() -> Self {
        Self {
            research: ModelConfig::new(DEFAULT_RESEARCH_MODEL).with_max_turns(MAX_TURNS_RESEARCH),
            critique: ModelConfig::new(DEFAULT_CRITIQUE_MODEL).with_max_turns(MAX_TURNS_CRITIQUE),
            final_report: ModelConfig::new(DEFAULT_FINAL_REPORT_MODEL)
                .with_max_turns(MAX_TURNS_FINAL_REPORT),
        }
    }
}

impl StageModels {
    pub fn for_stage(&self, stage: StageKind) -> &ModelConfig {
        match stage {
            StageKind::Research => &self.research,
            StageKind::Critique => &self.critique,
            StageKind::FinalReport => &self.final_report,
        }
    }

    pub fn for_stage_mut(&mut self, stage: StageKind) -> &mut ModelConfig {
        match stage {
            StageKind::Research => &mut self.research,
            StageKind::Critique => &mut self.critique,
            StageKind::FinalReport => &mut self.final_report,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_stage_models() {
        let models = StageModels::default();
        assert_eq!(models.research.model, "o4-mini-deep-research");
        assert_eq!(models.for_stage(StageKind::Critique).max_turns, 25);
        assert_eq!(models.for_stage(StageKind::FinalReport).model, "o4-mini");
    }

    #[test]
    fn test_model_config_serialization() {
        let json = r#"{"model": "gpt-4.1"}"#;
        let config: ModelConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.max_turns, MAX_TURNS_RESEARCH);
        assert!(config.reasoning_summary);
    }
}
