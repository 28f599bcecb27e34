//! Shared context threaded through a run.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;

use super::plan::RunOptions;
use super::StageKind;
use crate::agents::RunContext;

/// Output of a completed stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    pub output: String,
    #[serde(default)]
    pub payload: Option<Value>,
}

/// Query, requested stages, and the results of stages completed so far
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowState {
    pub query: String,
    pub verbose: bool,
    pub critique_requested: bool,
    pub final_report_requested: bool,
    pub iterative: bool,
    pub input_file: Option<PathBuf>,
    pub results: BTreeMap<StageKind, StageResult>,
}

impl WorkflowState {
    pub fn new(query: impl Into<String>, options: &RunOptions) -> Self {
        Self {
            query: query.into(),
            verbose: options.verbose,
            critique_requested: options.critique || options.critique_only,
            final_report_requested: options.final_report || options.final_report_only,
            iterative: options.iterative,
            input_file: options.input_file.clone(),
            results: BTreeMap::new(),
        }
    }

    /// Record a stage's result once it has succeeded
    pub fn insert(&mut self, stage: StageKind, result: StageResult) {
        self.results.insert(stage, result);
    }

    pub fn output(&self, stage: StageKind) -> Option<&str> {
        self.results.get(&stage).map(|r| r.output.as_str())
    }

    /// Context handed to agents
    pub fn context(&self) -> RunContext {
        RunContext {
            query: self.query.clone(),
            verbose: self.verbose,
        }
    }
}
