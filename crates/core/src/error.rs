//! # Pipeline Errors
//!
//! Typed failure conditions of the orchestration core and the process exit
//! statuses they map to.

use crate::usage::OperationTag;
use crate::workflow::StageKind;
use thiserror::Error;

/// Errors raised while planning or running a workflow
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Bad mode/argument combination, raised before any stage runs
    #[error("Validation error: {0}")]
    Validation(String),

    /// Vendor, network or protocol failure inside a stage
    #[error("Agent execution failed during {operation}: {cause}")]
    AgentExecutionFailed {
        operation: OperationTag,
        cause: String,
    },

    /// The stage exceeded its round-trip budget
    #[error("Turn limit of {max_turns} exceeded during {operation}")]
    TurnLimitExceeded { operation: OperationTag, max_turns: u32 },

    /// A consumed prior-stage artifact is absent
    #[error("Missing input artifact for {stage}: {detail}")]
    MissingInputArtifact { stage: StageKind, detail: String },

    /// Output sink failure
    #[error("Output sink error: {0}")]
    Sink(#[from] anyhow::Error),
}

impl PipelineError {
    /// Operation tag attached to agent failures
    pub fn operation(&self) -> Option<OperationTag> {
        match self {
            PipelineError::AgentExecutionFailed { operation, .. }
            | PipelineError::TurnLimitExceeded { operation, .. } => Some(*operation),
            _ => None,
        }
    }
}

/// Exit status surfaced to the invoking environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Success,
    ValidationFailure,
    ResearchFailed,
    CritiqueFailed,
    ReportFailed,
    Unclassified,
}

impl ExitStatus {
    /// Process exit code
    pub fn code(self) -> i32 {
        match self {
            ExitStatus::Success => 0,
            ExitStatus::ValidationFailure => 1,
            ExitStatus::ResearchFailed => 2,
            ExitStatus::CritiqueFailed => 3,
            ExitStatus::ReportFailed => 4,
            ExitStatus::Unclassified => 5,
        }
    }

    /// Status for a failure attributed to a stage
    pub fn for_stage(stage: StageKind) -> Self {
        match stage {
            StageKind::Research => ExitStatus::ResearchFailed,
            StageKind::Critique => ExitStatus::CritiqueFailed,
            StageKind::FinalReport => ExitStatus::ReportFailed,
        }
    }

    pub fn is_success(self) -> bool {
        self == ExitStatus::Success
    }
}
