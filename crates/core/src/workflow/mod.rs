//! # Workflow Orchestration
//!
//! Drives the research → critique → final report pipeline.
//!
//! ## Pipeline Flow
//!
//! ```text
//! Query → Research ──▶ Critique ──▶ Final Report
//!             ▲            │
//!             └─ handoff ──┘   (iterative mode, inside one critique invocation)
//! ```

pub mod coordinator;
pub mod events;
pub mod invoker;
pub mod normalizer;
pub mod pipeline;
pub mod plan;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use coordinator::{Coordinator, CoordinatorConfig, RunOutcome, StageFailure};
pub use events::{WorkflowEvent, WorkflowEventKind};
pub use invoker::{AgentInvoker, StageOutcome};
pub use normalizer::{EventNormalizer, NormalizedEvent, RawLogEntry, ToolCatalog};
pub use pipeline::{Pipeline, StageState};
pub use plan::{PlannedStage, RunMode, RunOptions, RunPlan, StageInput};
pub use state::{StageResult, WorkflowState};

/// One logical phase of the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Research,
    Critique,
    FinalReport,
}

impl StageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::Research => "research",
            StageKind::Critique => "critique",
            StageKind::FinalReport => "final_report",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
