//! # Workflow Events
//!
//! Lifecycle and activity events streamed to observers of a run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::normalizer::NormalizedEvent;
use super::StageKind;
use crate::usage::OperationTag;

/// Kind of workflow event
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowEventKind {
    /// Run started
    PipelineStarted,
    /// Stage invocation starting
    StageStarted,
    /// Normalized agent activity inside a stage
    AgentActivity,
    /// Stage output available
    StageCompleted,
    /// Stage failed
    StageFailed,
    /// Run completed
    PipelineCompleted,
    /// Run failed
    PipelineFailed,
}

/// An event of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowEvent {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub kind: WorkflowEventKind,
    #[serde(default)]
    pub stage: Option<StageKind>,
    #[serde(default)]
    pub operation: Option<OperationTag>,
    #[serde(default)]
    pub activity: Option<NormalizedEvent>,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

impl WorkflowEvent {
    pub fn new(kind: WorkflowEventKind) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            kind,
            stage: None,
            operation: None,
            activity: None,
            data: None,
        }
    }

    /// Activity event for an operation
    pub fn activity(operation: OperationTag, event: NormalizedEvent) -> Self {
        let mut ev = Self::new(WorkflowEventKind::AgentActivity).with_operation(operation);
        ev.activity = Some(event);
        ev
    }

    pub fn with_stage(mut self, stage: StageKind) -> Self {
        self.stage = Some(stage);
        self
    }

    /// Attach an operation, and the stage it runs as
    pub fn with_operation(mut self, operation: OperationTag) -> Self {
        self.operation = Some(operation);
        self.stage = Some(operation.stage());
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}
