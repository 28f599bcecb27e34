//! # Pipeline Stages
//!
//! The stage state machine of a single run.

use serde::{Deserialize, Serialize};

use super::StageKind;
use crate::error::PipelineError;

/// State of the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageState {
    /// Nothing has run yet
    NotStarted,
    /// Research agent streaming
    ResearchRunning,
    /// Research output available
    ResearchDone,
    /// Critique agent streaming
    CritiqueRunning,
    /// Critique output available
    CritiqueDone,
    /// Final report agent streaming
    ReportRunning,
    /// Final report available
    ReportDone,
    /// A stage failed; terminal
    Failed,
}

impl StageState {
    fn running(stage: StageKind) -> Self {
        match stage {
            StageKind::Research => StageState::ResearchRunning,
            StageKind::Critique => StageState::CritiqueRunning,
            StageKind::FinalReport => StageState::ReportRunning,
        }
    }

    fn done(stage: StageKind) -> Self {
        match stage {
            StageKind::Research => StageState::ResearchDone,
            StageKind::Critique => StageState::CritiqueDone,
            StageKind::FinalReport => StageState::ReportDone,
        }
    }

    /// Stage currently streaming, if any
    pub fn running_stage(&self) -> Option<StageKind> {
        match self {
            StageState::ResearchRunning => Some(StageKind::Research),
            StageState::CritiqueRunning => Some(StageKind::Critique),
            StageState::ReportRunning => Some(StageKind::FinalReport),
            _ => None,
        }
    }
}

/// The pipeline state machine
#[derive(Debug, Clone)]
pub struct Pipeline {
    /// Current state
    pub state: StageState,
    /// Stage that failed, once `state` is `Failed`
    pub failed_stage: Option<StageKind>,
    /// Stages completed in order
    pub completed: Vec<StageKind>,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self {
            state: StageState::NotStarted,
            failed_stage: None,
            completed: Vec::new(),
        }
    }
}

impl Pipeline {
    /// Create a new pipeline
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter a stage. Stages never overlap and nothing starts after a failure.
    pub fn start(&mut self, stage: StageKind) -> Result<(), PipelineError> {
        if self.is_failed() {
            return Err(PipelineError::Validation(format!(
                "cannot start {} after a failed stage",
                stage
            )));
        }
        if let Some(running) = self.state.running_stage() {
            return Err(PipelineError::Validation(format!(
                "cannot start {} while {} is running",
                stage, running
            )));
        }
        self.state = StageState::running(stage);
        Ok(())
    }

    /// Mark the running stage complete
    pub fn finish(&mut self, stage: StageKind) {
        if self.state.running_stage() == Some(stage) {
            self.state = StageState::done(stage);
            self.completed.push(stage);
        }
    }

    /// Fail the pipeline, remembering which stage failed
    pub fn fail(&mut self, stage: Option<StageKind>) {
        self.failed_stage = stage.or_else(|| self.state.running_stage());
        self.state = StageState::Failed;
    }

    /// Check if pipeline has failed
    pub fn is_failed(&self) -> bool {
        self.state == StageState::Failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_advance() {
        let mut pipeline = Pipeline::new();
        assert_eq!(pipeline.state, StageState::NotStarted);

        pipeline.start(StageKind::Research).unwrap();
        assert_eq!(pipeline.state, StageState::ResearchRunning);

        pipeline.finish(StageKind::Research);
        assert_eq!(pipeline.state, StageState::ResearchDone);

        pipeline.start(StageKind::Critique).unwrap();
        pipeline.finish(StageKind::Critique);
        pipeline.start(StageKind::FinalReport).unwrap();
        pipeline.finish(StageKind::FinalReport);
        assert_eq!(pipeline.state, StageState::ReportDone);
        assert_eq!(
            pipeline.completed,
            vec![StageKind::Research, StageKind::Critique, StageKind::FinalReport]
        );
    }

    #[test]
    fn test_no_overlapping_stages() {
        let mut pipeline = Pipeline::new();
        pipeline.start(StageKind::Research).unwrap();
        assert!(pipeline.start(StageKind::Critique).is_err());
    }

    #[test]
    fn test_failure_is_terminal() {
        let mut pipeline = Pipeline::new();
        pipeline.start(StageKind::Research).unwrap();
        pipeline.finish(StageKind::Research);
        pipeline.start(StageKind::Critique).unwrap();
        pipeline.fail(None);

        assert!(pipeline.is_failed());
        assert_eq!(pipeline.failed_stage, Some(StageKind::Critique));
        assert!(pipeline.start(StageKind::FinalReport).is_err());
        assert_eq!(pipeline.completed, vec![StageKind::Research]);
    }
}
