//! # Run Plans
//!
//! Resolves the requested options into a run mode and a fixed stage
//! sequence. Resolution happens once, before anything runs, and depends only
//! on which stages were requested, never on the query text.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::StageKind;
use crate::error::PipelineError;
use crate::usage::OperationTag;

/// Options requested by the caller
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunOptions {
    /// Research query; falls back to the configured default where allowed
    pub query: Option<String>,
    pub verbose: bool,
    /// Run critique after research
    pub critique: bool,
    /// Only critique existing research
    pub critique_only: bool,
    /// Produce a final report after the other stages
    pub final_report: bool,
    /// Only produce a final report from existing research and critique
    pub final_report_only: bool,
    /// Give the critique agent a live handoff route back to research
    pub iterative: bool,
    /// Research input for critique-only mode
    pub input_file: Option<PathBuf>,
}

/// Resolved run mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    Research,
    ResearchReport,
    ResearchCritique,
    ResearchCritiqueReport,
    CritiqueOnly,
    ReportOnly,
    Iterative { report: bool },
}

/// Where a stage's input comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageInput {
    /// The query itself
    Query,
    /// Outputs of earlier stages of this run
    InRun,
    /// Artifacts persisted by an earlier run (or an input file)
    External,
}

/// A stage in the plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedStage {
    pub stage: StageKind,
    pub operation: OperationTag,
    pub input: StageInput,
    /// Build the agent with a handoff route back to research
    pub handoff_to_research: bool,
}

impl PlannedStage {
    const fn new(stage: StageKind, operation: OperationTag, input: StageInput) -> Self {
        Self {
            stage,
            operation,
            input,
            handoff_to_research: false,
        }
    }
}

/// The fixed plan of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunPlan {
    pub mode: RunMode,
    pub stages: Vec<PlannedStage>,
}

impl RunMode {
    /// Resolve options into a mode, rejecting contradictory combinations
    pub fn resolve(options: &RunOptions) -> Result<Self, PipelineError> {
        let invalid = |msg: &str| Err(PipelineError::Validation(msg.to_string()));

        if options.critique_only && options.final_report_only {
            return invalid("--critique-only and --final-report-only are mutually exclusive");
        }
        if options.iterative && (options.critique_only || options.final_report_only) {
            return invalid(
                "--iterative cannot be combined with --critique-only or --final-report-only",
            );
        }
        if options.iterative && !options.critique {
            return invalid("--iterative requires --critique");
        }
        if options.critique_only && options.final_report {
            return invalid("--critique-only cannot be combined with --final-report");
        }
        if options.final_report_only && options.critique {
            return invalid("--final-report-only cannot be combined with --critique");
        }
        if options.input_file.is_some() && !options.critique_only {
            return invalid("--input-file is only used with --critique-only");
        }
        let has_query = options
            .query
            .as_deref()
            .is_some_and(|q| !q.trim().is_empty());
        if (options.critique_only || options.final_report_only) && !has_query {
            return invalid(
                "--critique-only and --final-report-only require --query (the original query)",
            );
        }

        let mode = if options.critique_only {
            RunMode::CritiqueOnly
        } else if options.final_report_only {
            RunMode::ReportOnly
        } else if options.iterative {
            RunMode::Iterative {
                report: options.final_report,
            }
        } else {
            match (options.critique, options.final_report) {
                (false, false) => RunMode::Research,
                (false, true) => RunMode::ResearchReport,
                (true, false) => RunMode::ResearchCritique,
                (true, true) => RunMode::ResearchCritiqueReport,
            }
        };
        Ok(mode)
    }

    /// Stage sequence of this mode
    pub fn plan(self) -> RunPlan {
        use OperationTag as Op;
        use StageInput::*;
        use StageKind::*;

        let research = PlannedStage::new(Research, Op::Research, Query);
        let report = PlannedStage::new(FinalReport, Op::FinalReport, InRun);

        let stages = match self {
            RunMode::Research => vec![research],
            RunMode::ResearchReport => vec![research, report],
            RunMode::ResearchCritique => {
                vec![research, PlannedStage::new(Critique, Op::Critique, InRun)]
            }
            RunMode::ResearchCritiqueReport => vec![
                research,
                PlannedStage::new(Critique, Op::Critique, InRun),
                report,
            ],
            RunMode::CritiqueOnly => {
                vec![PlannedStage::new(Critique, Op::CritiqueOnly, External)]
            }
            RunMode::ReportOnly => {
                vec![PlannedStage::new(FinalReport, Op::FinalReportOnly, External)]
            }
            RunMode::Iterative { report: with_report } => {
                let critique = PlannedStage {
                    handoff_to_research: true,
                    ..PlannedStage::new(Critique, Op::ResearchCritiqueIterative, InRun)
                };
                let mut stages = vec![research, critique];
                if with_report {
                    stages.push(report);
                }
                stages
            }
        };

        RunPlan { mode: self, stages }
    }
}

impl RunPlan {
    /// Resolve options straight into a plan
    pub fn resolve(options: &RunOptions) -> Result<Self, PipelineError> {
        Ok(RunMode::resolve(options)?.plan())
    }

    pub fn stage_kinds(&self) -> Vec<StageKind> {
        self.stages.iter().map(|s| s.stage).collect()
    }
}
