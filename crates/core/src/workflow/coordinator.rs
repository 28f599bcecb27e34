//! # Workflow Coordinator
//!
//! Runs a resolved plan stage by stage. Stages are strictly sequential; a
//! stage's output is persisted before the next one starts, and the first
//! failure ends the run with a stage-specific exit status.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;

use super::events::{WorkflowEvent, WorkflowEventKind};
use super::invoker::AgentInvoker;
use super::normalizer::ToolCatalog;
use super::pipeline::Pipeline;
use super::plan::{PlannedStage, RunOptions, RunPlan, StageInput};
use super::state::{StageResult, WorkflowState};
use super::StageKind;
use crate::agents::{prompts, AgentFactory};
use crate::error::{ExitStatus, PipelineError};
use crate::knowledge::KnowledgeService;
use crate::models::StageModels;
use crate::state::{io, OutputSink, StageArtifact};
use crate::usage::{OperationTag, PricingTable, UsageAggregator, UsageReport};

pub const DEFAULT_QUERY: &str = "Find if Microsoft 365 Copilot has SOC2 and HIPAA compliance. \
Do not be distracted with other products under Copilot brand. \
Ground your answers in official data from Microsoft.";

/// Configuration for the coordinator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Query used when none is given in a mode that allows it
    pub default_query: String,
    /// Per-stage turn budgets
    pub models: StageModels,
    /// Tool classification for event normalization
    pub catalog: ToolCatalog,
    /// Prices for cost estimates
    pub pricing: PricingTable,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            default_query: DEFAULT_QUERY.to_string(),
            models: StageModels::default(),
            catalog: ToolCatalog::default(),
            pricing: PricingTable::default(),
        }
    }
}

/// Why a run stopped
#[derive(Debug)]
pub struct StageFailure {
    /// Stage the failure is attributed to, if any
    pub stage: Option<StageKind>,
    pub error: PipelineError,
}

/// Result of a run
#[derive(Debug)]
pub struct RunOutcome {
    pub status: ExitStatus,
    /// Stages completed in order
    pub completed: Vec<StageKind>,
    pub failure: Option<StageFailure>,
    /// Final workflow state, including every completed stage's output
    pub state: WorkflowState,
    pub usage: UsageReport,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn output(&self, stage: StageKind) -> Option<&str> {
        self.state.output(stage)
    }
}

/// Exit status for a failure
pub fn exit_status_for(error: &PipelineError) -> ExitStatus {
    if let Some(operation) = error.operation() {
        return ExitStatus::for_stage(operation.stage());
    }
    match error {
        PipelineError::Sink(_) => ExitStatus::Unclassified,
        _ => ExitStatus::ValidationFailure,
    }
}

/// Scoped knowledge-service connection.
///
/// Released explicitly on normal and error paths; if the owning future is
/// dropped mid-stage the release is spawned onto the runtime instead.
struct KnowledgeLease {
    service: Option<Arc<dyn KnowledgeService>>,
}

impl KnowledgeLease {
    async fn acquire(
        service: Arc<dyn KnowledgeService>,
        operation: OperationTag,
    ) -> Result<Self, PipelineError> {
        if let Err(e) = service.connect().await {
            // A failed connect may leave half-open state behind.
            if let Err(close) = service.disconnect().await {
                tracing::debug!("Knowledge service cleanup failed: {}", close);
            }
            return Err(PipelineError::AgentExecutionFailed {
                operation,
                cause: format!("{} connection failed: {}", service.name(), e),
            });
        }
        tracing::info!(server = %service.name(), "Knowledge service connected");
        Ok(Self {
            service: Some(service),
        })
    }

    async fn release(mut self) {
        if let Some(service) = self.service.take() {
            if let Err(e) = service.disconnect().await {
                tracing::warn!("Failed to disconnect {}: {}", service.name(), e);
            }
        }
    }
}

impl Drop for KnowledgeLease {
    fn drop(&mut self) {
        if let Some(service) = self.service.take() {
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    let _ = service.disconnect().await;
                });
            }
        }
    }
}

/// The workflow coordinator
pub struct Coordinator {
    config: CoordinatorConfig,
    factory: Arc<dyn AgentFactory>,
    sink: Arc<dyn OutputSink>,
    invoker: AgentInvoker,
    usage: UsageAggregator,
    pipeline: Pipeline,
    event_tx: Option<mpsc::Sender<WorkflowEvent>>,
}

impl Coordinator {
    pub fn new(
        config: CoordinatorConfig,
        factory: Arc<dyn AgentFactory>,
        sink: Arc<dyn OutputSink>,
    ) -> Self {
        let invoker = AgentInvoker::new(sink.clone(), config.catalog.clone());
        let usage = UsageAggregator::new(config.pricing.clone());
        Self {
            config,
            factory,
            sink,
            invoker,
            usage,
            pipeline: Pipeline::new(),
            event_tx: None,
        }
    }

    /// Set event channel for observers
    pub fn with_event_channel(mut self, tx: mpsc::Sender<WorkflowEvent>) -> Self {
        self.invoker = AgentInvoker::new(self.sink.clone(), self.config.catalog.clone())
            .with_event_channel(tx.clone());
        self.event_tx = Some(tx);
        self
    }

    pub fn usage(&self) -> &UsageAggregator {
        &self.usage
    }

    async fn emit(&self, event: WorkflowEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event).await;
        }
    }

    /// Run the workflow the options describe
    #[tracing::instrument(skip_all)]
    pub async fn run(&mut self, options: &RunOptions) -> RunOutcome {
        self.emit(WorkflowEvent::new(WorkflowEventKind::PipelineStarted))
            .await;

        let query = options
            .query
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .unwrap_or(self.config.default_query.as_str())
            .to_string();
        let mut state = WorkflowState::new(query, options);

        let plan = match RunPlan::resolve(options) {
            Ok(plan) => plan,
            Err(error) => {
                return self
                    .finish(state, Some(StageFailure { stage: None, error }))
                    .await;
            }
        };
        tracing::info!(mode = ?plan.mode, stages = ?plan.stage_kinds(), "Resolved run plan");

        if let Err(error) = self.load_external_inputs(&plan, &mut state).await {
            let stage = match &error {
                PipelineError::MissingInputArtifact { stage, .. } => Some(*stage),
                _ => None,
            };
            return self.finish(state, Some(StageFailure { stage, error })).await;
        }

        let mut failure = None;
        for planned in &plan.stages {
            if let Err(error) = self.pipeline.start(planned.stage) {
                failure = Some(StageFailure {
                    stage: Some(planned.stage),
                    error,
                });
                break;
            }
            self.emit(
                WorkflowEvent::new(WorkflowEventKind::StageStarted)
                    .with_operation(planned.operation),
            )
            .await;

            match self.run_stage(planned, &mut state).await {
                Ok(()) => {
                    self.pipeline.finish(planned.stage);
                    self.emit(
                        WorkflowEvent::new(WorkflowEventKind::StageCompleted)
                            .with_operation(planned.operation),
                    )
                    .await;
                }
                Err(error) => {
                    tracing::error!(stage = %planned.stage, "Stage failed: {}", error);
                    self.pipeline.fail(Some(planned.stage));
                    self.emit(
                        WorkflowEvent::new(WorkflowEventKind::StageFailed)
                            .with_operation(planned.operation)
                            .with_data(serde_json::json!({ "error": error.to_string() })),
                    )
                    .await;
                    failure = Some(StageFailure {
                        stage: Some(planned.stage),
                        error,
                    });
                    break;
                }
            }
        }

        self.finish(state, failure).await
    }

    /// Put artifacts of earlier runs into the state before anything runs
    async fn load_external_inputs(
        &self,
        plan: &RunPlan,
        state: &mut WorkflowState,
    ) -> Result<(), PipelineError> {
        let Some(first) = plan.stages.first() else {
            return Ok(());
        };
        if first.input != StageInput::External {
            return Ok(());
        }

        let needed: &[StageKind] = match first.stage {
            StageKind::Critique => &[StageKind::Research],
            StageKind::FinalReport => &[StageKind::Research, StageKind::Critique],
            StageKind::Research => &[],
        };

        for &stage in needed {
            let (content, source) = match (stage, &state.input_file) {
                (StageKind::Research, Some(path)) => (
                    io::load_input_file(path).await,
                    format!("input file {}", path.display()),
                ),
                _ => (
                    self.sink.read(stage).await,
                    format!("saved {} results", stage),
                ),
            };

            let content = content
                .map_err(|e| PipelineError::MissingInputArtifact {
                    stage: first.stage,
                    detail: format!("could not read {}: {:#}", source, e),
                })?
                .filter(|c| !c.trim().is_empty())
                .ok_or_else(|| PipelineError::MissingInputArtifact {
                    stage: first.stage,
                    detail: format!("no {} found", source),
                })?;

            tracing::info!(stage = %stage, "Loaded {}", source);
            state.insert(
                stage,
                StageResult {
                    output: content,
                    payload: Some(serde_json::json!({ "source": source })),
                },
            );
        }
        Ok(())
    }

    async fn run_stage(
        &mut self,
        planned: &PlannedStage,
        state: &mut WorkflowState,
    ) -> Result<(), PipelineError> {
        let operation = planned.operation;
        let max_turns = self.config.models.for_stage(planned.stage).max_turns;
        let missing = |stage: StageKind| PipelineError::MissingInputArtifact {
            stage: planned.stage,
            detail: format!("{} output is not available", stage),
        };

        let outcome = match planned.stage {
            StageKind::Research => {
                let agent = self.factory.research_agent();
                let query = state.query.as_str();
                self.invoker
                    .invoke(&mut self.usage, agent.as_ref(), query, state, operation, max_turns)
                    .await?
            }
            StageKind::Critique => {
                let research = state
                    .output(StageKind::Research)
                    .ok_or_else(|| missing(StageKind::Research))?;
                let message = prompts::critique_message(&state.query, research);

                let knowledge = self.factory.knowledge_service();
                let lease = match &knowledge {
                    Some(service) => {
                        Some(KnowledgeLease::acquire(service.clone(), operation).await?)
                    }
                    None => None,
                };
                let handoff = planned
                    .handoff_to_research
                    .then(|| self.factory.research_agent());
                let agent = self.factory.critique_agent(handoff, knowledge);

                let result = self
                    .invoker
                    .invoke(&mut self.usage, agent.as_ref(), &message, state, operation, max_turns)
                    .await;
                if let Some(lease) = lease {
                    lease.release().await;
                }
                let outcome = result?;

                if planned.handoff_to_research {
                    match &outcome.handoff {
                        Some(target) => tracing::info!("Critique handed control to {}", target),
                        None => tracing::info!("Critique completed without a handoff"),
                    }
                }
                outcome
            }
            StageKind::FinalReport => {
                let research = state
                    .output(StageKind::Research)
                    .ok_or_else(|| missing(StageKind::Research))?;
                let critique = state.output(StageKind::Critique);
                if planned.input == StageInput::External && critique.is_none() {
                    return Err(missing(StageKind::Critique));
                }
                let message = prompts::final_report_message(&state.query, research, critique);
                let agent = self.factory.final_report_agent();
                self.invoker
                    .invoke(&mut self.usage, agent.as_ref(), &message, state, operation, max_turns)
                    .await?
            }
        };

        state.insert(
            planned.stage,
            StageResult {
                output: outcome.output.clone(),
                payload: outcome
                    .handoff
                    .as_ref()
                    .map(|to| serde_json::json!({ "handoff": to })),
            },
        );

        let usage_summary = match planned.stage {
            StageKind::FinalReport => self.usage.format_report_summary(),
            _ => self.usage.format_summary(),
        };
        let artifact = StageArtifact {
            stage: planned.stage,
            query: state.query.clone(),
            content: outcome.output,
            usage_summary,
            usage_report: serde_json::to_value(self.usage.usage_report())
                .map_err(|e| PipelineError::Sink(e.into()))?,
        };
        self.sink.persist(&artifact).await?;
        Ok(())
    }

    async fn finish(&mut self, state: WorkflowState, failure: Option<StageFailure>) -> RunOutcome {
        let report = self.usage.usage_report();
        if let Err(e) = self.sink.persist_usage_report(&report).await {
            tracing::warn!("Failed to save token usage report: {:#}", e);
        }

        let status = failure
            .as_ref()
            .map(|f| exit_status_for(&f.error))
            .unwrap_or(ExitStatus::Success);

        let kind = if status.is_success() {
            WorkflowEventKind::PipelineCompleted
        } else {
            WorkflowEventKind::PipelineFailed
        };
        let mut event = WorkflowEvent::new(kind).with_data(serde_json::json!({
            "exit_code": status.code(),
            "completed": self.pipeline.completed,
        }));
        if let Some(stage) = failure.as_ref().and_then(|f| f.stage) {
            event = event.with_stage(stage);
        }
        self.emit(event).await;

        RunOutcome {
            status,
            completed: self.pipeline.completed.clone(),
            failure,
            state,
            usage: report,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{AgentError, AgentEvent};
    use crate::state::MemoryOutputSink;
    use crate::workflow::testing::{
        completed, usage_event, FakeKnowledge, ScriptedAgent, ScriptedFactory,
    };
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    fn coordinator(factory: Arc<ScriptedFactory>, sink: Arc<MemoryOutputSink>) -> Coordinator {
        Coordinator::new(CoordinatorConfig::default(), factory, sink)
    }

    fn options(critique: bool, report: bool, iterative: bool) -> RunOptions {
        RunOptions {
            query: Some("Is the product SOC2 certified?".into()),
            critique,
            final_report: report,
            iterative,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_research_critique_report_run() {
        let factory = Arc::new(ScriptedFactory::happy());
        let sink = Arc::new(MemoryOutputSink::new());
        let mut coord = coordinator(factory.clone(), sink.clone());

        let outcome = coord.run(&options(true, true, false)).await;

        assert_eq!(outcome.status, ExitStatus::Success);
        assert_eq!(
            outcome.completed,
            vec![StageKind::Research, StageKind::Critique, StageKind::FinalReport]
        );
        assert_eq!(factory.research.calls(), 1);
        assert_eq!(factory.critique.calls(), 1);
        assert_eq!(factory.final_report.calls(), 1);

        // Three invocations, three records, grand total is their sum.
        assert_eq!(outcome.usage.detailed_history.len(), 3);
        assert_eq!(outcome.usage.total_usage.total_tokens, 1400 + 1000 + 1400);
        assert_eq!(outcome.usage.by_operation.len(), 3);

        // Critique sees research output, the report sees both.
        assert!(factory.critique.instructions()[0].contains("research findings"));
        let report_input = &factory.final_report.instructions()[0];
        assert!(report_input.contains("research findings"));
        assert!(report_input.contains("critique notes"));

        assert_eq!(
            sink.persisted_stages(),
            vec![StageKind::Research, StageKind::Critique, StageKind::FinalReport]
        );
        let report = sink.artifact(StageKind::FinalReport).unwrap();
        assert!(report
            .usage_summary
            .starts_with("## Token Usage Statistics (not included in cost estimates)"));
        assert_eq!(sink.usage_reports().len(), 1);
    }

    #[tokio::test]
    async fn test_research_only_run() {
        let factory = Arc::new(ScriptedFactory::happy());
        let sink = Arc::new(MemoryOutputSink::new());
        let outcome = coordinator(factory.clone(), sink.clone())
            .run(&options(false, false, false))
            .await;

        assert!(outcome.is_success());
        assert_eq!(outcome.completed, vec![StageKind::Research]);
        assert_eq!(factory.critique.calls(), 0);
        assert_eq!(outcome.output(StageKind::Research), Some("research findings"));
        let artifact = sink.artifact(StageKind::Research).unwrap();
        assert!(artifact.usage_summary.starts_with("## Token Usage Statistics\n"));

        assert_eq!(outcome.usage.detailed_history.len(), 1);
        assert_eq!(
            outcome.usage.detailed_history[0].operation,
            OperationTag::Research
        );
        assert_eq!(outcome.usage.total_usage.requests, 1);
    }

    #[tokio::test]
    async fn test_default_query_used_when_absent() {
        let factory = Arc::new(ScriptedFactory::happy());
        let sink = Arc::new(MemoryOutputSink::new());
        let outcome = coordinator(factory.clone(), sink)
            .run(&RunOptions::default())
            .await;
        assert!(outcome.is_success());
        assert_eq!(outcome.state.query, DEFAULT_QUERY);
        assert_eq!(factory.research.instructions()[0], DEFAULT_QUERY);
        assert_eq!(outcome.completed, vec![StageKind::Research]);
        assert_eq!(outcome.usage.detailed_history.len(), 1);
        assert_eq!(
            outcome.usage.detailed_history[0].operation,
            OperationTag::Research
        );
    }

    #[tokio::test]
    async fn test_research_failure_stops_run() {
        let mut factory = ScriptedFactory::happy();
        factory.research = ScriptedAgent::new("ResearchAgent", "o4-mini-deep-research")
            .with_script(vec![Err(AgentError::Transport("dns failure".into()))]);
        let factory = Arc::new(factory);
        let sink = Arc::new(MemoryOutputSink::new());

        let outcome = coordinator(factory.clone(), sink.clone())
            .run(&options(true, true, false))
            .await;

        assert_eq!(outcome.status, ExitStatus::ResearchFailed);
        assert_eq!(outcome.status.code(), 2);
        assert!(outcome.completed.is_empty());
        assert_eq!(factory.critique.calls(), 0);
        assert_eq!(factory.final_report.calls(), 0);
        assert!(sink.persisted_stages().is_empty());
        // The usage report is written even for failed runs.
        assert_eq!(sink.usage_reports().len(), 1);
    }

    #[tokio::test]
    async fn test_critique_turn_limit_keeps_research() {
        let mut factory = ScriptedFactory::happy();
        factory.critique = ScriptedAgent::new("CritiqueAgent", "o3-pro")
            .with_script(vec![Err(AgentError::TurnLimit { max_turns: 25 })]);
        let factory = Arc::new(factory);
        let sink = Arc::new(MemoryOutputSink::new());

        let outcome = coordinator(factory.clone(), sink.clone())
            .run(&options(true, true, false))
            .await;

        assert_eq!(outcome.status, ExitStatus::CritiqueFailed);
        assert_eq!(outcome.status.code(), 3);
        assert!(matches!(
            outcome.failure.as_ref().map(|f| &f.error),
            Some(PipelineError::TurnLimitExceeded { .. })
        ));
        assert_eq!(outcome.completed, vec![StageKind::Research]);
        assert_eq!(sink.persisted_stages(), vec![StageKind::Research]);
        assert_eq!(factory.final_report.calls(), 0);
    }

    #[tokio::test]
    async fn test_report_failure_exit_code() {
        let mut factory = ScriptedFactory::happy();
        factory.final_report = ScriptedAgent::new("FinalReportAgent", "o4-mini")
            .with_script(vec![Ok(usage_event(10, 10)), Err(AgentError::Vendor("boom".into()))]);
        let outcome = coordinator(Arc::new(factory), Arc::new(MemoryOutputSink::new()))
            .run(&options(false, true, false))
            .await;
        assert_eq!(outcome.status.code(), 4);
        // Partial usage from the failed stage is kept.
        assert_eq!(outcome.usage.detailed_history.len(), 2);
    }

    #[tokio::test]
    async fn test_validation_failure_runs_nothing() {
        let factory = Arc::new(ScriptedFactory::happy());
        let sink = Arc::new(MemoryOutputSink::new());
        let outcome = coordinator(factory.clone(), sink.clone())
            .run(&options(false, false, true))
            .await;

        assert_eq!(outcome.status, ExitStatus::ValidationFailure);
        assert_eq!(outcome.status.code(), 1);
        assert_eq!(factory.research.calls(), 0);
        assert!(sink.persisted_stages().is_empty());
    }

    #[tokio::test]
    async fn test_critique_only_uses_saved_research() {
        let factory = Arc::new(ScriptedFactory::happy());
        let sink = Arc::new(
            MemoryOutputSink::new().with_existing(StageKind::Research, "earlier findings"),
        );
        let opts = RunOptions {
            query: Some("q".into()),
            critique_only: true,
            ..Default::default()
        };

        let outcome = coordinator(factory.clone(), sink.clone()).run(&opts).await;

        assert!(outcome.is_success());
        assert_eq!(factory.research.calls(), 0);
        assert!(factory.critique.instructions()[0].contains("earlier findings"));
        assert!(outcome
            .usage
            .by_operation
            .contains_key(&OperationTag::CritiqueOnly));
        assert_eq!(sink.raw_events()[0].0, OperationTag::CritiqueOnly);
    }

    #[tokio::test]
    async fn test_critique_only_reads_input_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("research.json");
        tokio::fs::write(&path, r#"{"content": "file findings"}"#).await.unwrap();

        let factory = Arc::new(ScriptedFactory::happy());
        let opts = RunOptions {
            query: Some("q".into()),
            critique_only: true,
            input_file: Some(path),
            ..Default::default()
        };
        let outcome = coordinator(factory.clone(), Arc::new(MemoryOutputSink::new()))
            .run(&opts)
            .await;

        assert!(outcome.is_success());
        assert!(factory.critique.instructions()[0].contains("file findings"));
    }

    #[tokio::test]
    async fn test_missing_artifact_fails_before_any_stage() {
        let factory = Arc::new(ScriptedFactory::happy());
        let sink = Arc::new(MemoryOutputSink::new().with_existing(StageKind::Research, "findings"));
        let opts = RunOptions {
            query: Some("q".into()),
            final_report_only: true,
            ..Default::default()
        };

        let outcome = coordinator(factory.clone(), sink).run(&opts).await;

        assert_eq!(outcome.status, ExitStatus::ValidationFailure);
        assert!(matches!(
            outcome.failure.as_ref().map(|f| &f.error),
            Some(PipelineError::MissingInputArtifact {
                stage: StageKind::FinalReport,
                ..
            })
        ));
        assert_eq!(factory.final_report.calls(), 0);
    }

    #[tokio::test]
    async fn test_critique_only_without_research_fails_before_any_stage() {
        let factory = Arc::new(ScriptedFactory::happy());
        let sink = Arc::new(MemoryOutputSink::new());
        let opts = RunOptions {
            query: Some("q".into()),
            critique_only: true,
            ..Default::default()
        };

        let outcome = coordinator(factory.clone(), sink.clone()).run(&opts).await;

        assert_eq!(outcome.status, ExitStatus::ValidationFailure);
        assert!(matches!(
            outcome.failure.as_ref().map(|f| &f.error),
            Some(PipelineError::MissingInputArtifact {
                stage: StageKind::Critique,
                ..
            })
        ));
        assert_eq!(
            outcome.failure.as_ref().and_then(|f| f.stage),
            Some(StageKind::Critique)
        );
        assert_eq!(factory.research.calls(), 0);
        assert_eq!(factory.critique.calls(), 0);
        assert!(outcome.completed.is_empty());
        assert!(outcome.usage.detailed_history.is_empty());
        assert!(sink.persisted_stages().is_empty());
    }

    #[tokio::test]
    async fn test_report_only_uses_saved_research_and_critique() {
        let factory = Arc::new(ScriptedFactory::happy());
        let sink = Arc::new(
            MemoryOutputSink::new()
                .with_existing(StageKind::Research, "saved research")
                .with_existing(StageKind::Critique, "saved critique"),
        );
        let opts = RunOptions {
            query: Some("q".into()),
            final_report_only: true,
            ..Default::default()
        };

        let outcome = coordinator(factory.clone(), sink).run(&opts).await;
        assert!(outcome.is_success());
        assert_eq!(outcome.completed, vec![StageKind::FinalReport]);
        let input = &factory.final_report.instructions()[0];
        assert!(input.contains("saved research") && input.contains("saved critique"));
        assert!(outcome
            .usage
            .by_operation
            .contains_key(&OperationTag::FinalReportOnly));
    }

    #[tokio::test]
    async fn test_iterative_single_critique_invocation() {
        let mut factory = ScriptedFactory::happy();
        factory.critique = ScriptedAgent::new("CritiqueAgent", "o3-pro").with_script(vec![
            Ok(usage_event(100, 50)),
            Ok(AgentEvent::AgentUpdated {
                from: "CritiqueAgent".into(),
                to: "ResearchAgent".into(),
            }),
            Ok(usage_event(200, 80)),
            Ok(completed("improved research")),
        ]);
        let factory = Arc::new(factory);
        let sink = Arc::new(MemoryOutputSink::new());

        let outcome = coordinator(factory.clone(), sink)
            .run(&options(true, false, true))
            .await;

        assert!(outcome.is_success());
        assert_eq!(factory.critique.calls(), 1);
        assert_eq!(factory.handoffs_offered(), vec![true]);
        // The research agent only ran once programmatically; the handoff
        // happened inside the critique invocation.
        assert_eq!(factory.research.calls(), 1);
        assert_eq!(outcome.output(StageKind::Critique), Some("improved research"));
        let critique_counts = outcome.usage.by_operation[&OperationTag::ResearchCritiqueIterative];
        assert_eq!(critique_counts.total_tokens, 430);
        assert_eq!(critique_counts.requests, 2);
    }

    #[tokio::test]
    async fn test_iterative_critique_failure_keeps_research() {
        let mut factory = ScriptedFactory::happy();
        factory.critique = ScriptedAgent::new("CritiqueAgent", "o3-pro").with_script(vec![
            Ok(usage_event(100, 50)),
            Err(AgentError::Vendor("overloaded".into())),
        ]);
        let factory = Arc::new(factory);
        let sink = Arc::new(MemoryOutputSink::new());

        let outcome = coordinator(factory.clone(), sink.clone())
            .run(&options(true, false, true))
            .await;

        assert_eq!(outcome.status, ExitStatus::CritiqueFailed);
        assert_eq!(outcome.status.code(), 3);
        assert_eq!(
            outcome.failure.as_ref().and_then(|f| f.error.operation()),
            Some(OperationTag::ResearchCritiqueIterative)
        );
        assert_eq!(outcome.completed, vec![StageKind::Research]);
        assert_eq!(sink.persisted_stages(), vec![StageKind::Research]);
        assert_eq!(factory.handoffs_offered(), vec![true]);
        assert_eq!(outcome.output(StageKind::Research), Some("research findings"));
        assert_eq!(outcome.output(StageKind::Critique), None);
    }

    #[tokio::test]
    async fn test_non_iterative_critique_has_no_handoff() {
        let factory = Arc::new(ScriptedFactory::happy());
        coordinator(factory.clone(), Arc::new(MemoryOutputSink::new()))
            .run(&options(true, false, false))
            .await;
        assert_eq!(factory.handoffs_offered(), vec![false]);
    }

    #[tokio::test]
    async fn test_knowledge_released_after_critique_failure() {
        let knowledge = Arc::new(FakeKnowledge::default());
        let mut factory = ScriptedFactory::happy().with_knowledge(knowledge.clone());
        factory.critique = ScriptedAgent::new("CritiqueAgent", "o3-pro")
            .with_script(vec![Err(AgentError::Vendor("overloaded".into()))]);

        let outcome = coordinator(Arc::new(factory), Arc::new(MemoryOutputSink::new()))
            .run(&options(true, false, false))
            .await;

        assert_eq!(outcome.status, ExitStatus::CritiqueFailed);
        assert_eq!(knowledge.connects.load(Ordering::SeqCst), 1);
        assert_eq!(knowledge.disconnects.load(Ordering::SeqCst), 1);
        assert!(!knowledge.connected.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_knowledge_connect_failure_is_critique_failure() {
        let knowledge = Arc::new(FakeKnowledge::failing());
        let factory = Arc::new(ScriptedFactory::happy().with_knowledge(knowledge.clone()));

        let outcome = coordinator(factory.clone(), Arc::new(MemoryOutputSink::new()))
            .run(&options(true, false, false))
            .await;

        assert_eq!(outcome.status, ExitStatus::CritiqueFailed);
        assert_eq!(factory.critique.calls(), 0);
        assert_eq!(knowledge.disconnects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_interrupted_stage_records_nothing_and_releases_knowledge() {
        let knowledge = Arc::new(FakeKnowledge::default());
        let mut factory = ScriptedFactory::happy().with_knowledge(knowledge.clone());
        factory.critique = ScriptedAgent::new("CritiqueAgent", "o3-pro")
            .with_script(vec![Ok(usage_event(10, 10))])
            .hanging();
        let sink = Arc::new(MemoryOutputSink::new());
        let mut coord = coordinator(Arc::new(factory), sink.clone());

        let opts = options(true, false, false);
        let interrupted = tokio::time::timeout(Duration::from_millis(100), coord.run(&opts)).await;
        assert!(interrupted.is_err());

        // Only research was recorded; the critique's usage never landed.
        assert_eq!(coord.usage().history().len(), 1);
        assert_eq!(sink.persisted_stages(), vec![StageKind::Research]);

        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(knowledge.disconnects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_lifecycle_events() {
        let (tx, mut rx) = mpsc::channel(256);
        let factory = Arc::new(ScriptedFactory::happy());
        let mut coord =
            coordinator(factory, Arc::new(MemoryOutputSink::new())).with_event_channel(tx);

        coord.run(&options(true, false, false)).await;
        drop(coord);

        let mut kinds = Vec::new();
        while let Some(event) = rx.recv().await {
            if event.kind != WorkflowEventKind::AgentActivity {
                kinds.push(event.kind);
            }
        }
        assert_eq!(
            kinds,
            vec![
                WorkflowEventKind::PipelineStarted,
                WorkflowEventKind::StageStarted,
                WorkflowEventKind::StageCompleted,
                WorkflowEventKind::StageStarted,
                WorkflowEventKind::StageCompleted,
                WorkflowEventKind::PipelineCompleted,
            ]
        );
    }

    #[test]
    fn test_exit_status_mapping() {
        assert_eq!(
            exit_status_for(&PipelineError::MissingInputArtifact {
                stage: StageKind::Critique,
                detail: String::new()
            }),
            ExitStatus::ValidationFailure
        );
        assert_eq!(
            exit_status_for(&PipelineError::AgentExecutionFailed {
                operation: OperationTag::FinalReportOnly,
                cause: String::new()
            }),
            ExitStatus::ReportFailed
        );
        assert_eq!(
            exit_status_for(&PipelineError::Sink(anyhow::anyhow!("disk full"))),
            ExitStatus::Unclassified
        );
    }
}
