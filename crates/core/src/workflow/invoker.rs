//! # Agent Invoker
//!
//! Runs one agent invocation to completion: drives its stream through the
//! normalizer in arrival order, enforces the turn budget, and records the
//! invocation's usage.

use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;

use super::events::WorkflowEvent;
use super::normalizer::{EventNormalizer, ToolCatalog};
use super::state::WorkflowState;
use crate::agents::{AgentCapability, AgentError, AgentEvent};
use crate::error::PipelineError;
use crate::state::OutputSink;
use crate::usage::{OperationTag, UsageAggregator, UsagePayload, UsageRecord};

/// Result of a successful invocation
#[derive(Debug, Clone)]
pub struct StageOutcome {
    /// Final textual output
    pub output: String,
    /// Usage recorded for the invocation
    pub usage: Option<UsageRecord>,
    /// Agent control was handed to, if the agent delegated
    pub handoff: Option<String>,
}

pub struct AgentInvoker {
    event_tx: Option<mpsc::Sender<WorkflowEvent>>,
    sink: Arc<dyn OutputSink>,
    catalog: ToolCatalog,
}

impl AgentInvoker {
    pub fn new(sink: Arc<dyn OutputSink>, catalog: ToolCatalog) -> Self {
        Self {
            event_tx: None,
            sink,
            catalog,
        }
    }

    /// Forward normalized activity to an observer
    pub fn with_event_channel(mut self, tx: mpsc::Sender<WorkflowEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    async fn emit(&self, event: WorkflowEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event).await;
        }
    }

    /// Invoke `agent` with `input` and wait for its final output.
    ///
    /// Every model round trip reports one usage item; more than `max_turns`
    /// of them fails the invocation. Usage observed before a failure is still
    /// recorded. The raw event log is flushed to the sink however the stream
    /// ends.
    #[tracing::instrument(skip_all, fields(operation = %operation, agent = %agent.name()))]
    pub async fn invoke(
        &self,
        usage: &mut UsageAggregator,
        agent: &dyn AgentCapability,
        input: &str,
        state: &WorkflowState,
        operation: OperationTag,
        max_turns: u32,
    ) -> Result<StageOutcome, PipelineError> {
        let mut stream = agent.stream_execute(input, &state.context(), max_turns);
        let mut normalizer = EventNormalizer::new(operation, self.catalog.clone());

        let mut payload: Option<UsagePayload> = None;
        let mut turns: u32 = 0;
        let mut output: Option<String> = None;
        let mut handoff: Option<String> = None;

        let streamed: Result<(), PipelineError> = loop {
            let item = match stream.next().await {
                None => break Ok(()),
                Some(Err(e)) => break Err(agent_failure(operation, e)),
                Some(Ok(item)) => item,
            };

            match &item {
                AgentEvent::Usage { usage: raw } => {
                    turns += 1;
                    payload
                        .get_or_insert_with(UsagePayload::default)
                        .merge(&UsagePayload::from_value(raw));
                }
                AgentEvent::AgentUpdated { to, .. } if handoff.is_none() && to != agent.name() => {
                    handoff = Some(to.clone());
                }
                AgentEvent::Completed { output: text } => output = Some(text.clone()),
                _ => {}
            }

            for event in normalizer.process(&item) {
                self.emit(WorkflowEvent::activity(operation, event)).await;
            }

            if turns > max_turns {
                break Err(PipelineError::TurnLimitExceeded {
                    operation,
                    max_turns,
                });
            }
        };
        drop(stream);

        for event in normalizer.finish() {
            self.emit(WorkflowEvent::activity(operation, event)).await;
        }

        if let Err(e) = self
            .sink
            .persist_raw_events(operation, normalizer.raw_log())
            .await
        {
            tracing::warn!("Failed to save raw events for {}: {:#}", operation, e);
        }

        let record = payload.map(|p| UsageRecord::new(agent.model(), operation, &p));
        if let Some(record) = &record {
            usage.add(record.clone());
        }

        streamed?;
        let output = output.ok_or_else(|| PipelineError::AgentExecutionFailed {
            operation,
            cause: "stream ended without a final output".to_string(),
        })?;

        tracing::info!(
            turns,
            events = normalizer.emitted(),
            handoff = handoff.as_deref().unwrap_or("none"),
            "Invocation completed"
        );
        Ok(StageOutcome {
            output,
            usage: record,
            handoff,
        })
    }
}

fn agent_failure(operation: OperationTag, error: AgentError) -> PipelineError {
    match error {
        AgentError::TurnLimit { max_turns } => PipelineError::TurnLimitExceeded {
            operation,
            max_turns,
        },
        other => PipelineError::AgentExecutionFailed {
            operation,
            cause: other.to_string(),
        },
    }
}
