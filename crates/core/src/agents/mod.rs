//! # Agents
//!
//! The capability seam between the orchestrator and a vendor agent runtime.
//! An agent is anything that turns an instruction into a stream of
//! [`AgentEvent`]s ending in a `Completed` item.

pub mod factory;
pub mod openai;
pub mod prompts;
pub mod tools;

use futures::stream::BoxStream;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::knowledge::KnowledgeService;

pub use factory::OpenAiAgentFactory;
pub use openai::{OpenAiClient, ResponsesAgent};

/// One item of an agent's event stream
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// Control moved from one agent to another
    AgentUpdated { from: String, to: String },
    /// Fragment of a reasoning summary
    ReasoningDelta { text: String },
    /// A reasoning block finished
    ReasoningDone { summary: Option<String> },
    /// The agent called a tool
    ToolCall {
        name: String,
        server: Option<String>,
        arguments: Value,
    },
    /// Structured item the orchestrator does not interpret
    Passthrough { kind: String, payload: Value },
    /// Usage of one model round trip
    Usage { usage: Value },
    /// Final output of the invocation
    Completed { output: String },
    /// Keepalive
    Ping,
    /// Anything else the vendor sent
    Other { kind: String, payload: Value },
}

impl AgentEvent {
    /// Short kind label used in raw logs
    pub fn kind(&self) -> &str {
        match self {
            AgentEvent::AgentUpdated { .. } => "agent_updated",
            AgentEvent::ReasoningDelta { .. } => "reasoning_delta",
            AgentEvent::ReasoningDone { .. } => "reasoning_done",
            AgentEvent::ToolCall { .. } => "tool_call",
            AgentEvent::Passthrough { .. } => "passthrough",
            AgentEvent::Usage { .. } => "usage",
            AgentEvent::Completed { .. } => "completed",
            AgentEvent::Ping => "ping",
            AgentEvent::Other { .. } => "other",
        }
    }
}

/// Failures surfaced by an agent stream
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AgentError {
    #[error("turn limit of {max_turns} exceeded")]
    TurnLimit { max_turns: u32 },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("vendor error: {0}")]
    Vendor(String),
    #[error("malformed stream: {0}")]
    Malformed(String),
    #[error("stream cancelled")]
    Cancelled,
}

/// Stream returned by [`AgentCapability::stream_execute`]
pub type AgentStream = BoxStream<'static, Result<AgentEvent, AgentError>>;

/// The three agents of the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentRole {
    Research,
    Critique,
    FinalReport,
}

impl AgentRole {
    /// Display name the agent runs under
    pub fn display_name(&self) -> &'static str {
        match self {
            AgentRole::Research => "ResearchAgent",
            AgentRole::Critique => "CritiqueAgent",
            AgentRole::FinalReport => "FinalReportAgent",
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Per-run context handed to every agent invocation
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunContext {
    pub query: String,
    pub verbose: bool,
}

/// A named agent bound to a model that can stream an invocation
pub trait AgentCapability: Send + Sync {
    fn name(&self) -> &str;

    fn model(&self) -> &str;

    /// Names of agents this one may hand off to
    fn declared_handoff_targets(&self) -> Vec<String> {
        Vec::new()
    }

    /// Start an invocation. At most `max_turns` model round trips may occur,
    /// counting any handed-off agent's turns.
    fn stream_execute(&self, instruction: &str, context: &RunContext, max_turns: u32)
        -> AgentStream;
}

/// Builds the agents of a run
pub trait AgentFactory: Send + Sync {
    fn research_agent(&self) -> Arc<dyn AgentCapability>;

    /// Critique agent, optionally with a handoff route and a knowledge tool
    fn critique_agent(
        &self,
        handoff: Option<Arc<dyn AgentCapability>>,
        knowledge: Option<Arc<dyn KnowledgeService>>,
    ) -> Arc<dyn AgentCapability>;

    fn final_report_agent(&self) -> Arc<dyn AgentCapability>;

    /// Knowledge service made available to the critique stage, if any
    fn knowledge_service(&self) -> Option<Arc<dyn KnowledgeService>> {
        None
    }
}
