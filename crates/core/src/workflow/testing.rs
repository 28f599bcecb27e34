//! Scripted agents and services for exercising the workflow without a vendor.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::agents::{
    AgentCapability, AgentError, AgentEvent, AgentFactory, AgentStream, RunContext,
};
use crate::knowledge::{KnowledgeError, KnowledgeService};

pub fn completed(text: &str) -> AgentEvent {
    AgentEvent::Completed {
        output: text.to_string(),
    }
}

pub fn delta(text: &str) -> AgentEvent {
    AgentEvent::ReasoningDelta {
        text: text.to_string(),
    }
}

pub fn usage_event(input: u64, output: u64) -> AgentEvent {
    AgentEvent::Usage {
        usage: json!({
            "input_tokens": input,
            "output_tokens": output,
            "total_tokens": input + output,
        }),
    }
}

/// Agent that replays a fixed script
#[derive(Clone)]
pub struct ScriptedAgent {
    name: String,
    model: String,
    script: Vec<Result<AgentEvent, AgentError>>,
    handoffs: Vec<String>,
    hang: bool,
    calls: Arc<AtomicUsize>,
    instructions: Arc<Mutex<Vec<String>>>,
}

impl ScriptedAgent {
    pub fn new(name: &str, model: &str) -> Self {
        Self {
            name: name.to_string(),
            model: model.to_string(),
            script: Vec::new(),
            handoffs: Vec::new(),
            hang: false,
            calls: Arc::new(AtomicUsize::new(0)),
            instructions: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_script(mut self, script: Vec<Result<AgentEvent, AgentError>>) -> Self {
        self.script = script;
        self
    }

    /// Shorthand for a single successful turn
    pub fn answering(name: &str, model: &str, output: &str, input: u64, out: u64) -> Self {
        Self::new(name, model)
            .with_script(vec![Ok(usage_event(input, out)), Ok(completed(output))])
    }

    pub fn with_handoff(mut self, target: &str) -> Self {
        self.handoffs.push(target.to_string());
        self
    }

    /// Never end the stream after the script runs out
    pub fn hanging(mut self) -> Self {
        self.hang = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn instructions(&self) -> Vec<String> {
        self.instructions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl AgentCapability for ScriptedAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn declared_handoff_targets(&self) -> Vec<String> {
        self.handoffs.clone()
    }

    fn stream_execute(
        &self,
        instruction: &str,
        _context: &RunContext,
        _max_turns: u32,
    ) -> AgentStream {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.instructions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(instruction.to_string());

        let items = stream::iter(self.script.clone());
        if self.hang {
            items.chain(stream::pending()).boxed()
        } else {
            items.boxed()
        }
    }
}

/// Knowledge service that counts connections
#[derive(Default)]
pub struct FakeKnowledge {
    pub fail_connect: bool,
    pub connected: AtomicBool,
    pub connects: AtomicUsize,
    pub disconnects: AtomicUsize,
}

impl FakeKnowledge {
    pub fn failing() -> Self {
        Self {
            fail_connect: true,
            ..Default::default()
        }
    }
}

#[async_trait]
impl KnowledgeService for FakeKnowledge {
    fn name(&self) -> &str {
        "DeepWiki"
    }

    async fn connect(&self) -> Result<(), KnowledgeError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.fail_connect {
            return Err(KnowledgeError::Transport("connection refused".into()));
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn ask_question(&self, repo: &str, _question: &str) -> Result<String, KnowledgeError> {
        Ok(format!("{} is well documented", repo))
    }

    async fn disconnect(&self) -> Result<(), KnowledgeError> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Factory handing out scripted agents
pub struct ScriptedFactory {
    pub research: ScriptedAgent,
    pub critique: ScriptedAgent,
    pub final_report: ScriptedAgent,
    pub knowledge: Option<Arc<FakeKnowledge>>,
    /// Whether each critique agent built was given a handoff route
    pub critique_handoffs: Mutex<Vec<bool>>,
}

impl ScriptedFactory {
    pub fn new(
        research: ScriptedAgent,
        critique: ScriptedAgent,
        final_report: ScriptedAgent,
    ) -> Self {
        Self {
            research,
            critique,
            final_report,
            knowledge: None,
            critique_handoffs: Mutex::new(Vec::new()),
        }
    }

    /// Agents that each answer in one turn
    pub fn happy() -> Self {
        Self::new(
            ScriptedAgent::answering(
                "ResearchAgent",
                "o4-mini-deep-research",
                "research findings",
                1000,
                400,
            ),
            ScriptedAgent::answering("CritiqueAgent", "o3-pro", "critique notes", 700, 300),
            ScriptedAgent::answering("FinalReportAgent", "o4-mini", "# Report", 500, 900),
        )
    }

    pub fn with_knowledge(mut self, knowledge: Arc<FakeKnowledge>) -> Self {
        self.knowledge = Some(knowledge);
        self
    }

    pub fn handoffs_offered(&self) -> Vec<bool> {
        self.critique_handoffs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl AgentFactory for ScriptedFactory {
    fn research_agent(&self) -> Arc<dyn AgentCapability> {
        Arc::new(self.research.clone())
    }

    fn critique_agent(
        &self,
        handoff: Option<Arc<dyn AgentCapability>>,
        _knowledge: Option<Arc<dyn KnowledgeService>>,
    ) -> Arc<dyn AgentCapability> {
        self.critique_handoffs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(handoff.is_some());
        let mut agent = self.critique.clone();
        if let Some(target) = handoff {
            agent = agent.with_handoff(target.name());
        }
        Arc::new(agent)
    }

    fn final_report_agent(&self) -> Arc<dyn AgentCapability> {
        Arc::new(self.final_report.clone())
    }

    fn knowledge_service(&self) -> Option<Arc<dyn KnowledgeService>> {
        self.knowledge
            .clone()
            .map(|k| k as Arc<dyn KnowledgeService>)
    }
}
