//! Builds the pipeline's agents on the Responses API.

use std::sync::Arc;

use super::openai::{HostedTool, OpenAiClient, ResponsesAgent};
use super::prompts;
use super::tools::{AskQuestionTool, VerifyUrlTool};
use super::{AgentCapability, AgentFactory, AgentRole};
use crate::knowledge::KnowledgeService;
use crate::models::StageModels;

pub struct OpenAiAgentFactory {
    client: Arc<OpenAiClient>,
    models: StageModels,
    knowledge: Option<Arc<dyn KnowledgeService>>,
    verify_url: Arc<VerifyUrlTool>,
}

impl OpenAiAgentFactory {
    pub fn new(client: OpenAiClient, models: StageModels) -> Self {
        Self {
            client: Arc::new(client),
            models,
            knowledge: None,
            verify_url: Arc::new(VerifyUrlTool::new()),
        }
    }

    /// Give the critique stage a knowledge service
    pub fn with_knowledge(mut self, service: Arc<dyn KnowledgeService>) -> Self {
        self.knowledge = Some(service);
        self
    }

    pub fn models(&self) -> &StageModels {
        &self.models
    }
}

impl AgentFactory for OpenAiAgentFactory {
    fn research_agent(&self) -> Arc<dyn AgentCapability> {
        Arc::new(
            ResponsesAgent::builder(
                AgentRole::Research.display_name(),
                self.models.research.clone(),
                prompts::RESEARCH,
                self.client.clone(),
            )
            .hosted_tool(HostedTool::WebSearchPreview)
            .hosted_tool(HostedTool::CodeInterpreter)
            .build(),
        )
    }

    fn critique_agent(
        &self,
        handoff: Option<Arc<dyn AgentCapability>>,
        knowledge: Option<Arc<dyn KnowledgeService>>,
    ) -> Arc<dyn AgentCapability> {
        let mut builder = ResponsesAgent::builder(
            AgentRole::Critique.display_name(),
            self.models.critique.clone(),
            prompts::CRITIQUE,
            self.client.clone(),
        )
        .hosted_tool(HostedTool::WebSearchPreview)
        .function_tool(self.verify_url.clone());

        if let Some(service) = knowledge {
            builder = builder.function_tool(Arc::new(AskQuestionTool::new(service)));
        }
        if let Some(target) = handoff {
            builder = builder.handoff(target);
        }
        Arc::new(builder.build())
    }

    fn final_report_agent(&self) -> Arc<dyn AgentCapability> {
        Arc::new(
            ResponsesAgent::builder(
                AgentRole::FinalReport.display_name(),
                self.models.final_report.clone(),
                prompts::FINAL_REPORT,
                self.client.clone(),
            )
            .hosted_tool(HostedTool::WebSearchPreview)
            .build(),
        )
    }

    fn knowledge_service(&self) -> Option<Arc<dyn KnowledgeService>> {
        self.knowledge.clone()
    }
}
