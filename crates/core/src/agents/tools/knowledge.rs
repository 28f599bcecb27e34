//! Function tool fronting the knowledge service.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::{parse_args, FunctionTool};
use crate::knowledge::KnowledgeService;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AskQuestionArgs {
    repo_name: String,
    question: String,
}

/// `ask_question` against a connected knowledge service
pub struct AskQuestionTool {
    service: Arc<dyn KnowledgeService>,
}

impl AskQuestionTool {
    pub fn new(service: Arc<dyn KnowledgeService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl FunctionTool for AskQuestionTool {
    fn name(&self) -> &str {
        "ask_question"
    }

    fn description(&self) -> &str {
        "Ask any question about a GitHub repository (owner/repo) and get an answer \
         grounded in its documentation and code."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "repoName": {
                    "type": "string",
                    "description": "GitHub repository: owner/repo (e.g. \"facebook/react\")"
                },
                "question": {
                    "type": "string",
                    "description": "The question to ask about the repository"
                }
            },
            "required": ["repoName", "question"],
            "additionalProperties": false
        })
    }

    fn server(&self) -> Option<&str> {
        Some(self.service.name())
    }

    async fn call(&self, arguments: Value) -> Value {
        let args = match parse_args::<AskQuestionArgs>(arguments) {
            Ok(args) => args,
            Err(e) => return json!({ "error": e }),
        };
        match self.service.ask_question(&args.repo_name, &args.question).await {
            Ok(answer) => json!({ "answer": answer }),
            Err(e) => {
                tracing::warn!(repo = %args.repo_name, "Knowledge query failed: {}", e);
                json!({ "error": e.to_string() })
            }
        }
    }
}
