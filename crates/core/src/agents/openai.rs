//! # Responses API Agent
//!
//! An [`AgentCapability`] backed by the OpenAI Responses API in streaming
//! mode. Each turn is one `POST /responses`; function calls are executed
//! locally and fed back through `previous_response_id` until the model
//! answers without calling a tool. A call to a `transfer_to_*` tool hands
//! the rest of the invocation to the target agent.

use anyhow::Context;
use futures::StreamExt;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use super::prompts;
use super::tools::FunctionTool;
use super::{AgentCapability, AgentError, AgentEvent, AgentStream, RunContext};
use crate::models::ModelConfig;
use crate::sse::{SseDecoder, SseFrame};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Thin HTTP client for the Responses endpoint
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OpenAiClient {
    pub fn new(api_key: impl Into<String>, base_url: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key: api_key.into(),
        }
    }

    /// Client from `OPENAI_API_KEY` and optional `OPENAI_BASE_URL`
    pub fn from_env() -> anyhow::Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").context("OPENAI_API_KEY is not set")?;
        let base_url = std::env::var("OPENAI_BASE_URL").ok().filter(|u| !u.is_empty());
        Ok(Self::new(api_key, base_url))
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Start a streaming response
    async fn create_stream(&self, body: &Value) -> Result<reqwest::Response, AgentError> {
        let url = format!("{}/responses", self.base_url.trim_end_matches('/'));
        let resp = self
            .http
            .post(url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| AgentError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(AgentError::Vendor(format!("{}: {}", status, text)));
        }
        Ok(resp)
    }
}

/// Tools the vendor runs on its side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostedTool {
    WebSearchPreview,
    CodeInterpreter,
}

impl HostedTool {
    fn definition(self) -> Value {
        match self {
            HostedTool::WebSearchPreview => json!({"type": "web_search_preview"}),
            HostedTool::CodeInterpreter => json!({
                "type": "code_interpreter",
                "container": {"type": "auto"}
            }),
        }
    }
}

struct AgentSpec {
    name: String,
    config: ModelConfig,
    instructions: String,
    hosted: Vec<HostedTool>,
    functions: Vec<Arc<dyn FunctionTool>>,
    handoffs: Vec<Arc<dyn AgentCapability>>,
    client: Arc<OpenAiClient>,
}

impl AgentSpec {
    fn tool_definitions(&self) -> Vec<Value> {
        let mut tools: Vec<Value> = self.hosted.iter().map(|t| t.definition()).collect();
        tools.extend(self.functions.iter().map(|f| f.definition()));
        tools.extend(self.handoffs.iter().map(|h| handoff_definition(h.name())));
        tools
    }

    fn request_body(&self, input: Value, previous_response_id: Option<&str>) -> Value {
        let mut body = json!({
            "model": self.config.model,
            "instructions": self.instructions,
            "input": input,
            "tools": self.tool_definitions(),
            "stream": true,
            "store": true,
        });
        if let Some(id) = previous_response_id {
            body["previous_response_id"] = json!(id);
        }
        if self.config.reasoning_summary {
            body["reasoning"] = json!({"summary": "auto"});
        }
        body
    }

    fn handoff_target(&self, tool_name: &str) -> Option<&Arc<dyn AgentCapability>> {
        self.handoffs
            .iter()
            .find(|h| handoff_tool_name(h.name()) == tool_name)
    }

    fn function(&self, name: &str) -> Option<&Arc<dyn FunctionTool>> {
        self.functions.iter().find(|f| f.name() == name)
    }

    fn translator(&self) -> FrameTranslator {
        FrameTranslator::new(
            self.handoffs.iter().map(|h| handoff_tool_name(h.name())).collect(),
            self.functions
                .iter()
                .filter_map(|f| f.server().map(|s| (f.name().to_string(), s.to_string())))
                .collect(),
        )
    }
}

/// `ResearchAgent` -> `transfer_to_research_agent`
pub fn handoff_tool_name(agent_name: &str) -> String {
    let mut snake = String::with_capacity(agent_name.len() + 4);
    for (i, ch) in agent_name.chars().enumerate() {
        if ch.is_uppercase() {
            if i > 0 {
                snake.push('_');
            }
            snake.extend(ch.to_lowercase());
        } else if ch.is_alphanumeric() {
            snake.push(ch);
        } else {
            snake.push('_');
        }
    }
    format!("transfer_to_{}", snake)
}

fn handoff_definition(agent_name: &str) -> Value {
    json!({
        "type": "function",
        "name": handoff_tool_name(agent_name),
        "description": format!("Handoff to the {} agent to handle the request.", agent_name),
        "parameters": {
            "type": "object",
            "properties": {
                "guidance": {
                    "type": "string",
                    "description": "What the receiving agent should focus on"
                }
            },
            "required": ["guidance"],
            "additionalProperties": false
        },
        "strict": true,
    })
}

/// Agent running on the Responses API
#[derive(Clone)]
pub struct ResponsesAgent {
    inner: Arc<AgentSpec>,
}

pub struct ResponsesAgentBuilder {
    spec: AgentSpec,
}

impl ResponsesAgentBuilder {
    pub fn hosted_tool(mut self, tool: HostedTool) -> Self {
        self.spec.hosted.push(tool);
        self
    }

    pub fn function_tool(mut self, tool: Arc<dyn FunctionTool>) -> Self {
        self.spec.functions.push(tool);
        self
    }

    pub fn handoff(mut self, target: Arc<dyn AgentCapability>) -> Self {
        self.spec.handoffs.push(target);
        self
    }

    pub fn build(self) -> ResponsesAgent {
        ResponsesAgent {
            inner: Arc::new(self.spec),
        }
    }
}

impl ResponsesAgent {
    pub fn builder(
        name: impl Into<String>,
        config: ModelConfig,
        instructions: impl Into<String>,
        client: Arc<OpenAiClient>,
    ) -> ResponsesAgentBuilder {
        ResponsesAgentBuilder {
            spec: AgentSpec {
                name: name.into(),
                config,
                instructions: instructions.into(),
                hosted: Vec::new(),
                functions: Vec::new(),
                handoffs: Vec::new(),
                client,
            },
        }
    }

    /// Request body of a turn, exposed for inspection
    pub fn request_body(&self, input: Value, previous_response_id: Option<&str>) -> Value {
        self.inner.request_body(input, previous_response_id)
    }
}

impl AgentCapability for ResponsesAgent {
    fn name(&self) -> &str {
        &self.inner.name
    }

    fn model(&self) -> &str {
        &self.inner.config.model
    }

    fn declared_handoff_targets(&self) -> Vec<String> {
        self.inner
            .handoffs
            .iter()
            .map(|h| h.name().to_string())
            .collect()
    }

    fn stream_execute(
        &self,
        instruction: &str,
        context: &RunContext,
        max_turns: u32,
    ) -> AgentStream {
        let (tx, rx) = mpsc::channel(64);
        let spec = self.inner.clone();
        let instruction = instruction.to_string();
        let context = context.clone();

        tokio::spawn(async move {
            match run_turns(&spec, &instruction, &context, max_turns, &tx).await {
                Ok(()) | Err(AgentError::Cancelled) => {}
                Err(e) => {
                    tracing::debug!(agent = %spec.name, "Agent run failed: {}", e);
                    let _ = tx.send(Err(e)).await;
                }
            }
        });

        ReceiverStream::new(rx).boxed()
    }
}

type EventSender = mpsc::Sender<Result<AgentEvent, AgentError>>;

async fn send(tx: &EventSender, event: AgentEvent) -> Result<(), AgentError> {
    tx.send(Ok(event)).await.map_err(|_| AgentError::Cancelled)
}

async fn run_turns(
    spec: &AgentSpec,
    instruction: &str,
    context: &RunContext,
    max_turns: u32,
    tx: &EventSender,
) -> Result<(), AgentError> {
    let mut input = json!([{"role": "user", "content": instruction}]);
    let mut previous: Option<String> = None;

    for turn in 1..=max_turns {
        let body = spec.request_body(input, previous.as_deref());
        let outcome = stream_turn(spec, &body, tx).await?;

        if let Some(call) = outcome
            .calls
            .iter()
            .find(|c| spec.handoff_target(&c.name).is_some())
        {
            let Some(target) = spec.handoff_target(&call.name) else {
                return Err(AgentError::Malformed(format!("unknown handoff {}", call.name)));
            };
            send(
                tx,
                AgentEvent::AgentUpdated {
                    from: spec.name.clone(),
                    to: target.name().to_string(),
                },
            )
            .await?;

            let remaining = max_turns - turn;
            if remaining == 0 {
                return Err(AgentError::TurnLimit { max_turns });
            }
            let guidance = call.arguments.get("guidance").and_then(|g| g.as_str());
            let message = prompts::handoff_message(instruction, &outcome.text, guidance);
            tracing::info!(from = %spec.name, to = %target.name(), "Agent handoff");

            let mut delegated = target.stream_execute(&message, context, remaining);
            while let Some(item) = delegated.next().await {
                match item {
                    Ok(event) => send(tx, event).await?,
                    Err(AgentError::TurnLimit { .. }) => {
                        return Err(AgentError::TurnLimit { max_turns })
                    }
                    Err(e) => return Err(e),
                }
            }
            return Ok(());
        }

        if outcome.calls.is_empty() {
            return send(tx, AgentEvent::Completed { output: outcome.text }).await;
        }

        let response_id = outcome.response_id.ok_or_else(|| {
            AgentError::Malformed("tool calls in a response without an id".into())
        })?;
        let mut outputs = Vec::with_capacity(outcome.calls.len());
        for call in &outcome.calls {
            let output = match spec.function(&call.name) {
                Some(tool) => tool.call(call.arguments.clone()).await,
                None => json!({"error": format!("unknown tool '{}'", call.name)}),
            };
            outputs.push(json!({
                "type": "function_call_output",
                "call_id": call.call_id,
                "output": output.to_string(),
            }));
        }
        input = Value::Array(outputs);
        previous = Some(response_id);
    }

    Err(AgentError::TurnLimit { max_turns })
}

async fn stream_turn(
    spec: &AgentSpec,
    body: &Value,
    tx: &EventSender,
) -> Result<TurnOutcome, AgentError> {
    let resp = spec.client.create_stream(body).await?;
    let mut bytes = resp.bytes_stream();
    let mut decoder = SseDecoder::new();
    let mut translator = spec.translator();

    while let Some(chunk) = bytes.next().await {
        let chunk = chunk.map_err(|e| AgentError::Transport(e.to_string()))?;
        for frame in decoder.push(&chunk) {
            for event in translator.apply(frame)? {
                send(tx, event).await?;
            }
        }
    }
    for frame in decoder.finish() {
        for event in translator.apply(frame)? {
            send(tx, event).await?;
        }
    }

    translator.finish()
}

/// A function call requested by the model
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCall {
    pub call_id: String,
    pub name: String,
    pub arguments: Value,
}

/// What one turn produced
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    pub response_id: Option<String>,
    pub text: String,
    pub calls: Vec<FunctionCall>,
}

/// Translates Responses API stream frames into agent events
#[derive(Debug)]
pub struct FrameTranslator {
    handoff_tools: Vec<String>,
    tool_servers: HashMap<String, String>,
    response_id: Option<String>,
    text: Vec<String>,
    calls: Vec<FunctionCall>,
    completed: bool,
}

impl FrameTranslator {
    pub fn new(handoff_tools: Vec<String>, tool_servers: HashMap<String, String>) -> Self {
        Self {
            handoff_tools,
            tool_servers,
            response_id: None,
            text: Vec::new(),
            calls: Vec::new(),
            completed: false,
        }
    }

    pub fn apply(&mut self, frame: SseFrame) -> Result<Vec<AgentEvent>, AgentError> {
        let (event_name, data) = match frame {
            SseFrame::Comment(_) => return Ok(vec![AgentEvent::Ping]),
            SseFrame::Event { event, data } => (event, data),
        };
        if data.trim() == "[DONE]" {
            return Ok(Vec::new());
        }

        let payload: Value = serde_json::from_str(&data)
            .map_err(|e| AgentError::Malformed(format!("invalid event payload: {}", e)))?;
        let kind = payload
            .get("type")
            .and_then(|t| t.as_str())
            .map(str::to_string)
            .or(event_name)
            .unwrap_or_default();

        let event = match kind.as_str() {
            "response.created" | "response.in_progress" => {
                if let Some(id) = payload.pointer("/response/id").and_then(|v| v.as_str()) {
                    self.response_id = Some(id.to_string());
                }
                AgentEvent::Other { kind, payload }
            }
            "response.reasoning_summary_text.delta" => AgentEvent::ReasoningDelta {
                text: str_field(&payload, "delta"),
            },
            "response.output_item.done" => {
                let item = payload.get("item").cloned().unwrap_or(Value::Null);
                match self.output_item(item) {
                    Some(event) => event,
                    None => return Ok(Vec::new()),
                }
            }
            "response.completed" => {
                let response = payload.get("response").cloned().unwrap_or(Value::Null);
                if let Some(id) = response.get("id").and_then(|v| v.as_str()) {
                    self.response_id = Some(id.to_string());
                }
                if self.text.is_empty() {
                    if let Some(items) = response.get("output").and_then(|o| o.as_array()) {
                        self.text.extend(items.iter().filter_map(message_text));
                    }
                }
                self.completed = true;
                AgentEvent::Usage {
                    usage: response.get("usage").cloned().unwrap_or(Value::Null),
                }
            }
            "response.failed" => {
                let message = payload
                    .pointer("/response/error/message")
                    .and_then(|m| m.as_str())
                    .unwrap_or("response failed");
                return Err(AgentError::Vendor(message.to_string()));
            }
            "response.incomplete" => {
                let reason = payload
                    .pointer("/response/incomplete_details/reason")
                    .and_then(|m| m.as_str())
                    .unwrap_or("unknown");
                return Err(AgentError::Vendor(format!("response incomplete: {}", reason)));
            }
            "error" => {
                let message = payload
                    .get("message")
                    .or_else(|| payload.pointer("/error/message"))
                    .and_then(|m| m.as_str())
                    .unwrap_or("stream error");
                return Err(AgentError::Vendor(message.to_string()));
            }
            _ => AgentEvent::Other { kind, payload },
        };
        Ok(vec![event])
    }

    fn output_item(&mut self, item: Value) -> Option<AgentEvent> {
        let item_type = item.get("type").and_then(|t| t.as_str()).unwrap_or_default();
        match item_type {
            "reasoning" => {
                let summary = item
                    .get("summary")
                    .and_then(|s| s.as_array())
                    .map(|parts| {
                        parts
                            .iter()
                            .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
                            .collect::<Vec<_>>()
                            .join("\n\n")
                    })
                    .filter(|s| !s.trim().is_empty());
                Some(AgentEvent::ReasoningDone { summary })
            }
            "web_search_call" => {
                let query = item
                    .pointer("/action/query")
                    .cloned()
                    .unwrap_or(Value::String(String::new()));
                Some(AgentEvent::ToolCall {
                    name: "web_search".to_string(),
                    server: None,
                    arguments: json!({ "query": query }),
                })
            }
            "function_call" => {
                let name = str_field(&item, "name");
                let arguments = parse_arguments(item.get("arguments"));
                self.calls.push(FunctionCall {
                    call_id: str_field(&item, "call_id"),
                    name: name.clone(),
                    arguments: arguments.clone(),
                });
                if self.handoff_tools.contains(&name) {
                    return None;
                }
                Some(AgentEvent::ToolCall {
                    server: self.tool_servers.get(&name).cloned(),
                    name,
                    arguments,
                })
            }
            "mcp_call" => Some(AgentEvent::ToolCall {
                name: str_field(&item, "name"),
                server: item
                    .get("server_label")
                    .and_then(|s| s.as_str())
                    .map(str::to_string),
                arguments: parse_arguments(item.get("arguments")),
            }),
            "code_interpreter_call" => Some(AgentEvent::Passthrough {
                kind: item_type.to_string(),
                payload: item,
            }),
            "message" => {
                self.text.extend(message_text(&item));
                Some(AgentEvent::Other {
                    kind: "message".to_string(),
                    payload: item,
                })
            }
            other => Some(AgentEvent::Other {
                kind: other.to_string(),
                payload: item,
            }),
        }
    }

    /// Close the turn; a stream without `response.completed` is malformed
    pub fn finish(self) -> Result<TurnOutcome, AgentError> {
        if !self.completed {
            return Err(AgentError::Malformed(
                "stream ended before response.completed".into(),
            ));
        }
        Ok(TurnOutcome {
            response_id: self.response_id,
            text: self.text.join("\n\n"),
            calls: self.calls,
        })
    }
}

fn str_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

/// Function arguments arrive as a JSON-encoded string
fn parse_arguments(raw: Option<&Value>) -> Value {
    match raw {
        Some(Value::String(s)) => {
            serde_json::from_str(s).unwrap_or_else(|_| Value::String(s.clone()))
        }
        Some(other) => other.clone(),
        None => json!({}),
    }
}

fn message_text(item: &Value) -> Option<String> {
    if item.get("type").and_then(|t| t.as_str()) != Some("message") {
        return None;
    }
    let text: Vec<&str> = item
        .get("content")?
        .as_array()?
        .iter()
        .filter(|c| c.get("type").and_then(|t| t.as_str()) == Some("output_text"))
        .filter_map(|c| c.get("text").and_then(|t| t.as_str()))
        .collect();
    (!text.is_empty()).then(|| text.join(""))
}
