//! # Event Normalizer
//!
//! Reduces an agent's vendor-specific stream into a small closed set of
//! display events, keeping every raw item for the per-operation event log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::agents::AgentEvent;
use crate::usage::OperationTag;

/// Semantic event forwarded to the display sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NormalizedEvent {
    Handoff { from: String, to: String },
    Reasoning { summary: Option<String> },
    ToolCall { name: String, args: Value },
    WebSearch { query: String },
    McpCall { server: String, question: String },
    Raw { payload: Value },
}

/// Which tool names count as web search or knowledge-service calls
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCatalog {
    #[serde(default = "default_web_search_tools")]
    pub web_search: Vec<String>,
    #[serde(default = "default_knowledge_tools")]
    pub knowledge: Vec<String>,
    /// Server label used when a knowledge call does not name one
    #[serde(default = "default_knowledge_server")]
    pub knowledge_server: String,
}

fn default_web_search_tools() -> Vec<String> {
    vec!["web_search".to_string(), "web_search_preview".to_string()]
}

fn default_knowledge_tools() -> Vec<String> {
    vec![
        "ask_question".to_string(),
        "read_wiki_structure".to_string(),
        "read_wiki_contents".to_string(),
    ]
}

fn default_knowledge_server() -> String {
    "DeepWiki".to_string()
}

impl Default for ToolCatalog {
    fn default() -> Self {
        Self {
            web_search: default_web_search_tools(),
            knowledge: default_knowledge_tools(),
            knowledge_server: default_knowledge_server(),
        }
    }
}

impl ToolCatalog {
    pub fn is_web_search(&self, name: &str) -> bool {
        self.web_search.iter().any(|t| t == name)
    }

    pub fn is_knowledge(&self, name: &str) -> bool {
        self.knowledge.iter().any(|t| t == name)
    }
}

/// One line of the durable per-operation event log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawLogEntry {
    pub operation: OperationTag,
    pub received_at: DateTime<Utc>,
    pub kind: String,
    pub payload: Value,
}

/// Classify a single non-reasoning item.
///
/// Pure and total: `None` means the item is dropped from display.
pub fn classify(item: &AgentEvent, catalog: &ToolCatalog) -> Option<NormalizedEvent> {
    match item {
        AgentEvent::AgentUpdated { from, to } => Some(NormalizedEvent::Handoff {
            from: from.clone(),
            to: to.clone(),
        }),
        AgentEvent::ToolCall {
            name,
            server,
            arguments,
        } => {
            if catalog.is_web_search(name) {
                Some(NormalizedEvent::WebSearch {
                    query: string_arg(arguments, "query"),
                })
            } else if server.is_some() || catalog.is_knowledge(name) {
                Some(NormalizedEvent::McpCall {
                    server: server
                        .clone()
                        .unwrap_or_else(|| catalog.knowledge_server.clone()),
                    question: string_arg(arguments, "question"),
                })
            } else {
                Some(NormalizedEvent::ToolCall {
                    name: name.clone(),
                    args: arguments.clone(),
                })
            }
        }
        AgentEvent::Passthrough { payload, .. } => Some(NormalizedEvent::Raw {
            payload: payload.clone(),
        }),
        AgentEvent::ReasoningDelta { .. }
        | AgentEvent::ReasoningDone { .. }
        | AgentEvent::Usage { .. }
        | AgentEvent::Completed { .. }
        | AgentEvent::Ping
        | AgentEvent::Other { .. } => None,
    }
}

/// Argument by key, tolerating arguments delivered as a JSON string
fn string_arg(arguments: &Value, key: &str) -> String {
    let parsed;
    let args = match arguments {
        Value::String(s) => {
            parsed = serde_json::from_str::<Value>(s).unwrap_or(Value::Null);
            &parsed
        }
        other => other,
    };
    match args.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// Stateful normalizer for one invocation's stream
#[derive(Debug)]
pub struct EventNormalizer {
    operation: OperationTag,
    catalog: ToolCatalog,
    pending_reasoning: Option<String>,
    raw_log: Vec<RawLogEntry>,
    emitted: usize,
}

impl EventNormalizer {
    pub fn new(operation: OperationTag, catalog: ToolCatalog) -> Self {
        Self {
            operation,
            catalog,
            pending_reasoning: None,
            raw_log: Vec::new(),
            emitted: 0,
        }
    }

    /// Feed the next stream item, returning the events to display in order.
    ///
    /// Consecutive reasoning deltas collapse into a single `Reasoning` event,
    /// released when the reasoning block ends or the next displayable item
    /// arrives.
    pub fn process(&mut self, item: &AgentEvent) -> Vec<NormalizedEvent> {
        self.raw_log.push(RawLogEntry {
            operation: self.operation,
            received_at: Utc::now(),
            kind: item.kind().to_string(),
            payload: serde_json::to_value(item).unwrap_or(Value::Null),
        });

        let mut out = Vec::new();
        match item {
            AgentEvent::ReasoningDelta { text } => {
                self.pending_reasoning
                    .get_or_insert_with(String::new)
                    .push_str(text);
            }
            AgentEvent::ReasoningDone { summary } => {
                let accumulated = self.pending_reasoning.take();
                let summary = summary
                    .clone()
                    .filter(|s| !s.trim().is_empty())
                    .or(accumulated.filter(|s| !s.trim().is_empty()));
                out.push(NormalizedEvent::Reasoning { summary });
            }
            other => {
                if let Some(event) = classify(other, &self.catalog) {
                    out.extend(self.flush_reasoning());
                    out.push(event);
                }
            }
        }

        self.emitted += out.len();
        out
    }

    /// Release any reasoning still being accumulated at stream end
    pub fn finish(&mut self) -> Vec<NormalizedEvent> {
        let out: Vec<_> = self.flush_reasoning().into_iter().collect();
        self.emitted += out.len();
        out
    }

    fn flush_reasoning(&mut self) -> Option<NormalizedEvent> {
        self.pending_reasoning
            .take()
            .map(|text| NormalizedEvent::Reasoning {
                summary: Some(text).filter(|s| !s.trim().is_empty()),
            })
    }

    /// Number of events released to display so far
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    pub fn raw_log(&self) -> &[RawLogEntry] {
        &self.raw_log
    }
}
