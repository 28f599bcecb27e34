//! Terminal rendering of workflow events.

use tokio::sync::mpsc;
use veritas_core::workflow::{NormalizedEvent, StageKind, WorkflowEvent, WorkflowEventKind};

const ARG_PREVIEW: usize = 120;

fn banner(stage: StageKind) -> &'static str {
    match stage {
        StageKind::Research => "🔍 Beginning research...",
        StageKind::Critique => "📝 Critiquing research...",
        StageKind::FinalReport => "📊 Generating comprehensive final report...",
    }
}

fn preview(value: &serde_json::Value) -> String {
    let text = match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    if text.chars().count() > ARG_PREVIEW {
        let cut: String = text.chars().take(ARG_PREVIEW).collect();
        format!("{}...", cut)
    } else {
        text
    }
}

/// Display line for an activity event
pub fn render_activity(event: &NormalizedEvent) -> String {
    match event {
        NormalizedEvent::Handoff { to, .. } => format!("🔄 Handoff to: {}", to),
        NormalizedEvent::Reasoning { summary: Some(text) } => {
            format!("💭 [REASONING SUMMARY]\n{}", text)
        }
        NormalizedEvent::Reasoning { summary: None } => "💭 [REASONING]".to_string(),
        NormalizedEvent::WebSearch { query } => format!("🔍 [Web Search] {}", query),
        NormalizedEvent::McpCall { server, question } => {
            format!("📚 [MCP] {}: '{}'", server, question)
        }
        NormalizedEvent::ToolCall { name, args } => {
            format!("🔧 [Tool] {}({})", name, preview(args))
        }
        NormalizedEvent::Raw { payload } => {
            let code = payload.get("code").unwrap_or(payload);
            format!("🐍 [Code] {}", preview(code))
        }
    }
}

/// Print events until the channel closes
pub async fn print_events(mut rx: mpsc::Receiver<WorkflowEvent>, verbose: bool) {
    while let Some(event) = rx.recv().await {
        match event.kind {
            WorkflowEventKind::StageStarted => {
                if let Some(stage) = event.stage {
                    println!("\n{}", banner(stage));
                }
            }
            WorkflowEventKind::StageCompleted => {
                if let Some(stage) = event.stage {
                    println!("✅ {} complete", stage);
                }
            }
            WorkflowEventKind::StageFailed => {
                let error = event
                    .data
                    .as_ref()
                    .and_then(|d| d.get("error"))
                    .and_then(|e| e.as_str())
                    .unwrap_or("unknown error");
                let stage = event.stage.map(|s| s.as_str()).unwrap_or("stage");
                eprintln!("❌ {} failed: {}", stage, error);
            }
            WorkflowEventKind::AgentActivity if verbose => {
                if let Some(activity) = &event.activity {
                    println!("{}", render_activity(activity));
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_activity() {
        let handoff = NormalizedEvent::Handoff {
            from: "CritiqueAgent".into(),
            to: "ResearchAgent".into(),
        };
        assert_eq!(render_activity(&handoff), "🔄 Handoff to: ResearchAgent");

        let mcp = NormalizedEvent::McpCall {
            server: "DeepWiki".into(),
            question: "Does it log PHI?".into(),
        };
        assert_eq!(render_activity(&mcp), "📚 [MCP] DeepWiki: 'Does it log PHI?'");

        let code = NormalizedEvent::Raw {
            payload: json!({ "type": "code_interpreter_call", "code": "print(1 + 1)" }),
        };
        assert_eq!(render_activity(&code), "🐍 [Code] print(1 + 1)");
    }

    #[test]
    fn test_long_args_truncated() {
        let call = NormalizedEvent::ToolCall {
            name: "verify_url".into(),
            args: json!({ "url": "x".repeat(300) }),
        };
        let line = render_activity(&call);
        assert!(line.ends_with("...)"));
        assert!(line.len() < 200);
    }
}
