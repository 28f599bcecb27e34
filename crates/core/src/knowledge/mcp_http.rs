//! MCP client over streamable HTTP.
//!
//! Each JSON-RPC message is POSTed to the server URL. Replies arrive either
//! as a JSON body or as an SSE stream carrying the response message. The
//! server-issued `Mcp-Session-Id` is echoed on every later request.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::protocol::{
    InitializeResult, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, McpToolResult,
    PROTOCOL_VERSION,
};
use super::{KnowledgeConfig, KnowledgeError, KnowledgeService};
use crate::sse::{SseDecoder, SseFrame};

const SESSION_HEADER: &str = "Mcp-Session-Id";

#[derive(Debug, Clone)]
struct McpSession {
    id: Option<String>,
}

/// Knowledge service backed by a remote MCP server
pub struct McpHttpClient {
    config: KnowledgeConfig,
    http: reqwest::Client,
    session: RwLock<Option<McpSession>>,
    next_id: AtomicU64,
}

impl McpHttpClient {
    pub fn new(config: KnowledgeConfig) -> Result<Self, KnowledgeError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            config,
            http,
            session: RwLock::new(None),
            next_id: AtomicU64::new(1),
        })
    }

    fn post(&self, session_id: Option<&str>) -> reqwest::RequestBuilder {
        let mut req = self
            .http
            .post(&self.config.url)
            .header(reqwest::header::ACCEPT, "application/json, text/event-stream");
        if let Some(id) = session_id {
            req = req.header(SESSION_HEADER, id);
        }
        req
    }

    /// Send a request and wait for its response, returning the session
    /// header the server set, if any.
    async fn request(
        &self,
        session_id: Option<&str>,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<(serde_json::Value, Option<String>), KnowledgeError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let req = JsonRpcRequest::new(id, method, params);

        let resp = self.post(session_id).json(&req).send().await?;
        let status = resp.status();
        let new_session = resp
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let is_sse = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("text/event-stream"));
        let body = resp.text().await?;

        if !status.is_success() {
            return Err(KnowledgeError::Transport(format!(
                "MCP request '{}' failed with {}: {}",
                method, status, body
            )));
        }

        let message = if is_sse {
            response_from_sse(&body, id)?
        } else {
            serde_json::from_str::<JsonRpcResponse>(&body)
                .map_err(|e| KnowledgeError::Protocol(format!("invalid response: {}", e)))?
        };

        if let Some(err) = message.error {
            return Err(KnowledgeError::Protocol(format!(
                "MCP error {}: {}",
                err.code, err.message
            )));
        }
        let result = message
            .result
            .ok_or_else(|| KnowledgeError::Protocol("response has no result".into()))?;
        Ok((result, new_session))
    }

    async fn notify(&self, session_id: Option<&str>, method: &str) -> Result<(), KnowledgeError> {
        let resp = self
            .post(session_id)
            .json(&JsonRpcNotification::new(method))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(KnowledgeError::Transport(format!(
                "MCP notification '{}' failed with {}",
                method,
                resp.status()
            )));
        }
        Ok(())
    }

    async fn session_id(&self) -> Result<Option<String>, KnowledgeError> {
        let guard = self.session.read().await;
        let session = guard.as_ref().ok_or(KnowledgeError::NotConnected)?;
        Ok(session.id.clone())
    }
}

/// Pick the response to request `id` out of an SSE body
fn response_from_sse(body: &str, id: u64) -> Result<JsonRpcResponse, KnowledgeError> {
    let mut decoder = SseDecoder::new();
    let mut frames = decoder.push(body.as_bytes());
    frames.extend(decoder.finish());

    frames
        .into_iter()
        .filter_map(|frame| match frame {
            SseFrame::Event { data, .. } => serde_json::from_str::<JsonRpcResponse>(&data).ok(),
            SseFrame::Comment(_) => None,
        })
        .find(|msg| msg.id == Some(id))
        .ok_or_else(|| {
            KnowledgeError::Protocol(format!("no response for request {} in stream", id))
        })
}

#[async_trait]
impl KnowledgeService for McpHttpClient {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn connect(&self) -> Result<(), KnowledgeError> {
        let params = serde_json::json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {"name": "veritas", "version": env!("CARGO_PKG_VERSION")},
        });
        let (result, session_id) = self.request(None, "initialize", Some(params)).await?;
        let init: InitializeResult = serde_json::from_value(result)
            .map_err(|e| KnowledgeError::Protocol(format!("invalid initialize result: {}", e)))?;

        self.notify(session_id.as_deref(), "notifications/initialized")
            .await?;

        info!(
            server = %self.config.name,
            version = %init.protocol_version,
            "MCP server initialized"
        );
        *self.session.write().await = Some(McpSession { id: session_id });
        Ok(())
    }

    async fn ask_question(&self, repo: &str, question: &str) -> Result<String, KnowledgeError> {
        let session_id = self.session_id().await?;
        let params = serde_json::json!({
            "name": "ask_question",
            "arguments": {"repoName": repo, "question": question},
        });
        debug!(server = %self.config.name, repo, "Asking knowledge service");
        let (result, _) = self
            .request(session_id.as_deref(), "tools/call", Some(params))
            .await?;
        let result: McpToolResult = serde_json::from_value(result)
            .map_err(|e| KnowledgeError::Protocol(format!("invalid tool result: {}", e)))?;

        if result.is_error {
            return Err(KnowledgeError::Tool(result.text()));
        }
        Ok(result.text())
    }

    async fn disconnect(&self) -> Result<(), KnowledgeError> {
        let Some(session) = self.session.write().await.take() else {
            return Ok(());
        };
        if let Some(id) = session.id {
            self.http
                .delete(&self.config.url)
                .header(SESSION_HEADER, id)
                .send()
                .await?;
        }
        debug!(server = %self.config.name, "MCP session closed");
        Ok(())
    }
}
