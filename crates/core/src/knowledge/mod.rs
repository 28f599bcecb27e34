//! # Knowledge Service
//!
//! External repository knowledge (DeepWiki over MCP) made available to the
//! critique stage. The connection is scoped to that stage.

pub mod mcp_http;
pub mod protocol;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use mcp_http::McpHttpClient;

#[derive(Debug, Error)]
pub enum KnowledgeError {
    #[error("knowledge service not connected")]
    NotConnected,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("tool error: {0}")]
    Tool(String),
}

impl From<reqwest::Error> for KnowledgeError {
    fn from(e: reqwest::Error) -> Self {
        KnowledgeError::Transport(e.to_string())
    }
}

/// Connection settings for the knowledge service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_name() -> String {
    "DeepWiki".to_string()
}

fn default_url() -> String {
    "https://mcp.deepwiki.com/mcp".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            url: default_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// A connectable question-answering service about code repositories
#[async_trait]
pub trait KnowledgeService: Send + Sync {
    /// Server label shown in tool-call events
    fn name(&self) -> &str;

    async fn connect(&self) -> Result<(), KnowledgeError>;

    /// Ask a question about `repo` (`owner/name`)
    async fn ask_question(&self, repo: &str, question: &str) -> Result<String, KnowledgeError>;

    /// Release the connection. Safe to call when not connected.
    async fn disconnect(&self) -> Result<(), KnowledgeError>;
}
