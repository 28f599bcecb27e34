//! # Agent Tools
//!
//! Locally executed function tools exposed to agents.

pub mod knowledge;
pub mod verify_url;

use async_trait::async_trait;
use serde_json::{json, Value};

pub use knowledge::AskQuestionTool;
pub use verify_url::VerifyUrlTool;

/// A function tool the model may call.
///
/// Failures are reported in the returned value so the model can react.
#[async_trait]
pub trait FunctionTool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON schema of the arguments object
    fn parameters(&self) -> Value;

    /// Server label when the tool fronts an external service
    fn server(&self) -> Option<&str> {
        None
    }

    async fn call(&self, arguments: Value) -> Value;

    /// Responses API tool definition
    fn definition(&self) -> Value {
        json!({
            "type": "function",
            "name": self.name(),
            "description": self.description(),
            "parameters": self.parameters(),
            "strict": true,
        })
    }
}

/// Parse tool arguments, which may arrive as an object or a JSON string
pub(crate) fn parse_args<T: serde::de::DeserializeOwned>(arguments: Value) -> Result<T, String> {
    let value = match arguments {
        Value::String(s) => serde_json::from_str(&s).map_err(|e| e.to_string())?,
        other => other,
    };
    serde_json::from_value(value).map_err(|e| format!("invalid arguments: {}", e))
}
