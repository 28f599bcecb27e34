//! # URL Verification
//!
//! Checks that a cited URL or API endpoint is reachable.

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::{Duration, Instant};

use super::{parse_args, FunctionTool};

const USER_AGENT: &str = "Mozilla/5.0 (Research Bot) URL Verification Tool";
const TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Deserialize)]
struct VerifyUrlArgs {
    url: String,
}

/// Outcome reported back to the model
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VerifyUrlResult {
    /// The check ran to completion (regardless of status)
    pub success: bool,
    pub status_code: Option<u16>,
    pub error: Option<String>,
    /// 2xx or 3xx
    pub accessible: bool,
    pub response_time_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_description: Option<String>,
}

impl VerifyUrlResult {
    fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

pub struct VerifyUrlTool {
    client: Client,
}

impl VerifyUrlTool {
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_default();
        Self { client }
    }

    /// HEAD first, falling back to GET when the server rejects HEAD
    pub async fn verify(&self, url: &str) -> VerifyUrlResult {
        let parsed = match validate(url) {
            Ok(parsed) => parsed,
            Err(result) => return result,
        };

        let start = Instant::now();
        let mut response = self.send(Method::HEAD, parsed.clone()).await;
        if matches!(&response, Ok(r) if r.status() == StatusCode::METHOD_NOT_ALLOWED) {
            response = self.send(Method::GET, parsed.clone()).await;
        }
        let elapsed_ms = (start.elapsed().as_secs_f64() * 100_000.0).round() / 100.0;

        match response {
            Ok(resp) => {
                let status = resp.status();
                let final_url = (resp.url() != &parsed).then(|| resp.url().to_string());
                VerifyUrlResult {
                    success: true,
                    status_code: Some(status.as_u16()),
                    error: None,
                    accessible: status.is_success() || status.is_redirection(),
                    response_time_ms: Some(elapsed_ms),
                    final_url,
                    status_description: Some(match status.canonical_reason() {
                        Some(reason) => format!("{} {}", status.as_u16(), reason),
                        None => status.as_u16().to_string(),
                    }),
                }
            }
            Err(e) if e.is_timeout() => VerifyUrlResult::failed(
                "Request timeout - URL took longer than 10 seconds to respond",
            ),
            Err(e) if e.is_redirect() => VerifyUrlResult::failed(
                "Too many redirects - URL redirect chain exceeded maximum limit",
            ),
            Err(e) if e.is_connect() => VerifyUrlResult::failed(
                "Connection error - unable to reach the URL \
                 (DNS resolution failed or server unreachable)",
            ),
            Err(e) => VerifyUrlResult::failed(format!("Request failed: {}", e)),
        }
    }

    async fn send(&self, method: Method, url: Url) -> reqwest::Result<reqwest::Response> {
        self.client.request(method, url).send().await
    }
}

impl Default for VerifyUrlTool {
    fn default() -> Self {
        Self::new()
    }
}

fn validate(url: &str) -> Result<Url, VerifyUrlResult> {
    if url.trim().is_empty() {
        return Err(VerifyUrlResult::failed(
            "Invalid URL provided - must be a non-empty string",
        ));
    }
    let parsed = Url::parse(url).map_err(|_| {
        VerifyUrlResult::failed("Invalid URL format - must include scheme (http/https) and domain")
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(VerifyUrlResult::failed(format!(
            "Unsupported URL scheme '{}' - only http and https are supported",
            parsed.scheme()
        )));
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(VerifyUrlResult::failed(
            "Invalid URL format - must include scheme (http/https) and domain",
        ));
    }
    Ok(parsed)
}

#[async_trait]
impl FunctionTool for VerifyUrlTool {
    fn name(&self) -> &str {
        "verify_url"
    }

    fn description(&self) -> &str {
        "Verify if a URL or HTTP/HTTPS API endpoint exists and is accessible. \
         Returns the status code, whether it is reachable, and any redirect target."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "The URL to verify, including the http:// or https:// scheme"
                }
            },
            "required": ["url"],
            "additionalProperties": false
        })
    }

    async fn call(&self, arguments: Value) -> Value {
        let result = match parse_args::<VerifyUrlArgs>(arguments) {
            Ok(args) => self.verify(&args.url).await,
            Err(e) => VerifyUrlResult::failed(e),
        };
        serde_json::to_value(result).unwrap_or(Value::Null)
    }
}
