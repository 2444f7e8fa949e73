use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error};

use crate::contexts::ExecutionError;

/// One message of a chat-completion conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub kind: String,
}

impl ResponseFormat {
    pub fn json_object() -> Self {
        Self {
            kind: "json_object".to_string(),
        }
    }
}

/// Request body of `POST <base_url>/chat/completions`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub top_p: f32,
    pub presence_penalty: f32,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatMessageResponse {
    #[serde(default)]
    content: Option<String>,
}

/// Text of the first choice plus the reason generation stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub content: String,
    pub finish_reason: Option<String>,
}

/// The generation service seam
#[async_trait]
pub trait ChatCompletion: Send + Sync {
    async fn complete(&self, request: ChatRequest) -> Result<Completion, ExecutionError>;
}

/// An `{"error": ...}` object returned by the generation service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamRejection {
    pub code: Option<String>,
    pub message: String,
}

impl UpstreamRejection {
    /// Extracts a rejection from a JSON value shaped `{"error": {...}}` or
    /// `{"error": "text"}`
    pub fn from_value(value: &Value) -> Option<Self> {
        let error = value.as_object()?.get("error")?;
        let rejection = match error {
            Value::Object(fields) => {
                let code = fields.get("code").and_then(scalar_text);
                let message = fields
                    .get("message")
                    .and_then(scalar_text)
                    .or_else(|| code.clone())
                    .unwrap_or_else(|| error.to_string());
                Self { code, message }
            }
            Value::String(message) => Self {
                code: None,
                message: message.clone(),
            },
            Value::Null => return None,
            other => Self {
                code: None,
                message: other.to_string(),
            },
        };
        Some(rejection)
    }

    /// Human readable explanation for well known rejection kinds
    pub fn friendly_message(&self) -> String {
        let lower = self.message.to_lowercase();
        if self.code.as_deref() == Some("context_length_exceeded") {
            "The request exceeds the model context length. Shorten the text or split it into parts."
                .to_string()
        } else if lower.contains("invalid") {
            "The model could not process the request. Rephrase the request or reduce its size."
                .to_string()
        } else if lower.contains("constraint") || lower.contains("did not conform") {
            "The model could not produce a response in the required format. Rephrase the request."
                .to_string()
        } else {
            self.message.clone()
        }
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Chat-completion client for OpenAI compatible services
#[derive(Clone)]
pub struct OpenAiChatClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    timeout: Duration,
}

impl std::fmt::Debug for OpenAiChatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiChatClient")
            .field("endpoint", &self.endpoint)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl OpenAiChatClient {
    /// Creates a client posting to `<base_url>/chat/completions`
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, ExecutionError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ExecutionError::Upstream(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key: api_key.to_string(),
            timeout,
        })
    }

    fn timeout_error(&self) -> ExecutionError {
        ExecutionError::Timeout {
            seconds: self.timeout.as_secs(),
        }
    }
}

#[async_trait]
impl ChatCompletion for OpenAiChatClient {
    async fn complete(&self, request: ChatRequest) -> Result<Completion, ExecutionError> {
        debug!(endpoint = %self.endpoint, model = %request.model, "posting chat completion");

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    self.timeout_error()
                } else {
                    error!(endpoint = %self.endpoint, error = %e, "generation service unreachable");
                    ExecutionError::Upstream(e.to_string())
                }
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                self.timeout_error()
            } else {
                ExecutionError::Upstream(format!("failed to read response body: {}", e))
            }
        })?;

        if !status.is_success() {
            error!(status = %status, body = %body, "generation service returned an error status");
            return Err(status_error(status, &body, self.timeout.as_secs()));
        }

        let unexpected = |e: serde_json::Error| {
            error!(status = %status, body = %body, "unexpected generation service response");
            ExecutionError::Upstream(format!("unexpected response from generation service: {}", e))
        };
        let value: Value = serde_json::from_str(&body).map_err(unexpected)?;
        if let Some(err) = envelope_error(&value) {
            error!(status = %status, body = %body, "generation service answered with an error object");
            return Err(err);
        }
        let parsed: ChatResponse = serde_json::from_value(value).map_err(unexpected)?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or(ExecutionError::EmptyResponse)?;
        let content = choice.message.content.unwrap_or_default();
        if content.is_empty() {
            return Err(ExecutionError::EmptyResponse);
        }

        Ok(Completion {
            content,
            finish_reason: choice.finish_reason,
        })
    }
}

/// Maps a non-2xx answer onto an execution error
///
/// Only timeouts get their own variant. Credential, quota and model errors
/// are service failures, never the caller's fault.
fn status_error(status: reqwest::StatusCode, body: &str, timeout_secs: u64) -> ExecutionError {
    use reqwest::StatusCode;

    if status == StatusCode::REQUEST_TIMEOUT || status == StatusCode::GATEWAY_TIMEOUT {
        return ExecutionError::Timeout {
            seconds: timeout_secs,
        };
    }

    ExecutionError::Upstream(format!("API error {}: {}", status, body))
}

/// A 2xx body carrying `{"error": ...}` instead of choices
fn envelope_error(body: &Value) -> Option<ExecutionError> {
    let rejection = UpstreamRejection::from_value(body)?;
    let code = rejection.code.map(|c| format!(" ({})", c)).unwrap_or_default();
    Some(ExecutionError::Upstream(format!(
        "API error{}: {}",
        code, rejection.message
    )))
}
