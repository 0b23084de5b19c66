//! OpenAI-compatible adapter (`/chat/completions`)
//!
//! Works against OpenAI, Groq, OpenRouter and anything else speaking the
//! same chat completions dialect.

use super::{InvocationParams, ProviderAdapter, ProviderError, ProviderReply};
use crate::credential::SelectedCredential;
use crate::error::{Error, Result};
use crate::message::Message;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// OpenAI API base URL
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    total_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    code: Option<serde_json::Value>,
}

/// OpenAI-compatible chat completions adapter
pub struct OpenAiCompatibleProvider {
    client: reqwest::Client,
    base_url: String,
}

impl OpenAiCompatibleProvider {
    /// Create an adapter with a per-request timeout
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;
        Ok(Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    /// Point at a different compatible endpoint
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }
}

fn build_request<'a>(
    model: &'a str,
    messages: &'a [Message],
    params: &InvocationParams,
) -> ChatRequest<'a> {
    ChatRequest {
        model,
        messages: messages
            .iter()
            .map(|m| ChatMessage {
                role: m.role.as_str(),
                content: &m.content,
            })
            .collect(),
        temperature: params.temperature,
        max_tokens: params.max_output_tokens,
    }
}

/// `Retry-After` is either delta-seconds or an HTTP date; only the former
/// is used by the vendors this adapter targets.
fn retry_after_header(value: Option<&str>) -> Option<Duration> {
    value?
        .trim()
        .parse::<f64>()
        .ok()
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
}

fn parse_error(status: u16, body: &str, retry_after: Option<Duration>) -> ProviderError {
    let mut err = match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => {
            let error = envelope.error;
            let code = error
                .code
                .as_ref()
                .and_then(|c| c.as_str().map(str::to_string))
                .or(error.kind);
            let mut err = ProviderError::http(status, &error.message);
            if let Some(code) = code {
                err = err.with_code(code);
            }
            err
        }
        Err(_) => ProviderError::http(status, body),
    };
    if let Some(delay) = retry_after {
        err = err.with_retry_after(delay);
    }
    err
}

fn parse_reply(body: &str) -> std::result::Result<ProviderReply, ProviderError> {
    let response: ChatResponse = serde_json::from_str(body)
        .map_err(|e| ProviderError::new(format!("invalid chat completion response: {e}")))?;
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::new("no choices in response"))?;
    Ok(ProviderReply {
        content: choice.message.content.unwrap_or_default(),
        usage_tokens: response.usage.map(|u| u.total_tokens),
        model: response.model,
    })
}

#[async_trait::async_trait]
impl ProviderAdapter for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn invoke(
        &self,
        credential: &SelectedCredential,
        model: &str,
        messages: &[Message],
        params: &InvocationParams,
    ) -> std::result::Result<ProviderReply, ProviderError> {
        let request = build_request(model, messages, params);
        debug!(model, credential = %credential.id, "Sending chat completion request");

        let mut builder = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(credential.secret.expose_secret())
            .json(&request);
        if let Some(deadline) = params.deadline {
            builder = builder.timeout(deadline.saturating_duration_since(tokio::time::Instant::now()));
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ProviderError::new(format!("network error: {}", e.without_url())))?;

        let status = response.status();
        let retry_after = retry_after_header(
            response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok()),
        );
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::new(format!("network error: {}", e.without_url())))?;

        if !status.is_success() {
            let err = parse_error(status.as_u16(), &body, retry_after);
            warn!(
                model,
                credential = %credential.id,
                status = status.as_u16(),
                code = err.code.as_deref().unwrap_or("-"),
                "Chat completion API error"
            );
            return Err(err);
        }

        parse_reply(&body)
    }
}
