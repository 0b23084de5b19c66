//! Google Gemini adapter (`generateContent`)

use super::{InvocationParams, ProviderAdapter, ProviderError, ProviderReply};
use crate::credential::SelectedCredential;
use crate::error::{Error, Result};
use crate::message::{Message, MessageRole};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Generative Language API base URL
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
    #[serde(default)]
    model_version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    total_token_count: u64,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    details: Vec<serde_json::Value>,
}

// ============================================================================
// Provider
// ============================================================================

/// Gemini adapter. Credentials are passed per call, so one instance serves
/// the whole pool.
pub struct GeminiProvider {
    client: reqwest::Client,
    base_url: String,
}

impl GeminiProvider {
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

    /// Point at a different endpoint (proxies, tests)
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    fn build_request(messages: &[Message], params: &InvocationParams) -> GenerateRequest {
        let system: Vec<Part> = messages
            .iter()
            .filter(|m| m.role == MessageRole::System)
            .map(|m| Part {
                text: m.content.clone(),
            })
            .collect();

        let contents = messages
            .iter()
            .filter(|m| m.role != MessageRole::System)
            .map(|m| Content {
                role: Some(
                    match m.role {
                        MessageRole::Assistant => "model",
                        _ => "user",
                    }
                    .to_string(),
                ),
                parts: vec![Part {
                    text: m.content.clone(),
                }],
            })
            .collect();

        GenerateRequest {
            contents,
            system_instruction: (!system.is_empty()).then_some(Content {
                role: None,
                parts: system,
            }),
            generation_config: GenerationConfig {
                temperature: params.temperature,
                max_output_tokens: params.max_output_tokens,
            },
        }
    }
}

/// Turn a non-success response into a [`ProviderError`], lifting
/// `error.status` and any `retryDelay` detail into structured fields.
fn parse_error(status: u16, body: &str) -> ProviderError {
    let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(body) else {
        return ProviderError::http(status, body);
    };
    let error = envelope.error;

    let retry_after = error
        .details
        .iter()
        .filter_map(|d| d.get("retryDelay").and_then(|v| v.as_str()))
        .find_map(|delay| {
            delay
                .strip_suffix('s')
                .and_then(|secs| secs.parse::<f64>().ok())
                .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        });

    let mut err = ProviderError::http(status, &error.message);
    if let Some(code) = error.status {
        err = err.with_code(code);
    }
    if let Some(delay) = retry_after {
        err = err.with_retry_after(delay);
    }
    err
}

fn parse_reply(body: &str) -> std::result::Result<ProviderReply, ProviderError> {
    let response: GenerateResponse = serde_json::from_str(body)
        .map_err(|e| ProviderError::new(format!("invalid Gemini response: {e}")))?;

    let candidate = response
        .candidates
        .first()
        .ok_or_else(|| ProviderError::new("Gemini returned no candidates"))?;

    let content: String = candidate
        .content
        .parts
        .iter()
        .map(|p| p.text.as_str())
        .collect();

    Ok(ProviderReply {
        content,
        usage_tokens: response.usage_metadata.map(|u| u.total_token_count),
        model: response.model_version,
    })
}

#[async_trait::async_trait]
impl ProviderAdapter for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn invoke(
        &self,
        credential: &SelectedCredential,
        model: &str,
        messages: &[Message],
        params: &InvocationParams,
    ) -> std::result::Result<ProviderReply, ProviderError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, model);
        let request = Self::build_request(messages, params);

        debug!(model, credential = %credential.id, "Sending request to Gemini");

        let mut builder = self
            .client
            .post(&url)
            .header("x-goog-api-key", credential.secret.expose_secret())
            .json(&request);
        if let Some(deadline) = params.deadline {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            builder = builder.timeout(remaining);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ProviderError::new(format!("network error: {}", e.without_url())))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::new(format!("network error: {}", e.without_url())))?;

        if !status.is_success() {
            let err = parse_error(status.as_u16(), &body);
            warn!(
                model,
                credential = %credential.id,
                status = status.as_u16(),
                code = err.code.as_deref().unwrap_or("-"),
                "Gemini API error"
            );
            return Err(err);
        }

        parse_reply(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_messages_become_instruction() {
        let messages = vec![
            Message::system("Write notes."),
            Message::user("Transcript here"),
            Message::assistant("Draft"),
        ];
        let params = InvocationParams {
            temperature: Some(0.3),
            max_output_tokens: Some(2048),
            deadline: None,
        };
        let body = serde_json::to_value(GeminiProvider::build_request(&messages, &params)).unwrap();

        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "Write notes.");
        assert_eq!(body["contents"].as_array().unwrap().len(), 2);
        assert_eq!(body["contents"][1]["role"], "model");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 2048);
    }

    #[test]
    fn test_parse_rate_limit_error_with_retry_delay() {
        let body = r#"{
            "error": {
                "code": 429,
                "message": "You exceeded your current quota.",
                "status": "RESOURCE_EXHAUSTED",
                "details": [
                    {"@type": "type.googleapis.com/google.rpc.QuotaFailure"},
                    {"@type": "type.googleapis.com/google.rpc.RetryInfo", "retryDelay": "5s"}
                ]
            }
        }"#;
        let err = parse_error(429, body);
        assert_eq!(err.status, Some(429));
        assert_eq!(err.code.as_deref(), Some("RESOURCE_EXHAUSTED"));
        assert_eq!(err.retry_after, Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_parse_unstructured_error() {
        let err = parse_error(502, "<html>Bad Gateway</html>");
        assert_eq!(err.status, Some(502));
        assert!(err.code.is_none());
    }

    #[test]
    fn test_parse_reply() {
        let body = r#"{
            "candidates": [{"content": {"role": "model", "parts": [{"text": "Hello "}, {"text": "world"}]}}],
            "usageMetadata": {"promptTokenCount": 10, "candidatesTokenCount": 5, "totalTokenCount": 15},
            "modelVersion": "gemini-2.5-flash"
        }"#;
        let reply = parse_reply(body).unwrap();
        assert_eq!(reply.content, "Hello world");
        assert_eq!(reply.usage_tokens, Some(15));
        assert_eq!(reply.model.as_deref(), Some("gemini-2.5-flash"));
    }

    #[test]
    fn test_empty_candidates_is_error() {
        assert!(parse_reply(r#"{"candidates": []}"#).is_err());
    }
}
