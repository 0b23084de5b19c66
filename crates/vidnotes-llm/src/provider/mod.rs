//! Provider adapters
//!
//! One adapter per AI vendor. The orchestrator only sees
//! [`ProviderAdapter`]: invoke a model with a credential, then classify
//! whatever went wrong.
//!
//! # Module Structure
//!
//! - `classify`: status/code/message to [`ErrorKind`], retry-after parsing
//! - `gemini`: Google Generative Language API
//! - `openai`: OpenAI-compatible `/chat/completions` endpoints
//! - `mock`: scripted adapter for tests and dry runs

mod classify;
mod gemini;
mod mock;
mod openai;

pub use classify::{classify, exponential_backoff, parse_retry_after};
pub use gemini::GeminiProvider;
pub use mock::{MockCall, MockOutcome, MockProvider, DEFAULT_REPLY};
pub use openai::OpenAiCompatibleProvider;

use crate::credential::SelectedCredential;
use crate::error::Result;
use crate::message::Message;
use crate::util::sanitize_provider_message;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

// ============================================================================
// Call types
// ============================================================================

/// Generation parameters passed through to the vendor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InvocationParams {
    /// Sampling temperature
    pub temperature: Option<f32>,
    /// Output token cap
    pub max_output_tokens: Option<u32>,
    /// Absolute deadline of the surrounding `generate` call
    pub deadline: Option<Instant>,
}

/// Successful provider reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderReply {
    /// Generated text
    pub content: String,
    /// Total tokens billed, when the vendor reports it
    pub usage_tokens: Option<u64>,
    /// Model that answered, when the vendor echoes it
    pub model: Option<String>,
}

impl ProviderReply {
    /// Reply with only text
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            usage_tokens: None,
            model: None,
        }
    }

    /// Attach a usage count
    #[must_use]
    pub fn with_usage(mut self, tokens: u64) -> Self {
        self.usage_tokens = Some(tokens);
        self
    }
}

/// One failed provider call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderError {
    /// HTTP status, absent for transport failures
    pub status: Option<u16>,
    /// Vendor error code (`RESOURCE_EXHAUSTED`, `rate_limit_exceeded`, ...)
    pub code: Option<String>,
    /// Sanitized vendor message
    pub message: String,
    /// Retry-after from headers, structured details or the full message
    pub retry_after: Option<Duration>,
}

impl ProviderError {
    /// Error with only a message
    ///
    /// Any retry hint is read from the raw text before it is shortened.
    #[must_use]
    pub fn new(message: impl AsRef<str>) -> Self {
        let raw = message.as_ref();
        Self {
            status: None,
            code: None,
            message: sanitize_provider_message(raw),
            retry_after: parse_retry_after(raw),
        }
    }

    /// Error carrying an HTTP status
    #[must_use]
    pub fn http(status: u16, message: impl AsRef<str>) -> Self {
        Self::new(message).with_status(status)
    }

    /// Set the HTTP status
    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Set the vendor error code
    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Set a header-derived retry-after
    #[must_use]
    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.status, &self.code) {
            (Some(status), Some(code)) => write!(f, "HTTP {status} {code}: {}", self.message),
            (Some(status), None) => write!(f, "HTTP {status}: {}", self.message),
            (None, Some(code)) => write!(f, "{code}: {}", self.message),
            (None, None) => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for ProviderError {}

/// Canonical failure classes the orchestrator reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Credential-level throttling; rotate credential
    RateLimited,
    /// Prompt too big for the model; try a smaller prompt or other model
    PayloadTooLarge,
    /// Model-level capacity problem; try another model
    Overloaded,
    /// Anything else; short model cooldown, try next
    Fatal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::RateLimited => "rate_limited",
            Self::PayloadTooLarge => "payload_too_large",
            Self::Overloaded => "overloaded",
            Self::Fatal => "fatal",
        };
        f.write_str(s)
    }
}

// ============================================================================
// Adapter trait
// ============================================================================

/// Contract every vendor adapter implements
#[async_trait::async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Vendor name for logs and status output
    fn name(&self) -> &str;

    /// Run one generation call
    async fn invoke(
        &self,
        credential: &SelectedCredential,
        model: &str,
        messages: &[Message],
        params: &InvocationParams,
    ) -> std::result::Result<ProviderReply, ProviderError>;

    /// Map a failure to an [`ErrorKind`]
    fn classify_error(&self, error: &ProviderError) -> ErrorKind {
        classify(error)
    }

    /// How long the failing credential should rest, if the vendor says
    fn extract_retry_after(&self, error: &ProviderError) -> Option<Duration> {
        error
            .retry_after
            .or_else(|| parse_retry_after(&error.message))
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Supported vendors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Google Gemini
    #[default]
    Gemini,
    /// Any OpenAI-compatible chat completions endpoint
    Openai,
    /// Scripted adapter that always answers
    Mock,
}

/// `[provider]` configuration section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Which adapter to build
    #[serde(default)]
    pub kind: ProviderKind,
    /// Override the vendor's default base URL
    #[serde(default)]
    pub base_url: Option<String>,
    /// Per-request HTTP timeout
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_request_timeout_ms() -> u64 {
    120_000
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::default(),
            base_url: None,
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl ProviderConfig {
    /// HTTP timeout as a [`Duration`]
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Build the adapter a [`ProviderConfig`] names
pub fn build_provider(config: &ProviderConfig) -> Result<Arc<dyn ProviderAdapter>> {
    let timeout = config.request_timeout();
    Ok(match config.kind {
        ProviderKind::Gemini => {
            let mut provider = GeminiProvider::new(timeout)?;
            if let Some(url) = &config.base_url {
                provider = provider.with_base_url(url);
            }
            Arc::new(provider)
        }
        ProviderKind::Openai => {
            let mut provider = OpenAiCompatibleProvider::new(timeout)?;
            if let Some(url) = &config.base_url {
                provider = provider.with_base_url(url);
            }
            Arc::new(provider)
        }
        ProviderKind::Mock => Arc::new(MockProvider::new()),
    })
}
