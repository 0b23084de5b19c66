//! Request and result types for the orchestrator

use super::config::DomainConfig;
use crate::catalog::RequiredCapability;
use crate::error::InvocationError;
use crate::message::Message;
use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;

/// Domain used when a request names none
pub const DEFAULT_DOMAIN: &str = "default";

// ============================================================================
// Request
// ============================================================================

/// One generation request
#[derive(Debug, Clone)]
pub struct InvocationRequest {
    /// Conversation to send
    pub messages: Vec<Message>,
    /// Sampling temperature
    pub temperature: Option<f32>,
    /// Output token cap
    pub max_output_tokens: Option<u32>,
    /// Minimum model quality
    pub required_capability: Option<RequiredCapability>,
    /// Usage accounting bucket
    pub domain: String,
    /// Overrides the orchestrator's default deadline
    pub timeout: Option<Duration>,
}

impl InvocationRequest {
    /// Request with default parameters in the default domain
    #[must_use]
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            temperature: None,
            max_output_tokens: None,
            required_capability: None,
            domain: DEFAULT_DOMAIN.to_string(),
            timeout: None,
        }
    }

    /// Request built from a domain's configured defaults
    #[must_use]
    pub fn for_domain(domain: impl Into<String>, config: &DomainConfig, messages: Vec<Message>) -> Self {
        Self {
            messages,
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
            required_capability: config.required_capability,
            domain: domain.into(),
            timeout: None,
        }
    }

    /// Set the domain
    #[must_use]
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    /// Set the temperature
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the output token cap
    #[must_use]
    pub fn with_max_output_tokens(mut self, max_tokens: u32) -> Self {
        self.max_output_tokens = Some(max_tokens);
        self
    }

    /// Set the required capability
    #[must_use]
    pub fn with_required_capability(mut self, capability: RequiredCapability) -> Self {
        self.required_capability = Some(capability);
        self
    }

    /// Set the deadline relative to the start of `generate`
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

// ============================================================================
// Result
// ============================================================================

/// Outcome of [`Orchestrator::generate`](super::Orchestrator::generate)
#[derive(Debug, Clone, Serialize)]
pub struct InvocationResult {
    /// Correlates log lines of one call
    pub request_id: Uuid,
    /// Whether a provider call succeeded
    pub success: bool,
    /// Generated text on success
    pub content: Option<String>,
    /// Tokens reported (or estimated) for the successful call
    pub usage_tokens: u64,
    /// Model that answered
    pub model_used: Option<String>,
    /// Credential that answered
    pub credential_used: Option<String>,
    /// Whether the prompt was cut to fit the model
    pub prompt_was_truncated: bool,
    /// Provider calls started
    pub attempts: u32,
    /// `cost_per_token * usage_tokens` of the answering model
    pub estimated_cost: f64,
    /// Terminal failure
    pub error: Option<InvocationError>,
}

impl InvocationResult {
    pub(crate) fn failure(request_id: Uuid, attempts: u32, truncated: bool, error: InvocationError) -> Self {
        Self {
            request_id,
            success: false,
            content: None,
            usage_tokens: 0,
            model_used: None,
            credential_used: None,
            prompt_was_truncated: truncated,
            attempts,
            estimated_cost: 0.0,
            error: Some(error),
        }
    }

    /// Convert into a plain `Result` for callers that don't need metadata
    pub fn into_result(self) -> Result<String, InvocationError> {
        match (self.success, self.content, self.error) {
            (true, Some(content), _) => Ok(content),
            (_, _, Some(error)) => Err(error),
            _ => Err(InvocationError::Fatal {
                message: "no content returned".to_string(),
            }),
        }
    }
}
