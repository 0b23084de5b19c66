//! Error types for vidnotes-llm

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Construction and configuration error type
#[derive(Debug, Error)]
pub enum Error {
    /// Required setting missing or invalid
    #[error("not configured: {0}")]
    NotConfigured(String),

    /// Credential could not be resolved (missing env var, empty key)
    #[error("invalid credential '{id}': {reason}")]
    InvalidCredential {
        /// Credential id from configuration
        id: String,
        /// What was wrong with it
        reason: String,
    },

    /// Model descriptor rejected
    #[error("invalid model '{name}': {reason}")]
    InvalidModel {
        /// Model name
        name: String,
        /// What was wrong with it
        reason: String,
    },

    /// HTTP client construction failed
    #[error("http client error: {0}")]
    Http(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Terminal outcome of a failed `generate` call.
///
/// Per-attempt variants (`RateLimited`, `PayloadTooLarge`,
/// `ProviderOverloaded`) are recovered internally and only appear here
/// when a caller-facing wrapper needs to report the last observed kind.
#[derive(Debug, Clone, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InvocationError {
    /// A single credential hit the provider's rate limit
    #[error("rate limited")]
    RateLimited,

    /// Prompt exceeded what the model accepts
    #[error("request too large for the selected model")]
    PayloadTooLarge,

    /// Provider reported overload or missing capacity
    #[error("provider overloaded")]
    ProviderOverloaded,

    /// The request deadline expired
    #[error("timed out after {elapsed_ms}ms ({attempts} attempts)")]
    Timeout {
        /// Provider calls started before expiry
        attempts: u32,
        /// Time spent in `generate`
        elapsed_ms: u64,
    },

    /// Every credential is cooling down
    #[error("all credentials are rate limited ({attempts} attempts)")]
    AllCredentialsRateLimited {
        /// Provider calls made
        attempts: u32,
        /// Time until the first credential becomes usable again
        retry_in_ms: Option<u64>,
        /// Last provider error observed
        last_error: Option<String>,
    },

    /// No model passes the cooldown, size and capability filters
    #[error("no suitable model is available ({attempts} attempts)")]
    AllModelsUnavailable {
        /// Provider calls made
        attempts: u32,
        /// Last provider error observed
        last_error: Option<String>,
        /// Whether the last failure was a size rejection
        payload_too_large: bool,
    },

    /// Attempt bound reached
    #[error("all options exhausted after {attempts} attempts")]
    AllOptionsExhausted {
        /// Provider calls made
        attempts: u32,
        /// Last provider error observed
        last_error: Option<String>,
    },

    /// Unclassified provider failure on the last remaining candidate
    #[error("provider error: {message}")]
    Fatal {
        /// Sanitized provider message
        message: String,
    },
}

impl InvocationError {
    /// HTTP status a caller should answer with.
    ///
    /// These are expected operating conditions, so the mapping never
    /// produces 500.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Timeout { .. } => 408,
            Self::PayloadTooLarge => 413,
            Self::AllModelsUnavailable {
                payload_too_large: true,
                ..
            } => 413,
            _ => 503,
        }
    }

    /// Short message suitable for end users.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Timeout { .. } => "The request took too long. Please try again.".to_string(),
            Self::PayloadTooLarge
            | Self::AllModelsUnavailable {
                payload_too_large: true,
                ..
            } => "The request is too large. Please shorten the input and try again.".to_string(),
            Self::AllCredentialsRateLimited {
                retry_in_ms: Some(ms),
                ..
            } => format!(
                "Service is busy. Please try again in ~{}.",
                approximate_wait(Duration::from_millis(*ms))
            ),
            Self::AllCredentialsRateLimited { .. } | Self::RateLimited => {
                "Service is busy. Please try again in a few minutes.".to_string()
            }
            Self::Fatal { .. } => {
                "The AI provider could not complete the request. Please try again later."
                    .to_string()
            }
            _ => "The AI service is temporarily unavailable. Please try again later.".to_string(),
        }
    }

    /// Whether this error ends a `generate` call.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            Self::RateLimited | Self::PayloadTooLarge | Self::ProviderOverloaded
        )
    }
}

fn approximate_wait(d: Duration) -> String {
    let secs = d.as_secs().max(1);
    let (n, unit) = if secs >= 60 {
        (secs.div_ceil(60), "minute")
    } else {
        (secs, "second")
    };
    if n == 1 {
        format!("1 {unit}")
    } else {
        format!("{n} {unit}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_never_500() {
        let cases = [
            InvocationError::Timeout {
                attempts: 1,
                elapsed_ms: 10,
            },
            InvocationError::PayloadTooLarge,
            InvocationError::AllCredentialsRateLimited {
                attempts: 3,
                retry_in_ms: None,
                last_error: None,
            },
            InvocationError::AllModelsUnavailable {
                attempts: 0,
                last_error: None,
                payload_too_large: false,
            },
            InvocationError::AllOptionsExhausted {
                attempts: 6,
                last_error: None,
            },
            InvocationError::Fatal {
                message: "boom".into(),
            },
        ];
        let codes: Vec<u16> = cases.iter().map(InvocationError::status_code).collect();
        assert_eq!(codes, vec![408, 413, 503, 503, 503, 503]);
    }

    #[test]
    fn test_user_message_mentions_wait() {
        let err = InvocationError::AllCredentialsRateLimited {
            attempts: 3,
            retry_in_ms: Some(270_000),
            last_error: None,
        };
        assert_eq!(
            err.user_message(),
            "Service is busy. Please try again in ~5 minutes."
        );
    }

    #[test]
    fn test_size_rejection_maps_to_413() {
        let err = InvocationError::AllModelsUnavailable {
            attempts: 2,
            last_error: Some("too many tokens".into()),
            payload_too_large: true,
        };
        assert_eq!(err.status_code(), 413);
        assert!(err.user_message().contains("too large"));
    }

    #[test]
    fn test_terminal_classification() {
        assert!(!InvocationError::RateLimited.is_terminal());
        assert!(InvocationError::Timeout {
            attempts: 0,
            elapsed_ms: 0
        }
        .is_terminal());
    }
}
