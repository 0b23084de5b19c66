//! Orchestrator and per-domain configuration

use crate::catalog::RequiredCapability;
use serde::{Deserialize, Serialize};
use std::time::Duration;

// ============================================================================
// Orchestrator Configuration
// ============================================================================

/// `[orchestrator]` configuration section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// First inter-attempt wait after a model-level failure
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    /// Upper bound on any single inter-attempt wait
    #[serde(default = "default_max_backoff_wait_ms")]
    pub max_backoff_wait_ms: u64,
    /// Deadline for requests that do not carry one
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,
    /// Model cooldown after a size rejection
    #[serde(default = "default_payload_too_large_cooldown_ms")]
    pub payload_too_large_cooldown_ms: u64,
    /// Model cooldown after an overload
    #[serde(default = "default_overloaded_cooldown_ms")]
    pub overloaded_cooldown_ms: u64,
    /// Model cooldown after an unclassified failure
    #[serde(default = "default_fatal_cooldown_ms")]
    pub fatal_cooldown_ms: u64,
    /// Truncate prompts that no model can hold instead of failing
    #[serde(default = "default_true")]
    pub truncate_oversized_prompts: bool,
}

fn default_retry_base_delay_ms() -> u64 {
    250
}

fn default_max_backoff_wait_ms() -> u64 {
    10_000
}

fn default_timeout_ms() -> u64 {
    120_000
}

fn default_payload_too_large_cooldown_ms() -> u64 {
    60_000
}

fn default_overloaded_cooldown_ms() -> u64 {
    120_000
}

fn default_fatal_cooldown_ms() -> u64 {
    10_000
}

fn default_true() -> bool {
    true
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            retry_base_delay_ms: default_retry_base_delay_ms(),
            max_backoff_wait_ms: default_max_backoff_wait_ms(),
            default_timeout_ms: default_timeout_ms(),
            payload_too_large_cooldown_ms: default_payload_too_large_cooldown_ms(),
            overloaded_cooldown_ms: default_overloaded_cooldown_ms(),
            fatal_cooldown_ms: default_fatal_cooldown_ms(),
            truncate_oversized_prompts: true,
        }
    }
}

impl OrchestratorConfig {
    /// Default request deadline
    #[must_use]
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    /// Wait before attempt `attempt` (1-based count of attempts already
    /// made): `min(base * 2^(attempt-1), max_backoff_wait)`.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u64::MAX);
        Duration::from_millis(
            self.retry_base_delay_ms
                .saturating_mul(factor)
                .min(self.max_backoff_wait_ms),
        )
    }

    /// Model cooldown after a size rejection
    #[must_use]
    pub fn payload_too_large_cooldown(&self) -> Duration {
        Duration::from_millis(self.payload_too_large_cooldown_ms)
    }

    /// Model cooldown after an overload
    #[must_use]
    pub fn overloaded_cooldown(&self) -> Duration {
        Duration::from_millis(self.overloaded_cooldown_ms)
    }

    /// Model cooldown after an unclassified failure
    #[must_use]
    pub fn fatal_cooldown(&self) -> Duration {
        Duration::from_millis(self.fatal_cooldown_ms)
    }
}

// ============================================================================
// Domain Configuration
// ============================================================================

/// `[domains.<name>]` section: defaults for one kind of caller
/// (notes, charts, flashcards, ...).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DomainConfig {
    /// Override of the usage default daily limit
    #[serde(default)]
    pub daily_token_limit: Option<u64>,
    /// Capability requests in this domain ask for
    #[serde(default)]
    pub required_capability: Option<RequiredCapability>,
    /// Sampling temperature
    #[serde(default)]
    pub temperature: Option<f32>,
    /// Output token cap
    #[serde(default)]
    pub max_output_tokens: Option<u32>,
}
