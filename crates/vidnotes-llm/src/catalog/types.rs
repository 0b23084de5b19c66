//! Model descriptor and capability types

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Share of a model's context window usable by the prompt; the rest is
/// reserved for output and formatting overhead.
pub const CONTEXT_HEADROOM: f64 = 0.7;

// ============================================================================
// Capability
// ============================================================================

/// Coarse quality ranking of a model
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityTier {
    /// Cheap, fast, weak at long structured output
    Basic,
    /// General purpose
    Good,
    /// Strongest reasoning, highest cost
    Excellent,
}

/// Minimum quality a request asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequiredCapability {
    /// Any model will do
    Low,
    /// Basic models are excluded
    Medium,
    /// Basic models are excluded
    High,
}

impl RequiredCapability {
    /// Whether a model of `tier` satisfies this requirement
    #[must_use]
    pub fn admits(self, tier: CapabilityTier) -> bool {
        match self {
            Self::Low => true,
            Self::Medium | Self::High => tier != CapabilityTier::Basic,
        }
    }
}

impl std::str::FromStr for RequiredCapability {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(format!("unknown capability '{other}' (low|medium|high)")),
        }
    }
}

// ============================================================================
// Model Descriptor
// ============================================================================

/// One entry of the model catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDescriptor {
    /// Provider-side model name
    pub name: String,
    /// Context window in tokens
    pub max_context_tokens: u32,
    /// Selection order, lower is preferred
    pub priority: u32,
    /// Price per token (USD)
    #[serde(default)]
    pub cost_per_token: f64,
    /// Quality tier
    pub capability_tier: CapabilityTier,
    /// Set on provider-reported overload
    #[serde(skip)]
    pub(crate) cooldown_until: Option<Instant>,
}

impl ModelDescriptor {
    /// Create a descriptor with no cooldown
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        max_context_tokens: u32,
        priority: u32,
        capability_tier: CapabilityTier,
    ) -> Self {
        Self {
            name: name.into(),
            max_context_tokens,
            priority,
            cost_per_token: 0.0,
            capability_tier,
            cooldown_until: None,
        }
    }

    /// Set the per-token price
    #[must_use]
    pub fn with_cost_per_token(mut self, cost: f64) -> Self {
        self.cost_per_token = cost;
        self
    }

    /// Prompt tokens this model accepts after reserving output headroom
    #[must_use]
    pub fn input_token_budget(&self) -> usize {
        (f64::from(self.max_context_tokens) * CONTEXT_HEADROOM).floor() as usize
    }

    /// Whether a prompt of `estimated_tokens` fits the context window
    #[must_use]
    pub fn fits(&self, estimated_tokens: usize) -> bool {
        estimated_tokens as f64 <= f64::from(self.max_context_tokens) * CONTEXT_HEADROOM
    }

    /// Whether the model is cooling down at `now`
    #[must_use]
    pub fn is_cooling(&self, now: Instant) -> bool {
        self.cooldown_until.is_some_and(|until| until > now)
    }

    /// Estimated cost of `tokens` on this model
    #[must_use]
    pub fn estimate_cost(&self, tokens: u64) -> f64 {
        self.cost_per_token * tokens as f64
    }
}
