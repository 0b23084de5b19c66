//! Model catalog - ranked model list with cooldown-aware filtering
//!
//! # Module Structure
//!
//! - `types`: ModelDescriptor, CapabilityTier, RequiredCapability
//! - `ModelCatalog`: filtering, ordering and model cooldowns

mod types;

#[cfg(test)]
mod tests;

pub use types::{CapabilityTier, ModelDescriptor, RequiredCapability, CONTEXT_HEADROOM};

use crate::error::{Error, Result};
use serde::Serialize;
use std::sync::RwLock;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Point-in-time view of one model
#[derive(Debug, Clone, Serialize)]
pub struct ModelStatus {
    /// Model name
    pub name: String,
    /// Selection priority
    pub priority: u32,
    /// Quality tier
    pub capability_tier: CapabilityTier,
    /// Context window
    pub max_context_tokens: u32,
    /// Remaining cooldown in milliseconds
    pub cooldown_remaining_ms: Option<u64>,
}

/// Static, ordered list of models with mutable cooldowns
#[derive(Debug)]
pub struct ModelCatalog {
    models: RwLock<Vec<ModelDescriptor>>,
}

impl ModelCatalog {
    /// Create a catalog. Fails on an empty list, duplicate names or a zero
    /// context window.
    pub fn new(models: Vec<ModelDescriptor>) -> Result<Self> {
        if models.is_empty() {
            return Err(Error::NotConfigured(
                "model catalog needs at least one model".to_string(),
            ));
        }
        for (i, model) in models.iter().enumerate() {
            if model.name.trim().is_empty() {
                return Err(Error::InvalidModel {
                    name: model.name.clone(),
                    reason: "name must not be empty".to_string(),
                });
            }
            if model.max_context_tokens == 0 {
                return Err(Error::InvalidModel {
                    name: model.name.clone(),
                    reason: "max_context_tokens must be positive".to_string(),
                });
            }
            if !model.cost_per_token.is_finite() || model.cost_per_token < 0.0 {
                return Err(Error::InvalidModel {
                    name: model.name.clone(),
                    reason: "cost_per_token must be a non-negative number".to_string(),
                });
            }
            if models[..i].iter().any(|m| m.name == model.name) {
                return Err(Error::InvalidModel {
                    name: model.name.clone(),
                    reason: "duplicate name".to_string(),
                });
            }
        }
        Ok(Self {
            models: RwLock::new(models),
        })
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<ModelDescriptor>> {
        self.models.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Vec<ModelDescriptor>> {
        self.models.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Number of models
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Always false; an empty catalog cannot be constructed
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Models eligible for a prompt of `estimated_prompt_tokens`, best first.
    ///
    /// Excludes cooling models, models whose context window cannot hold the
    /// prompt with headroom, and models below `required`. An empty result
    /// means "no suitable model", not an error.
    #[must_use]
    pub fn candidates(
        &self,
        estimated_prompt_tokens: usize,
        required: Option<RequiredCapability>,
    ) -> Vec<ModelDescriptor> {
        let now = Instant::now();
        let mut out: Vec<ModelDescriptor> = self
            .read()
            .iter()
            .filter(|m| !m.is_cooling(now))
            .filter(|m| m.fits(estimated_prompt_tokens))
            .filter(|m| required.is_none_or(|r| r.admits(m.capability_tier)))
            .cloned()
            .collect();
        out.sort_by_key(|m| m.priority);
        debug!(
            estimated_prompt_tokens,
            required = ?required,
            count = out.len(),
            "Model candidates"
        );
        out
    }

    /// Like [`candidates`](Self::candidates) without the size filter.
    ///
    /// Used when the prompt has to be truncated to fit.
    #[must_use]
    pub fn available(&self, required: Option<RequiredCapability>) -> Vec<ModelDescriptor> {
        let now = Instant::now();
        let mut out: Vec<ModelDescriptor> = self
            .read()
            .iter()
            .filter(|m| !m.is_cooling(now))
            .filter(|m| required.is_none_or(|r| r.admits(m.capability_tier)))
            .cloned()
            .collect();
        out.sort_by_key(|m| m.priority);
        out
    }

    /// Exclude a model from selection for `duration`.
    ///
    /// Returns false when the model is unknown.
    pub fn set_cooldown(&self, model_name: &str, duration: Duration) -> bool {
        let mut models = self.write();
        let now = Instant::now();
        match models.iter_mut().find(|m| m.name == model_name) {
            Some(model) => {
                model.cooldown_until = Some(now + duration);
                warn!(
                    model = model_name,
                    cooldown_ms = duration.as_millis() as u64,
                    "Model put in cooldown"
                );
                true
            }
            None => {
                warn!(model = model_name, "set_cooldown on unknown model");
                false
            }
        }
    }

    /// Clear every model cooldown
    pub fn clear_cooldowns(&self) {
        for model in self.write().iter_mut() {
            model.cooldown_until = None;
        }
    }

    /// Look up a model by name
    #[must_use]
    pub fn get(&self, model_name: &str) -> Option<ModelDescriptor> {
        self.read().iter().find(|m| m.name == model_name).cloned()
    }

    /// Snapshot of every model in priority order
    #[must_use]
    pub fn snapshot(&self) -> Vec<ModelStatus> {
        let now = Instant::now();
        let mut out: Vec<ModelStatus> = self
            .read()
            .iter()
            .map(|m| ModelStatus {
                name: m.name.clone(),
                priority: m.priority,
                capability_tier: m.capability_tier,
                max_context_tokens: m.max_context_tokens,
                cooldown_remaining_ms: m
                    .cooldown_until
                    .filter(|until| *until > now)
                    .map(|until| until.duration_since(now).as_millis() as u64),
            })
            .collect();
        out.sort_by_key(|m| m.priority);
        out
    }
}
