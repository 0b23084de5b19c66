//! Operator view and escape hatches

use super::engine::Orchestrator;
use crate::catalog::ModelStatus;
use crate::credential::CredentialStatus;
use crate::usage::BudgetSnapshot;
use serde::Serialize;
use tracing::info;

/// Point-in-time state of the pool, catalog and usage monitor
#[derive(Debug, Clone, Serialize)]
pub struct OrchestratorStatus {
    /// Adapter name
    pub provider: String,
    /// Configured credentials
    pub total_credentials: usize,
    /// Credentials not cooling right now
    pub available_credentials: usize,
    /// Credential handed out most recently
    pub last_used_credential: Option<String>,
    /// Per-credential state
    pub credentials: Vec<CredentialStatus>,
    /// Per-model state
    pub models: Vec<ModelStatus>,
    /// Per-domain usage
    pub token_usage: Vec<BudgetSnapshot>,
    /// Provider call bound per request
    pub max_attempts: u32,
}

impl Orchestrator {
    /// Snapshot everything an operator needs to see
    pub async fn status(&self) -> OrchestratorStatus {
        OrchestratorStatus {
            provider: self.provider.name().to_string(),
            total_credentials: self.pool.len(),
            available_credentials: self.pool.available_count(),
            last_used_credential: self.pool.last_used().map(|id| id.to_string()),
            credentials: self.pool.snapshot(),
            models: self.catalog.snapshot(),
            token_usage: self.usage.snapshots().await,
            max_attempts: self.max_attempts(),
        }
    }

    /// Clear every credential and model cooldown
    pub fn reset_cooldowns(&self) {
        self.pool.reset_cooldowns();
        self.catalog.clear_cooldowns();
        info!("All cooldowns reset by operator");
    }

    /// Start a fresh usage window for `domain`
    pub async fn reset_token_budget(&self, domain: &str) {
        self.usage.reset(domain).await;
    }
}
