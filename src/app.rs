//! Composition root: turns an [`AppConfig`] into a running orchestrator.

use crate::config::AppConfig;
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;
use vidnotes_llm::{build_provider, CredentialPool, ModelCatalog, Orchestrator, TokenBudgetMonitor};

/// Wired orchestrator plus its background tasks
pub struct App {
    pub config: AppConfig,
    pub orchestrator: Orchestrator,
    shutdown: CancellationToken,
    reset_task: JoinHandle<()>,
}

impl App {
    /// Build every component and start the usage reset task.
    pub fn start(config: AppConfig) -> Result<Self> {
        let provider = build_provider(&config.provider).context("Failed to build provider")?;
        let provider_name = provider.name().to_string();

        let credentials = config.resolve_credentials()?;
        let pool = CredentialPool::new(credentials).context("Invalid credential pool")?;
        let catalog = ModelCatalog::new(config.models.clone()).context("Invalid model catalog")?;

        let usage = config
            .domains
            .iter()
            .filter_map(|(name, d)| d.daily_token_limit.map(|limit| (name, limit)))
            .fold(
                TokenBudgetMonitor::new(config.usage.default_daily_limit),
                |monitor, (name, limit)| monitor.with_domain_limit(name.clone(), limit),
            );
        let usage = Arc::new(usage);

        let shutdown = CancellationToken::new();
        let reset_task = usage
            .clone()
            .spawn_reset_task(config.usage.reset_check_interval(), shutdown.clone());

        let orchestrator = Orchestrator::new(provider, Arc::new(pool), Arc::new(catalog), usage)
            .with_config(config.orchestrator.clone());

        info!(
            provider = %provider_name,
            credentials = orchestrator.pool().len(),
            models = orchestrator.catalog().len(),
            max_attempts = orchestrator.max_attempts(),
            "Orchestrator ready"
        );

        Ok(Self {
            config,
            orchestrator,
            shutdown,
            reset_task,
        })
    }

    /// Stop background tasks
    pub async fn shutdown(self) -> Result<()> {
        self.shutdown.cancel();
        self.reset_task
            .await
            .context("Usage reset task panicked")?;
        Ok(())
    }
}
