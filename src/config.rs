//! Configuration loading
//!
//! Handles loading configuration from embedded defaults, files, and environment.

use anyhow::{Context, Result};
use ::config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, warn};
use vidnotes_llm::{
    credentials_from_list, Credential, CredentialConfig, DomainConfig, ModelDescriptor,
    OrchestratorConfig, ProviderConfig, UsageConfig,
};

/// Embedded default configuration (compiled into binary)
pub const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");

/// Fully merged application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub usage: UsageConfig,
    /// Name of an env var holding a comma-separated key list
    #[serde(default)]
    pub api_keys_env: Option<String>,
    #[serde(default)]
    pub credentials: Vec<CredentialConfig>,
    #[serde(default)]
    pub models: Vec<ModelDescriptor>,
    #[serde(default)]
    pub domains: BTreeMap<String, DomainConfig>,
}

impl AppConfig {
    /// Defaults for `domain`, or empty defaults for unknown domains
    pub fn domain(&self, domain: &str) -> DomainConfig {
        self.domains.get(domain).cloned().unwrap_or_default()
    }

    /// Resolve every credential source into usable credentials.
    ///
    /// Entries whose key cannot be resolved are skipped with a warning so a
    /// missing optional variable does not take the whole pool down.
    pub fn resolve_credentials(&self) -> Result<Vec<Credential>> {
        let mut resolved = Vec::new();

        for entry in &self.credentials {
            match entry.resolve() {
                Ok(credential) => resolved.push(credential),
                Err(e) => warn!(credential = %entry.id, error = %e, "Skipping credential"),
            }
        }

        if let Some(var) = &self.api_keys_env {
            match std::env::var(var) {
                Ok(list) => {
                    let listed = credentials_from_list(&list)
                        .with_context(|| format!("Invalid key list in {var}"))?;
                    debug!(var = %var, count = listed.len(), "Expanded key list");
                    resolved.extend(listed);
                }
                Err(_) => debug!(var = %var, "Key list variable not set"),
            }
        }

        if resolved.is_empty() {
            anyhow::bail!(
                "No usable API credentials. Set {} or configure [[credentials]].",
                self.api_keys_env.as_deref().unwrap_or("a key list variable")
            );
        }
        Ok(resolved)
    }
}

/// Load configuration from files and environment
pub fn load_config(extra: Option<&Path>) -> Result<AppConfig> {
    let mut builder = Config::builder()
        // 1. Embedded defaults (always available)
        .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml))
        // 2. Local overrides (optional)
        .add_source(File::with_name("config/local").required(false));

    // 3. Explicit file from the command line
    if let Some(path) = extra {
        builder = builder.add_source(File::from(path).required(true));
    }

    let config = builder
        // 4. Environment variables (highest priority)
        // prefix_separator("_") keeps VIDNOTES_PROVIDER__KIND working;
        // config 0.14 would otherwise expect VIDNOTES__PROVIDER__KIND.
        .add_source(
            Environment::with_prefix("VIDNOTES")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    config
        .try_deserialize()
        .context("Failed to deserialize configuration")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn embedded() -> AppConfig {
        Config::builder()
            .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_embedded_defaults_parse() {
        let cfg = embedded();
        assert_eq!(cfg.models.len(), 4);
        assert_eq!(cfg.models[0].name, "gemini-2.5-flash");
        assert_eq!(cfg.orchestrator.overloaded_cooldown_ms, 120_000);
        assert_eq!(cfg.api_keys_env.as_deref(), Some("GEMINI_API_KEYS"));
        assert!(cfg.domains.contains_key("notes"));
    }

    #[test]
    fn test_unknown_domain_gets_empty_defaults() {
        let cfg = embedded();
        let d = cfg.domain("podcasts");
        assert!(d.required_capability.is_none());
        assert!(d.daily_token_limit.is_none());
    }

    #[test]
    fn test_inline_credentials_resolve() {
        let mut cfg = embedded();
        cfg.api_keys_env = None;
        cfg.credentials = vec![CredentialConfig {
            id: "inline".to_string(),
            api_key: Some("AIzaSyInlineTestKey0001".to_string()),
            api_key_env: None,
        }];
        let creds = cfg.resolve_credentials().unwrap();
        assert_eq!(creds.len(), 1);
        assert_eq!(creds[0].id().as_str(), "inline");
    }

    #[test]
    fn test_no_credentials_is_an_error() {
        let mut cfg = embedded();
        cfg.api_keys_env = None;
        cfg.credentials = vec![CredentialConfig {
            id: "missing".to_string(),
            api_key: None,
            api_key_env: Some("VIDNOTES_TEST_SURELY_UNSET_VAR".to_string()),
        }];
        assert!(cfg.resolve_credentials().is_err());
    }
}
