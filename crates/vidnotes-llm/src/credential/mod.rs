//! Credential pool - round-robin API key rotation with cooldowns
//!
//! The pool owns every provider credential for the lifetime of the
//! process. Selection is round-robin over credentials that are not
//! cooling down; a failed credential is parked until its cooldown
//! elapses and is then picked up again by the expiry sweep.
//!
//! All state sits behind one mutex, so cursor advance, cooldown writes
//! and the reads used for selection are atomic with respect to each
//! other. Two in-flight requests may still race to the same credential
//! between `next` and `mark_failed`; that only costs one extra failed
//! call.

mod pool;

#[cfg(test)]
mod tests;

use crate::error::{Error, Result};
use crate::util::{mask_api_key, validate_api_key};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::time::Instant;

pub use pool::{AllExhausted, CredentialPool, CredentialStatus};

/// Identifier of a configured credential
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CredentialId(String);

impl CredentialId {
    /// Create an id, returning `None` for an empty string
    #[must_use]
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let v = value.into();
        if v.trim().is_empty() {
            None
        } else {
            Some(Self(v))
        }
    }

    /// Returns the id as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CredentialId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One provider API key plus its health state
pub struct Credential {
    pub(crate) id: CredentialId,
    pub(crate) secret: SecretString,
    pub(crate) cooldown_until: Option<Instant>,
    pub(crate) consecutive_failures: u32,
}

impl Credential {
    /// Create a healthy credential
    #[must_use]
    pub fn new(id: CredentialId, secret: SecretString) -> Self {
        Self {
            id,
            secret,
            cooldown_until: None,
            consecutive_failures: 0,
        }
    }

    /// Credential id
    #[must_use]
    pub fn id(&self) -> &CredentialId {
        &self.id
    }

    /// Failures since the last successful call
    #[must_use]
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub(crate) fn is_cooling(&self, now: Instant) -> bool {
        self.cooldown_until.is_some_and(|until| until > now)
    }

    pub(crate) fn masked_key(&self) -> String {
        mask_api_key(self.secret.expose_secret())
    }
}

// SECURITY: never print the secret
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("id", &self.id)
            .field("key", &self.masked_key())
            .field("cooldown_until", &self.cooldown_until)
            .field("consecutive_failures", &self.consecutive_failures)
            .finish()
    }
}

/// A credential handed out by [`CredentialPool::next`]
#[derive(Clone)]
pub struct SelectedCredential {
    /// Which pool entry this is
    pub id: CredentialId,
    /// Key to authenticate with
    pub secret: SecretString,
}

impl fmt::Debug for SelectedCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectedCredential")
            .field("id", &self.id)
            .field("key", &mask_api_key(self.secret.expose_secret()))
            .finish()
    }
}

/// Where a credential's secret comes from
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CredentialConfig {
    /// Stable id used in logs and status output
    pub id: String,
    /// Inline key (discouraged outside local development)
    #[serde(default)]
    pub api_key: Option<String>,
    /// Environment variable holding the key
    #[serde(default)]
    pub api_key_env: Option<String>,
}

impl CredentialConfig {
    /// Resolve the secret reference into a usable credential
    pub fn resolve(&self) -> Result<Credential> {
        let id = CredentialId::new(self.id.clone()).ok_or_else(|| Error::InvalidCredential {
            id: self.id.clone(),
            reason: "id must not be empty".to_string(),
        })?;

        let key = match (&self.api_key, &self.api_key_env) {
            (Some(key), _) => key.clone(),
            (None, Some(var)) => std::env::var(var).map_err(|_| Error::InvalidCredential {
                id: self.id.clone(),
                reason: format!("{var} not set"),
            })?,
            (None, None) => {
                return Err(Error::InvalidCredential {
                    id: self.id.clone(),
                    reason: "neither api_key nor api_key_env given".to_string(),
                })
            }
        };

        if let Some(reason) = validate_api_key(&key, &self.id) {
            return Err(Error::InvalidCredential {
                id: self.id.clone(),
                reason,
            });
        }

        Ok(Credential::new(id, SecretString::from(key)))
    }
}

/// Expand a comma-separated key list (e.g. `GEMINI_API_KEYS=a,b,c`) into
/// credentials named `key-1..key-N`.
pub fn credentials_from_list(list: &str) -> Result<Vec<Credential>> {
    list.split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .enumerate()
        .map(|(i, key)| {
            CredentialConfig {
                id: format!("key-{}", i + 1),
                api_key: Some(key.to_string()),
                api_key_env: None,
            }
            .resolve()
        })
        .collect()
}
