//! CredentialPool implementation

use super::{Credential, CredentialId, SelectedCredential};
use crate::error::{Error, Result};
use serde::Serialize;
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Every credential is cooling down
#[derive(Debug, Clone, Error)]
#[error("all {total} credentials are cooling down")]
pub struct AllExhausted {
    /// Pool size
    pub total: usize,
    /// Time until the earliest cooldown ends
    pub retry_in: Option<Duration>,
}

/// Point-in-time view of one credential
#[derive(Debug, Clone, Serialize)]
pub struct CredentialStatus {
    /// Credential id
    pub id: String,
    /// Masked key for display
    pub key: String,
    /// Whether the credential is currently excluded from selection
    pub cooling: bool,
    /// Remaining cooldown in milliseconds
    pub cooldown_remaining_ms: Option<u64>,
    /// Failures since the last success
    pub consecutive_failures: u32,
}

#[derive(Debug)]
struct PoolState {
    credentials: Vec<Credential>,
    cursor: usize,
    last_used: Option<CredentialId>,
}

impl PoolState {
    /// One cyclic pass from the cursor. Returns the index of the first
    /// usable credential and moves the cursor past it.
    fn scan(&mut self, now: Instant) -> Option<usize> {
        let n = self.credentials.len();
        for offset in 0..n {
            let idx = (self.cursor + offset) % n;
            if !self.credentials[idx].is_cooling(now) {
                self.cursor = (idx + 1) % n;
                return Some(idx);
            }
        }
        None
    }

    /// Clear cooldowns that have elapsed.
    fn sweep(&mut self, now: Instant) -> usize {
        let mut cleared = 0;
        for cred in &mut self.credentials {
            if cred.cooldown_until.is_some_and(|until| until <= now) {
                cred.cooldown_until = None;
                cleared += 1;
            }
        }
        cleared
    }

    fn soonest_recovery(&self, now: Instant) -> Option<Duration> {
        self.credentials
            .iter()
            .filter_map(|c| c.cooldown_until)
            .map(|until| until.saturating_duration_since(now))
            .min()
    }

    fn position(&self, id: &CredentialId) -> Option<usize> {
        self.credentials.iter().position(|c| &c.id == id)
    }
}

/// Round-robin pool of provider credentials
#[derive(Debug)]
pub struct CredentialPool {
    state: Mutex<PoolState>,
}

impl CredentialPool {
    /// Create a pool. Fails on an empty set or duplicate ids.
    pub fn new(credentials: Vec<Credential>) -> Result<Self> {
        if credentials.is_empty() {
            return Err(Error::NotConfigured(
                "credential pool needs at least one credential".to_string(),
            ));
        }
        for (i, cred) in credentials.iter().enumerate() {
            if credentials[..i].iter().any(|c| c.id == cred.id) {
                return Err(Error::InvalidCredential {
                    id: cred.id.to_string(),
                    reason: "duplicate id".to_string(),
                });
            }
        }
        info!(count = credentials.len(), "Credential pool initialised");
        Ok(Self {
            state: Mutex::new(PoolState {
                credentials,
                cursor: 0,
                last_used: None,
            }),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Number of configured credentials
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().credentials.len()
    }

    /// Always false; an empty pool cannot be constructed
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().credentials.is_empty()
    }

    /// Pick the next usable credential.
    ///
    /// Scans at most twice: once over the current state and once more after
    /// sweeping expired cooldowns. If both passes find nothing the pool is
    /// exhausted.
    pub fn next(&self) -> std::result::Result<SelectedCredential, AllExhausted> {
        let mut state = self.lock();
        let now = Instant::now();

        for pass in 0..2 {
            if let Some(idx) = state.scan(now) {
                let cred = &state.credentials[idx];
                let selected = SelectedCredential {
                    id: cred.id.clone(),
                    secret: cred.secret.clone(),
                };
                debug!(credential = %selected.id, "Selected credential");
                state.last_used = Some(selected.id.clone());
                return Ok(selected);
            }
            if pass == 0 {
                let cleared = state.sweep(now);
                debug!(cleared, "Swept expired credential cooldowns");
            }
        }

        let exhausted = AllExhausted {
            total: state.credentials.len(),
            retry_in: state.soonest_recovery(now),
        };
        warn!(
            total = exhausted.total,
            retry_in_ms = exhausted.retry_in.map(|d| d.as_millis() as u64),
            "All credentials cooling down"
        );
        Err(exhausted)
    }

    /// Park a credential for `cooldown` and count the failure.
    ///
    /// If the cursor currently points at the failed credential it is moved
    /// on, so the next selection starts elsewhere.
    pub fn mark_failed(&self, id: &CredentialId, cooldown: Duration) {
        let mut state = self.lock();
        let now = Instant::now();
        let Some(idx) = state.position(id) else {
            warn!(credential = %id, "mark_failed on unknown credential");
            return;
        };

        let cred = &mut state.credentials[idx];
        cred.cooldown_until = Some(now + cooldown);
        cred.consecutive_failures = cred.consecutive_failures.saturating_add(1);
        let failures = cred.consecutive_failures;

        let n = state.credentials.len();
        if state.cursor == idx {
            state.cursor = (idx + 1) % n;
        }

        warn!(
            credential = %id,
            cooldown_ms = cooldown.as_millis() as u64,
            consecutive_failures = failures,
            "Credential put in cooldown"
        );
    }

    /// Reset the failure streak after a successful call.
    pub fn mark_succeeded(&self, id: &CredentialId) {
        let mut state = self.lock();
        if let Some(idx) = state.position(id) {
            state.credentials[idx].consecutive_failures = 0;
        }
    }

    /// Clear every cooldown that has elapsed. Returns how many were cleared.
    pub fn clean_expired(&self) -> usize {
        self.lock().sweep(Instant::now())
    }

    /// Failures since the credential's last success (0 if unknown)
    #[must_use]
    pub fn consecutive_failures(&self, id: &CredentialId) -> u32 {
        let state = self.lock();
        state
            .position(id)
            .map(|idx| state.credentials[idx].consecutive_failures)
            .unwrap_or(0)
    }

    /// Credentials not currently cooling down
    #[must_use]
    pub fn available_count(&self) -> usize {
        let now = Instant::now();
        self.lock()
            .credentials
            .iter()
            .filter(|c| !c.is_cooling(now))
            .count()
    }

    /// Most recently selected credential
    #[must_use]
    pub fn last_used(&self) -> Option<CredentialId> {
        self.lock().last_used.clone()
    }

    /// Drop all cooldowns and failure counts (operator escape hatch)
    pub fn reset_cooldowns(&self) {
        let mut state = self.lock();
        for cred in &mut state.credentials {
            cred.cooldown_until = None;
            cred.consecutive_failures = 0;
        }
        info!("Credential cooldowns reset");
    }

    /// Snapshot of every credential in pool order
    #[must_use]
    pub fn snapshot(&self) -> Vec<CredentialStatus> {
        let now = Instant::now();
        self.lock()
            .credentials
            .iter()
            .map(|c| {
                let remaining = c
                    .cooldown_until
                    .filter(|until| *until > now)
                    .map(|until| until.duration_since(now).as_millis() as u64);
                CredentialStatus {
                    id: c.id.to_string(),
                    key: c.masked_key(),
                    cooling: remaining.is_some(),
                    cooldown_remaining_ms: remaining,
                    consecutive_failures: c.consecutive_failures,
                }
            })
            .collect()
    }
}
