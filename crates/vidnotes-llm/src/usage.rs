//! Daily token budgets per invocation domain
//!
//! Each domain ("notes", "charts", "chat", ...) accumulates token usage in
//! a rolling 24 hour window. The limit is soft: crossing it is logged and
//! reported, never enforced. The provider remains the real rate-limiting
//! authority.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Share of the daily limit at which a domain counts as near its limit
pub const NEAR_LIMIT_RATIO: f64 = 0.9;

/// Length of a budget window
pub const BUDGET_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

// ============================================================================
// Types
// ============================================================================

/// Where a domain stands against its daily limit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetState {
    /// Below 90% of the limit
    Active,
    /// At or above 90% of the limit
    NearLimit,
    /// At or above the limit (soft; calls still go through)
    Exhausted,
}

/// Usage of one domain in the current window
#[derive(Debug, Clone)]
pub struct TokenBudget {
    /// Domain name
    pub domain: String,
    /// Soft daily limit
    pub daily_limit: u64,
    /// Tokens recorded in this window
    pub used_today: u64,
    /// Monotonic window start, drives expiry
    pub window_started_at: Instant,
    /// Wall-clock window start, for display
    pub window_started_wall: DateTime<Utc>,
}

impl TokenBudget {
    fn new(domain: &str, daily_limit: u64) -> Self {
        Self {
            domain: domain.to_string(),
            daily_limit,
            used_today: 0,
            window_started_at: Instant::now(),
            window_started_wall: Utc::now(),
        }
    }

    /// State against the limit
    #[must_use]
    pub fn state(&self) -> BudgetState {
        if self.daily_limit == 0 || self.used_today >= self.daily_limit {
            BudgetState::Exhausted
        } else if self.used_today as f64 >= self.daily_limit as f64 * NEAR_LIMIT_RATIO {
            BudgetState::NearLimit
        } else {
            BudgetState::Active
        }
    }

    /// Percentage of the limit used (may exceed 100)
    #[must_use]
    pub fn usage_pct(&self) -> f64 {
        if self.daily_limit == 0 {
            return 100.0;
        }
        self.used_today as f64 / self.daily_limit as f64 * 100.0
    }

    fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.window_started_at) >= BUDGET_WINDOW
    }

    fn reset(&mut self) {
        self.used_today = 0;
        self.window_started_at = Instant::now();
        self.window_started_wall = Utc::now();
    }

    fn snapshot(&self) -> BudgetSnapshot {
        BudgetSnapshot {
            domain: self.domain.clone(),
            used_today: self.used_today,
            daily_limit: self.daily_limit,
            usage_pct: self.usage_pct(),
            state: self.state(),
            window_started_at: self.window_started_wall,
        }
    }
}

/// Serializable view of a [`TokenBudget`]
#[derive(Debug, Clone, Serialize)]
pub struct BudgetSnapshot {
    /// Domain name
    pub domain: String,
    /// Tokens recorded in this window
    pub used_today: u64,
    /// Soft daily limit
    pub daily_limit: u64,
    /// Percentage used
    pub usage_pct: f64,
    /// State against the limit
    pub state: BudgetState,
    /// When the window started
    pub window_started_at: DateTime<Utc>,
}

/// `[usage]` configuration section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageConfig {
    /// Daily limit for domains without an override
    #[serde(default = "default_daily_limit")]
    pub default_daily_limit: u64,
    /// How often the background task looks for expired windows
    #[serde(default = "default_reset_check_interval_ms")]
    pub reset_check_interval_ms: u64,
}

fn default_daily_limit() -> u64 {
    1_000_000
}

fn default_reset_check_interval_ms() -> u64 {
    60_000
}

impl Default for UsageConfig {
    fn default() -> Self {
        Self {
            default_daily_limit: default_daily_limit(),
            reset_check_interval_ms: default_reset_check_interval_ms(),
        }
    }
}

impl UsageConfig {
    /// Reset check interval as a [`Duration`]
    #[must_use]
    pub fn reset_check_interval(&self) -> Duration {
        Duration::from_millis(self.reset_check_interval_ms.max(1))
    }
}

// ============================================================================
// TokenBudgetMonitor
// ============================================================================

/// Thread-safe, in-memory tracker of per-domain daily token usage.
#[derive(Debug)]
pub struct TokenBudgetMonitor {
    budgets: RwLock<HashMap<String, TokenBudget>>,
    default_daily_limit: u64,
    domain_limits: HashMap<String, u64>,
}

impl TokenBudgetMonitor {
    /// Create a monitor where every domain gets `default_daily_limit`
    #[must_use]
    pub fn new(default_daily_limit: u64) -> Self {
        Self {
            budgets: RwLock::new(HashMap::new()),
            default_daily_limit,
            domain_limits: HashMap::new(),
        }
    }

    /// Override the limit for one domain
    #[must_use]
    pub fn with_domain_limit(mut self, domain: impl Into<String>, limit: u64) -> Self {
        self.domain_limits.insert(domain.into(), limit);
        self
    }

    fn limit_for(&self, domain: &str) -> u64 {
        self.domain_limits
            .get(domain)
            .copied()
            .unwrap_or(self.default_daily_limit)
    }

    /// Add `tokens_used` to a domain and return its new state.
    ///
    /// Resets an expired window first. Logs when the domain crosses into
    /// near-limit or past the limit; never blocks.
    pub async fn record(&self, domain: &str, tokens_used: u64) -> BudgetState {
        let now = Instant::now();
        let limit = self.limit_for(domain);
        let mut budgets = self.budgets.write().await;
        let budget = budgets
            .entry(domain.to_string())
            .or_insert_with(|| TokenBudget::new(domain, limit));

        if budget.is_expired(now) {
            info!(domain, used = budget.used_today, "Token budget window expired, resetting");
            budget.reset();
        }

        let before = budget.state();
        budget.used_today = budget.used_today.saturating_add(tokens_used);
        let after = budget.state();

        if after != before {
            match after {
                BudgetState::NearLimit => warn!(
                    domain,
                    used = budget.used_today,
                    limit = budget.daily_limit,
                    "Domain is near its daily token limit"
                ),
                BudgetState::Exhausted => warn!(
                    domain,
                    used = budget.used_today,
                    limit = budget.daily_limit,
                    "Domain exceeded its daily token limit (soft limit, not enforced)"
                ),
                BudgetState::Active => {}
            }
        }
        debug!(domain, tokens_used, used = budget.used_today, "Recorded token usage");
        after
    }

    /// True at or above 90% of the domain's limit
    pub async fn is_near_limit(&self, domain: &str) -> bool {
        self.budgets
            .read()
            .await
            .get(domain)
            .is_some_and(|b| b.state() != BudgetState::Active)
    }

    /// Reset a domain whose window is at least 24h old. Returns whether it
    /// was reset.
    pub async fn reset_if_expired(&self, domain: &str) -> bool {
        let now = Instant::now();
        let mut budgets = self.budgets.write().await;
        match budgets.get_mut(domain) {
            Some(b) if b.is_expired(now) => {
                info!(domain, used = b.used_today, "Token budget window expired, resetting");
                b.reset();
                true
            }
            _ => false,
        }
    }

    /// Reset every expired domain. Returns the domains that were reset.
    pub async fn reset_expired(&self) -> Vec<String> {
        let now = Instant::now();
        let mut budgets = self.budgets.write().await;
        let mut reset = Vec::new();
        for (domain, b) in budgets.iter_mut() {
            if b.is_expired(now) {
                b.reset();
                reset.push(domain.clone());
            }
        }
        if !reset.is_empty() {
            info!(domains = ?reset, "Token budget windows reset");
        }
        reset
    }

    /// Unconditionally start a new window for a domain (operator action)
    pub async fn reset(&self, domain: &str) {
        if let Some(b) = self.budgets.write().await.get_mut(domain) {
            b.reset();
            info!(domain, "Token budget reset");
        }
    }

    /// Current usage of one domain
    pub async fn get(&self, domain: &str) -> Option<BudgetSnapshot> {
        self.budgets.read().await.get(domain).map(TokenBudget::snapshot)
    }

    /// Current usage of every domain seen so far, sorted by name
    pub async fn snapshots(&self) -> Vec<BudgetSnapshot> {
        let mut out: Vec<BudgetSnapshot> = self
            .budgets
            .read()
            .await
            .values()
            .map(TokenBudget::snapshot)
            .collect();
        out.sort_by(|a, b| a.domain.cmp(&b.domain));
        out
    }

    /// Periodically reset expired windows until `shutdown` is cancelled.
    pub fn spawn_reset_task(
        self: Arc<Self>,
        check_interval: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(check_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        debug!("Token budget reset task stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        self.reset_expired().await;
                    }
                }
            }
        })
    }
}

impl Default for TokenBudgetMonitor {
    fn default() -> Self {
        Self::new(default_daily_limit())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_record_accumulates() {
        let m = TokenBudgetMonitor::new(1000);
        m.record("notes", 100).await;
        m.record("notes", 250).await;
        assert_eq!(m.get("notes").await.unwrap().used_today, 350);
        assert!(m.get("charts").await.is_none());
    }

    #[tokio::test]
    async fn test_near_limit_at_ninety_percent() {
        let m = TokenBudgetMonitor::new(1000);
        assert_eq!(m.record("chat", 899).await, BudgetState::Active);
        assert!(!m.is_near_limit("chat").await);

        assert_eq!(m.record("chat", 1).await, BudgetState::NearLimit);
        assert!(m.is_near_limit("chat").await);

        // Soft limit: recording past the limit still succeeds
        assert_eq!(m.record("chat", 5000).await, BudgetState::Exhausted);
        assert_eq!(m.get("chat").await.unwrap().used_today, 5900);
    }

    #[tokio::test]
    async fn test_domains_are_independent() {
        let m = TokenBudgetMonitor::new(1000).with_domain_limit("charts", 100);
        m.record("charts", 95).await;
        m.record("notes", 95).await;
        assert!(m.is_near_limit("charts").await);
        assert!(!m.is_near_limit("notes").await);
        assert_eq!(m.get("charts").await.unwrap().daily_limit, 100);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_resets_after_24h() {
        let m = TokenBudgetMonitor::new(1000);
        m.record("notes", 950).await;
        assert!(!m.reset_if_expired("notes").await);

        tokio::time::advance(BUDGET_WINDOW - Duration::from_secs(1)).await;
        assert!(!m.reset_if_expired("notes").await);

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(m.reset_if_expired("notes").await);
        assert_eq!(m.get("notes").await.unwrap().used_today, 0);
        assert!(!m.is_near_limit("notes").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_record_resets_stale_window() {
        let m = TokenBudgetMonitor::new(1000);
        m.record("notes", 900).await;
        tokio::time::advance(BUDGET_WINDOW).await;
        m.record("notes", 10).await;
        assert_eq!(m.get("notes").await.unwrap().used_today, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_reset_task() {
        let m = Arc::new(TokenBudgetMonitor::new(1000));
        m.record("notes", 500).await;
        m.record("chat", 10).await;

        let shutdown = CancellationToken::new();
        let handle = m
            .clone()
            .spawn_reset_task(Duration::from_secs(60), shutdown.clone());

        tokio::time::sleep(BUDGET_WINDOW + Duration::from_secs(61)).await;
        assert_eq!(m.get("notes").await.unwrap().used_today, 0);
        assert_eq!(m.get("chat").await.unwrap().used_today, 0);

        shutdown.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_manual_reset() {
        let m = TokenBudgetMonitor::new(1000);
        m.record("notes", 990).await;
        m.reset("notes").await;
        let snap = m.get("notes").await.unwrap();
        assert_eq!(snap.used_today, 0);
        assert_eq!(snap.state, BudgetState::Active);
    }

    #[tokio::test]
    async fn test_snapshots_sorted() {
        let m = TokenBudgetMonitor::new(1000);
        m.record("notes", 1).await;
        m.record("charts", 1).await;
        let domains: Vec<String> = m.snapshots().await.into_iter().map(|s| s.domain).collect();
        assert_eq!(domains, vec!["charts", "notes"]);
    }
}
