//! Error classification and retry-after parsing
//!
//! Structured signals (HTTP status, vendor error code) decide first. Message
//! matching is only the fallback for vendors that return neither.

use super::{ErrorKind, ProviderError};
use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;

/// First fallback delay for a rate-limited credential
const BACKOFF_BASE_MS: u64 = 1_000;

/// Longest fallback delay for a rate-limited credential
const BACKOFF_CAP_MS: u64 = 30_000;

static RETRY_IN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:retry|try again)\s+(?:in|after)\s+(\d+(?:\.\d+)?)\s*(milliseconds?|ms|minutes?|mins?|m|seconds?|secs?|s)\b",
    )
    .unwrap_or_else(|e| unreachable!("static pattern is valid: {e}"))
});

static RETRY_DELAY_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)"?retry_?delay"?\s*[:=]\s*"?(\d+(?:\.\d+)?)s"#)
        .unwrap_or_else(|e| unreachable!("static pattern is valid: {e}"))
});

static RESET_AFTER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)reset after\s+(\d+(?:\.\d+)?)\s*s")
        .unwrap_or_else(|e| unreachable!("static pattern is valid: {e}"))
});

/// Classify a failed call.
pub fn classify(error: &ProviderError) -> ErrorKind {
    if let Some(kind) = classify_status(error.status) {
        return kind;
    }
    if let Some(kind) = error.code.as_deref().and_then(classify_code) {
        return kind;
    }
    classify_message(&error.message)
}

fn classify_status(status: Option<u16>) -> Option<ErrorKind> {
    match status? {
        429 => Some(ErrorKind::RateLimited),
        413 => Some(ErrorKind::PayloadTooLarge),
        503 | 529 => Some(ErrorKind::Overloaded),
        401 | 403 => Some(ErrorKind::Fatal),
        _ => None,
    }
}

fn classify_code(code: &str) -> Option<ErrorKind> {
    match code.to_ascii_lowercase().as_str() {
        "resource_exhausted" | "rate_limit_exceeded" | "insufficient_quota" => {
            Some(ErrorKind::RateLimited)
        }
        "context_length_exceeded" | "request_too_large" | "string_above_max_length" => {
            Some(ErrorKind::PayloadTooLarge)
        }
        "unavailable" | "overloaded_error" | "server_overloaded" => Some(ErrorKind::Overloaded),
        _ => None,
    }
}

fn classify_message(message: &str) -> ErrorKind {
    let lower = message.to_lowercase();
    if lower.contains("rate limit") || lower.contains("quota") || lower.contains("resource_exhausted")
    {
        ErrorKind::RateLimited
    } else if lower.contains("token") {
        ErrorKind::PayloadTooLarge
    } else if lower.contains("overload") || lower.contains("capacity") {
        ErrorKind::Overloaded
    } else {
        ErrorKind::Fatal
    }
}

/// Pull a retry-after duration out of free-form vendor text.
///
/// Understands `retry in 12.5s`, `try again in 2m`, `retry after 800ms`,
/// `"retryDelay": "5s"` and `reset after 7s`.
#[must_use]
pub fn parse_retry_after(text: &str) -> Option<Duration> {
    if let Some(caps) = RETRY_IN.captures(text) {
        let value: f64 = caps[1].parse().ok()?;
        let unit = caps[2].to_ascii_lowercase();
        let secs = if unit.starts_with("ms") || unit.starts_with("milli") {
            value / 1000.0
        } else if unit.starts_with('m') {
            value * 60.0
        } else {
            value
        };
        return Duration::try_from_secs_f64(secs).ok();
    }

    [&*RETRY_DELAY_FIELD, &*RESET_AFTER]
        .iter()
        .find_map(|re| re.captures(text))
        .and_then(|caps| caps[1].parse::<f64>().ok())
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
}

/// Fallback cooldown for a rate-limited credential with no retry hint:
/// `min(1000 * 2^failures, 30000)` ms.
#[must_use]
pub fn exponential_backoff(consecutive_failures: u32) -> Duration {
    let factor = 1u64.checked_shl(consecutive_failures).unwrap_or(u64::MAX);
    Duration::from_millis(BACKOFF_BASE_MS.saturating_mul(factor).min(BACKOFF_CAP_MS))
}
