//! Key hygiene helpers shared by the pool, providers and status output.

use regex::Regex;
use std::sync::LazyLock;

/// Keys at or below this length are fully masked
const MIN_KEY_LENGTH_FOR_PARTIAL_DISPLAY: usize = 8;

/// Characters shown at each end of a masked key
const KEY_MASK_VISIBLE_CHARS: usize = 4;

/// Longest provider message carried into diagnostics
const MAX_DIAGNOSTIC_LEN: usize = 300;

static KEY_LIKE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)((?:api[_-]?key|key|token|bearer)\s*[=:]?\s*)["']?[A-Za-z0-9_\-\.]{12,}"#)
        .unwrap_or_else(|e| unreachable!("static pattern is valid: {e}"))
});

/// Mask an API key for logs and status output
///
/// # Examples
/// ```
/// use vidnotes_llm::util::mask_api_key;
/// assert_eq!(mask_api_key("AIzaSy0123456789wxyz"), "AIza...wxyz");
/// assert_eq!(mask_api_key("short"), "****");
/// ```
#[must_use]
pub fn mask_api_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= MIN_KEY_LENGTH_FOR_PARTIAL_DISPLAY {
        return "****".to_string();
    }
    let head: String = chars[..KEY_MASK_VISIBLE_CHARS].iter().collect();
    let tail: String = chars[chars.len() - KEY_MASK_VISIBLE_CHARS..].iter().collect();
    format!("{head}...{tail}")
}

/// Strip key-looking material from a provider message and cap its length.
///
/// Provider error bodies sometimes echo the request URL or header, so this
/// runs on everything that ends up in an `InvocationError`.
#[must_use]
pub fn sanitize_provider_message(message: &str) -> String {
    let scrubbed = KEY_LIKE.replace_all(message, "${1}[redacted]");
    let trimmed = scrubbed.trim();
    if trimmed.chars().count() > MAX_DIAGNOSTIC_LEN {
        let cut: String = trimmed.chars().take(MAX_DIAGNOSTIC_LEN).collect();
        format!("{cut}...")
    } else {
        trimmed.to_string()
    }
}

/// Validate API key is not empty and has minimum length
///
/// Returns an error message if validation fails, None if valid.
#[must_use]
pub fn validate_api_key(key: &str, credential_id: &str) -> Option<String> {
    if key.trim().is_empty() {
        return Some(format!("credential {credential_id} has an empty key"));
    }
    if key.len() < MIN_KEY_LENGTH_FOR_PARTIAL_DISPLAY {
        return Some(format!(
            "credential {credential_id} key appears to be invalid (too short)"
        ));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_api_key_long() {
        let masked = mask_api_key("sk-1234567890abcdefghij");
        assert_eq!(masked, "sk-1...ghij");
        assert!(!masked.contains("567890"));
    }

    #[test]
    fn test_mask_api_key_short() {
        assert_eq!(mask_api_key(""), "****");
        assert_eq!(mask_api_key("12345678"), "****");
    }

    #[test]
    fn test_sanitize_redacts_keys() {
        let msg = "request to /v1/models?key=AIzaSyABCDEFGHIJKLMNOP failed";
        let clean = sanitize_provider_message(msg);
        assert!(!clean.contains("AIzaSyABCDEFGHIJKLMNOP"));
        assert!(clean.contains("[redacted]"));
    }

    #[test]
    fn test_sanitize_keeps_plain_messages() {
        let msg = "Please retry in 12.5s";
        assert_eq!(sanitize_provider_message(msg), msg);
    }

    #[test]
    fn test_sanitize_caps_length() {
        let long = "x ".repeat(400);
        let clean = sanitize_provider_message(&long);
        assert!(clean.ends_with("..."));
        assert!(clean.chars().count() <= MAX_DIAGNOSTIC_LEN + 3);
    }

    #[test]
    fn test_validate_api_key() {
        assert!(validate_api_key("", "k1").is_some());
        assert!(validate_api_key("short", "k1").is_some());
        assert!(validate_api_key("valid-api-key-12345", "k1").is_none());
    }
}
