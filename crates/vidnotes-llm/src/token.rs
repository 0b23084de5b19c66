//! Token estimation and prompt budgeting
//!
//! Token counts here are a fixed characters/4 heuristic, not a real
//! tokenizer. Treat every number as an approximation.

use crate::message::{Message, MessageRole};
use serde::{Deserialize, Serialize};

/// Characters per estimated token
pub const CHARS_PER_TOKEN: usize = 4;

/// Packing stops adding ordinary lines past this share of the target
const SOFT_FILL_RATIO: f64 = 0.8;

/// Packing stops entirely past this share of the target
const HARD_STOP_RATIO: f64 = 0.9;

/// Appended to shortened history lines
pub const HISTORY_ELLIPSIS: &str = " [...]";

/// Estimate tokens in a string
#[must_use]
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

/// Estimate tokens across a conversation
#[must_use]
pub fn estimate_message_tokens(messages: &[Message]) -> usize {
    messages.iter().map(|m| estimate_tokens(&m.content)).sum()
}

// ============================================================================
// Prompt Budgeter
// ============================================================================

/// Result of [`PromptBudgeter::truncate`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Truncation {
    /// Prompt after packing
    pub text: String,
    /// Whether anything was dropped or shortened
    pub was_truncated: bool,
}

/// Line-based prompt packer
///
/// Lines starting with a high-priority marker are always kept. Other lines
/// are kept while the running estimate stays under 80% of the target;
/// history lines that no longer fit are shortened to a prefix instead of
/// being dropped. If no ordinary line fits at all, the first one is cut to
/// the space left so the body never disappears entirely. Once the estimate
/// reaches 90% only high-priority lines are still taken. Line order never
/// changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptBudgeter {
    /// Line prefixes that are never dropped (case-insensitive)
    #[serde(default = "default_high_priority_markers")]
    pub high_priority_markers: Vec<String>,
    /// Line prefixes that mark transcript or prior output (case-insensitive)
    #[serde(default = "default_history_markers")]
    pub history_markers: Vec<String>,
    /// Characters kept from a shortened history line
    #[serde(default = "default_history_prefix_chars")]
    pub history_prefix_chars: usize,
}

fn default_high_priority_markers() -> Vec<String> {
    ["#", "system:", "instructions:", "important:", "task:", "format:"]
        .iter()
        .map(|s| (*s).to_string())
        .collect()
}

fn default_history_markers() -> Vec<String> {
    [
        "user:",
        "assistant:",
        "human:",
        "ai:",
        "transcript:",
        "previous:",
        "[",
    ]
    .iter()
    .map(|s| (*s).to_string())
    .collect()
}

fn default_history_prefix_chars() -> usize {
    160
}

impl Default for PromptBudgeter {
    fn default() -> Self {
        Self {
            high_priority_markers: default_high_priority_markers(),
            history_markers: default_history_markers(),
            history_prefix_chars: default_history_prefix_chars(),
        }
    }
}

fn starts_with_any(line: &str, markers: &[String]) -> bool {
    let head = line.trim_start().to_lowercase();
    markers.iter().any(|m| head.starts_with(m.as_str()))
}

impl PromptBudgeter {
    fn is_high_priority(&self, line: &str) -> bool {
        starts_with_any(line, &self.high_priority_markers)
    }

    fn is_history(&self, line: &str) -> bool {
        starts_with_any(line, &self.history_markers)
    }

    fn cut_to_fit(line: &str, tokens: usize) -> String {
        let cut: String = line.chars().take(tokens * CHARS_PER_TOKEN).collect();
        cut.trim_end().to_string()
    }

    fn shorten(&self, line: &str) -> String {
        let prefix: String = line.chars().take(self.history_prefix_chars).collect();
        format!("{}{}", prefix.trim_end(), HISTORY_ELLIPSIS)
    }

    /// Pack `prompt` into roughly `target_tokens`.
    ///
    /// Best effort: high-priority lines can push the result over target.
    #[must_use]
    pub fn truncate(&self, prompt: &str, target_tokens: usize) -> Truncation {
        if estimate_tokens(prompt) <= target_tokens {
            return Truncation {
                text: prompt.to_string(),
                was_truncated: false,
            };
        }

        let soft = target_tokens as f64 * SOFT_FILL_RATIO;
        let hard = target_tokens as f64 * HARD_STOP_RATIO;
        let mut running = 0usize;
        let mut kept: Vec<String> = Vec::new();
        let mut kept_body = false;
        let mut was_truncated = false;

        for line in prompt.lines() {
            // +1 for the newline that joins lines back together
            let cost = estimate_tokens(line) + 1;

            if self.is_high_priority(line) {
                kept.push(line.to_string());
                running += cost;
                continue;
            }

            if running as f64 >= hard {
                was_truncated = true;
                continue;
            }

            if ((running + cost) as f64) < soft {
                kept.push(line.to_string());
                running += cost;
                kept_body |= !line.trim().is_empty();
                continue;
            }

            was_truncated = true;
            if self.is_history(line) {
                let short = self.shorten(line);
                let short_cost = estimate_tokens(&short) + 1;
                if short.chars().count() < line.chars().count()
                    && ((running + short_cost) as f64) < hard
                {
                    kept.push(short);
                    running += short_cost;
                    kept_body = true;
                    continue;
                }
            }

            if !kept_body {
                // single oversized line (e.g. an unbroken transcript)
                let room = (soft as usize).saturating_sub(running + 1);
                let cut = Self::cut_to_fit(line, room);
                if !cut.is_empty() {
                    running += estimate_tokens(&cut) + 1;
                    kept.push(cut);
                    kept_body = true;
                }
            }
        }

        Truncation {
            text: kept.join("\n"),
            was_truncated,
        }
    }

    /// Fit a conversation into `budget_tokens`.
    ///
    /// Only the last user message is packed; every other message counts
    /// against the budget unchanged.
    #[must_use]
    pub fn fit_messages(&self, messages: &[Message], budget_tokens: usize) -> (Vec<Message>, bool) {
        let total = estimate_message_tokens(messages);
        if total <= budget_tokens {
            return (messages.to_vec(), false);
        }

        let Some(target_idx) = messages
            .iter()
            .rposition(|m| m.role == MessageRole::User)
            .or_else(|| messages.len().checked_sub(1))
        else {
            return (Vec::new(), false);
        };

        let others = total - estimate_tokens(&messages[target_idx].content);
        let target = budget_tokens.saturating_sub(others).max(1);
        let packed = self.truncate(&messages[target_idx].content, target);

        let mut out = messages.to_vec();
        out[target_idx].content = packed.text;
        (out, packed.was_truncated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
        assert_eq!(estimate_tokens(&"x".repeat(36_000)), 9000);
    }

    #[test]
    fn test_estimate_message_tokens() {
        let messages = vec![Message::system("abcd"), Message::user("abcdefgh")];
        assert_eq!(estimate_message_tokens(&messages), 3);
    }

    #[test]
    fn test_short_prompt_untouched() {
        let b = PromptBudgeter::default();
        let t = b.truncate("hello\nworld", 100);
        assert_eq!(t.text, "hello\nworld");
        assert!(!t.was_truncated);
    }

    #[test]
    fn test_high_priority_lines_always_kept() {
        let b = PromptBudgeter::default();
        let filler = "f".repeat(200);
        let mut lines = vec!["# Notes format".to_string()];
        lines.extend((0..20).map(|_| filler.clone()));
        lines.push("IMPORTANT: answer in markdown".to_string());
        let prompt = lines.join("\n");

        let t = b.truncate(&prompt, 200);
        assert!(t.was_truncated);
        assert!(t.text.starts_with("# Notes format"));
        assert!(t.text.ends_with("IMPORTANT: answer in markdown"));
        assert!(estimate_tokens(&t.text) < estimate_tokens(&prompt));
    }

    #[test]
    fn test_order_is_preserved() {
        let b = PromptBudgeter::default();
        let prompt = (0..50)
            .map(|i| format!("line {i:02} {}", "x".repeat(40)))
            .collect::<Vec<_>>()
            .join("\n");
        let t = b.truncate(&prompt, 200);
        let nums: Vec<u32> = t
            .text
            .lines()
            .map(|l| l[5..7].parse().unwrap())
            .collect();
        let mut sorted = nums.clone();
        sorted.sort_unstable();
        assert_eq!(nums, sorted);
        assert!(t.was_truncated);
    }

    #[test]
    fn test_history_lines_shortened_not_dropped() {
        let b = PromptBudgeter {
            history_prefix_chars: 20,
            ..PromptBudgeter::default()
        };
        let long_turn = format!("User: {}", "q".repeat(400));
        let prompt = format!("{}\n{}", "n".repeat(300), long_turn);

        let t = b.truncate(&prompt, 120);
        assert!(t.was_truncated);
        let last = t.text.lines().last().unwrap();
        assert!(last.starts_with("User: "));
        assert!(last.ends_with(HISTORY_ELLIPSIS));
    }

    #[test]
    fn test_stays_near_budget_without_priority_lines() {
        let b = PromptBudgeter::default();
        let prompt = (0..200)
            .map(|_| "y".repeat(80))
            .collect::<Vec<_>>()
            .join("\n");
        let t = b.truncate(&prompt, 1000);
        assert!(estimate_tokens(&t.text) <= 1000);
    }

    #[test]
    fn test_fit_messages_packs_last_user_message() {
        let b = PromptBudgeter::default();
        let body = (0..100)
            .map(|_| "z".repeat(100))
            .collect::<Vec<_>>()
            .join("\n");
        let messages = vec![
            Message::system("You write study notes."),
            Message::user(body.clone()),
        ];

        let (fitted, truncated) = b.fit_messages(&messages, 500);
        assert!(truncated);
        assert_eq!(fitted[0], messages[0]);
        assert!(fitted[1].content.len() < body.len());
        assert!(estimate_message_tokens(&fitted) <= 500);
    }

    #[test]
    fn test_single_long_line_is_cut_not_dropped() {
        let b = PromptBudgeter::default();
        let transcript = "so today we talk about the krebs cycle ".repeat(2000);
        let t = b.truncate(&transcript, 500);
        assert!(t.was_truncated);
        assert!(!t.text.is_empty());
        assert!(transcript.starts_with(&t.text));
        assert!(estimate_tokens(&t.text) <= 400);
    }

    #[test]
    fn test_fit_messages_keeps_part_of_unbroken_transcript() {
        let b = PromptBudgeter::default();
        let messages = vec![
            Message::system("Write notes."),
            Message::user("so today we talk about the krebs cycle ".repeat(2000)),
        ];
        let (fitted, truncated) = b.fit_messages(&messages, 1000);
        assert!(truncated);
        assert!(fitted[1].content.starts_with("so today we talk"));
        assert!(estimate_message_tokens(&fitted) <= 1000);
    }

    #[test]
    fn test_fit_messages_noop_when_within_budget() {
        let b = PromptBudgeter::default();
        let messages = vec![Message::user("short")];
        let (fitted, truncated) = b.fit_messages(&messages, 100);
        assert!(!truncated);
        assert_eq!(fitted, messages);
    }
}
