//! Pure priority classifier applied to raw input before ingest (spec.md
//! §4.11).
//!
//! Rules are evaluated in order: a P0 keyword wins over a P1 verb, which
//! wins over the length/filler check. Nothing here touches storage —
//! `classify` is a pure function of the input string.

/// Priority tier assigned to a candidate memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Priority {
    /// Urgent: security, outage, deadline, large monetary figures.
    P0,
    /// Decision/commitment language.
    P1,
    /// Substantive but not urgent or decisive.
    P2,
    /// Filler: greeting, ack, emoji-only, too short. Dropped.
    P3,
}

/// Minimum length, in characters, below which input is always P3
/// regardless of content (spec.md §4.11).
pub const P3_HARD_FLOOR_CHARS: usize = 15;

const P0_KEYWORDS: &[&str] = &[
    "critical",
    "security",
    "breach",
    "outage",
    "urgent",
    "emergency",
    "deadline",
    "vulnerability",
    "incident",
    "down",
    "data loss",
    "compromised",
];

const P1_KEYWORDS: &[&str] = &[
    "decided",
    "decide",
    "decision",
    "choose",
    "chose",
    "chosen",
    "assign",
    "assigned",
    "we will use",
    "we'll use",
    "going with",
    "switching to",
    "adopted",
    "migrate to",
    "picked",
];

const P3_FILLER_PATTERNS: &[&str] = &[
    "hi", "hello", "hey", "thanks", "thank you", "ok", "okay", "yep", "yes", "no", "sure",
    "cool", "nice", "lol", "haha", "good morning", "good night", "bye", "see you",
];

/// A large monetary amount — a currency sign (`$`, `€`, `£`) followed by
/// four or more digits, ignoring thousands separators.
fn has_large_currency_amount(text: &str) -> bool {
    let chars: Vec<char> = text.chars().collect();
    for (i, &c) in chars.iter().enumerate() {
        if c == '$' || c == '€' || c == '£' {
            let digit_count = chars[i + 1..]
                .iter()
                .take_while(|c| c.is_ascii_digit() || **c == ',')
                .filter(|c| c.is_ascii_digit())
                .count();
            if digit_count >= 4 {
                return true;
            }
        }
    }
    false
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

fn normalized(text: &str) -> String {
    text.to_lowercase()
}

fn is_filler_only(lower: &str) -> bool {
    let trimmed = lower.trim().trim_matches(|c: char| c == '!' || c == '.' || c == '?');
    if trimmed.is_empty() {
        return true;
    }
    P3_FILLER_PATTERNS.contains(&trimmed) || trimmed.chars().all(|c| !c.is_alphanumeric())
}

/// Classify `text` into a [`Priority`] tier. `p2_threshold_chars` comes
/// from workspace config (spec.md §4.11 default 40).
pub fn classify(text: &str, p2_threshold_chars: usize) -> Priority {
    let lower = normalized(text);
    let len = text.chars().count();

    if len < P3_HARD_FLOOR_CHARS {
        return Priority::P3;
    }
    if contains_any(&lower, P0_KEYWORDS) || has_large_currency_amount(text) {
        return Priority::P0;
    }
    if contains_any(&lower, P1_KEYWORDS) {
        return Priority::P1;
    }
    if len >= p2_threshold_chars && !is_filler_only(&lower) {
        return Priority::P2;
    }
    Priority::P3
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn p0_keyword_wins() {
        assert_eq!(
            classify("CRITICAL: production database outage affecting all users", 40),
            Priority::P0
        );
    }

    #[test]
    fn p0_large_currency_amount() {
        assert_eq!(
            classify("The new contract is worth $45,000 over the next year", 40),
            Priority::P0
        );
    }

    #[test]
    fn p1_decision_language() {
        assert_eq!(
            classify("We decided to migrate the billing service to Stripe", 40),
            Priority::P1
        );
    }

    #[test]
    fn p2_substantive_but_not_decisive() {
        assert_eq!(
            classify("The onboarding flow takes about ten minutes for a new user", 40),
            Priority::P2
        );
    }

    #[test]
    fn p3_short_greeting_dropped() {
        assert_eq!(classify("hey thanks!", 40), Priority::P3);
    }

    #[test]
    fn p3_under_hard_floor() {
        assert_eq!(classify("ok sounds good", 40), Priority::P3);
    }

    #[test]
    fn p3_emoji_only() {
        assert_eq!(classify("👍👍👍👍👍👍👍👍👍👍👍👍👍👍👍👍", 40), Priority::P3);
    }

    #[test]
    fn p2_threshold_respects_config() {
        let text = "A medium length note about quarterly metrics";
        assert_eq!(classify(text, 40), Priority::P2);
        assert_eq!(classify(text, 1000), Priority::P3);
    }
}
