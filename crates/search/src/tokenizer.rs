//! Tokenization for text indexing and search (spec.md §4.6).
//!
//! Splits on Unicode letter/number boundaries, casefolds, drops
//! stopwords and anything shorter than 2 characters. The stopword set is
//! carried as literal data (spec.md §9 open question) rather than
//! re-derived, following a standard short English stopword list.

use std::collections::HashSet;
use std::sync::OnceLock;

/// Minimum token length kept after stopword filtering (spec.md §4.6).
pub const MIN_TOKEN_LEN: usize = 2;

const STOPWORD_LIST: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "been", "being", "but", "by", "can", "did", "do",
    "does", "doing", "down", "for", "from", "had", "has", "have", "having", "he", "her", "here",
    "hers", "him", "his", "how", "i", "if", "in", "into", "is", "it", "its", "itself", "just",
    "me", "more", "most", "my", "myself", "no", "nor", "not", "of", "off", "on", "once", "only",
    "or", "other", "our", "ours", "out", "over", "own", "same", "she", "should", "so", "some",
    "such", "than", "that", "the", "their", "theirs", "them", "themselves", "then", "there",
    "these", "they", "this", "those", "through", "to", "too", "under", "until", "up", "very",
    "was", "we", "were", "what", "when", "where", "which", "while", "who", "whom", "why", "will",
    "with", "you", "your", "yours", "yourself", "yourselves",
];

fn stopwords() -> &'static HashSet<&'static str> {
    static SET: OnceLock<HashSet<&'static str>> = OnceLock::new();
    SET.get_or_init(|| STOPWORD_LIST.iter().copied().collect())
}

pub fn is_stopword(token: &str) -> bool {
    stopwords().contains(token)
}

/// Tokenize `text` into lowercase terms: split on non-alphanumeric
/// Unicode boundaries, drop stopwords and tokens shorter than
/// [`MIN_TOKEN_LEN`].
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric()))
        .filter(|s| s.chars().count() >= MIN_TOKEN_LEN)
        .filter(|s| !is_stopword(s))
        .map(String::from)
        .collect()
}

/// Tokenize preserving stopwords and short tokens — used when checking
/// for exact phrase matches, where the query's literal sequence matters.
pub fn tokenize_raw(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric()))
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
