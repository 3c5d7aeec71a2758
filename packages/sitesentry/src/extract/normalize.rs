//! Text normalization for stable fingerprints.
//!
//! Pages churn benignly: timestamps tick, session ids rotate, CSRF tokens and
//! nonces regenerate on every render. Normalization strips these shapes so
//! fingerprints only move when content actually moves.

use std::collections::HashSet;

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Patterns known to change without the page meaningfully changing.
    /// Extendable through [`crate::extract::ContentExtractor::with_benign_pattern`].
    pub static ref BENIGN_PATTERNS: Vec<Regex> = vec![
        // ISO-8601-like timestamps: 2025-01-31T10:00:00Z, 2025-01-31 10:00
        Regex::new(r"(?i)\d{4}-\d{2}-\d{2}[t ]\d{2}:\d{2}(:\d{2})?(\.\d+)?(z|[+-]\d{2}:?\d{2})?")
            .unwrap(),
        // Bare dates and clock times
        Regex::new(r"\d{4}-\d{2}-\d{2}").unwrap(),
        Regex::new(r"\b\d{1,2}:\d{2}(:\d{2})?\s*(am|pm)?\b").unwrap(),
        // Session identifiers in query strings or cookies echoed into markup
        Regex::new(r"(?i)(phpsessid|jsessionid|sessionid|session_id|sid)=[a-z0-9_-]+").unwrap(),
        // CSRF tokens and nonces
        Regex::new(r#"(?i)(csrf[_-]?token|authenticity_token|nonce|_token)["'=:\s]+[a-z0-9+/=_-]{8,}"#)
            .unwrap(),
        // Long hex blobs (cache busters, request ids)
        Regex::new(r"\b[0-9a-f]{32,}\b").unwrap(),
    ];

    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
}

lazy_static! {
    /// Fixed stopword set applied before keyword comparison.
    pub static ref STOPWORDS: HashSet<&'static str> = [
        "a", "about", "after", "all", "also", "an", "and", "any", "are", "as", "at", "be",
        "because", "been", "before", "but", "by", "can", "could", "did", "do", "does", "for",
        "from", "had", "has", "have", "he", "her", "here", "him", "his", "how", "i", "if", "in",
        "into", "is", "it", "its", "just", "me", "more", "most", "my", "no", "not", "now", "of",
        "on", "one", "only", "or", "other", "our", "out", "over", "she", "so", "some", "such",
        "than", "that", "the", "their", "them", "then", "there", "these", "they", "this", "to",
        "under", "up", "us", "was", "we", "were", "what", "when", "where", "which", "who", "why",
        "will", "with", "would", "you", "your",
    ]
    .into_iter()
    .collect();
}

/// Lowercase, strip benign-churn patterns, collapse whitespace.
pub fn normalize_text(raw: &str, patterns: &[Regex]) -> String {
    let mut text = raw.to_lowercase();
    for pattern in patterns {
        text = pattern.replace_all(&text, " ").into_owned();
    }
    WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

/// Collapse a single run of whitespace without pattern stripping; used for
/// individual text blocks where benign churn is already gone.
pub fn collapse_whitespace(raw: &str) -> String {
    WHITESPACE.replace_all(raw.trim(), " ").into_owned()
}

/// Tokenize, drop stopwords and short tokens, dedupe.
pub fn keyword_set(normalized: &str) -> HashSet<String> {
    normalized
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| token.len() > 2)
        .filter(|token| !STOPWORDS.contains(token))
        .map(str::to_string)
        .collect()
}

/// Drop everything non-alphanumeric; catches formatting-only edits for the
/// semantic hash.
pub fn collapse_alphanumeric(normalized: &str) -> String {
    normalized.chars().filter(|c| c.is_alphanumeric()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_strips_timestamps() {
        let a = normalize_text("Updated 2025-01-30T10:00:00Z Welcome", &BENIGN_PATTERNS);
        let b = normalize_text("Updated 2025-01-31T23:59:59Z Welcome", &BENIGN_PATTERNS);
        assert_eq!(a, b);
        assert!(a.contains("welcome"));
    }

    #[test]
    fn normalization_strips_session_ids() {
        let a = normalize_text("login?PHPSESSID=abc123def home", &BENIGN_PATTERNS);
        let b = normalize_text("login?PHPSESSID=zzz999xyz home", &BENIGN_PATTERNS);
        assert_eq!(a, b);
    }

    #[test]
    fn normalization_collapses_whitespace_and_lowercases() {
        let out = normalize_text("  Hello\n\n   WORLD  ", &BENIGN_PATTERNS);
        assert_eq!(out, "hello world");
    }

    #[test]
    fn keywords_drop_stopwords_and_short_tokens() {
        let set = keyword_set("the quick brown fox is on it");
        assert!(set.contains("quick"));
        assert!(set.contains("brown"));
        assert!(!set.contains("the"));
        assert!(!set.contains("is"));
        assert!(!set.contains("on"));
        assert!(!set.contains("it"));
    }

    #[test]
    fn alphanumeric_collapse_erases_formatting() {
        assert_eq!(
            collapse_alphanumeric("hello, world! 42"),
            collapse_alphanumeric("hello world 42")
        );
    }
}
