//! Rule-based classifier.
//!
//! Scans normalized text, text blocks, title and meta description against a
//! keyword table and an ordered pattern table of defacement indicators. The
//! score is the maximum matched weight; matches are kept as evidence.

use std::collections::HashSet;

use regex::Regex;

use crate::config::ClassifierConfig;
use crate::types::{ClassifierVote, ExtractedContent, Verdict};

/// Default keyword table: defacement-indicator token → prior weight.
fn default_keywords() -> Vec<(String, f64)> {
    [
        ("hacked", 0.9),
        ("defaced", 0.95),
        ("pwned", 0.8),
        ("owned", 0.8),
        ("unauthorized", 0.7),
        ("breached", 0.7),
        ("compromised", 0.7),
        ("h4x0r", 0.85),
        ("rooted", 0.75),
    ]
    .into_iter()
    .map(|(token, weight)| (token.to_string(), weight))
    .collect()
}

/// Default pattern table: ordered case-insensitive regexes with weights.
fn default_patterns() -> Vec<(Regex, f64)> {
    // Static patterns are always valid.
    [
        (r"hacked\s+by\s+\S+", 0.95),
        (r"defaced\s+by\s+\S+", 0.95),
        (r"owned\s+by\s+\S+", 0.9),
        (r"greetz\s+to", 0.85),
        (r"your\s+(security|site)\s+is\s+(a\s+joke|garbage|trash)", 0.8),
        (r"we\s+are\s+(legion|anonymous)", 0.8),
        (r"free\s+palestine|free\s+kashmir", 0.6),
    ]
    .into_iter()
    .map(|(pattern, weight)| {
        (Regex::new(&format!("(?i){pattern}")).unwrap(), weight)
    })
    .collect()
}

pub struct RuleClassifier {
    keywords: Vec<(String, f64)>,
    patterns: Vec<(Regex, f64)>,
    defacement_threshold: f64,
    suspicious_threshold: f64,
}

impl RuleClassifier {
    pub fn new(config: &ClassifierConfig) -> Self {
        Self {
            keywords: default_keywords(),
            patterns: default_patterns(),
            defacement_threshold: config.rules_defacement_threshold,
            suspicious_threshold: config.rules_suspicious_threshold,
        }
    }

    /// Replace the keyword table.
    pub fn with_keywords(mut self, keywords: Vec<(String, f64)>) -> Self {
        self.keywords = keywords;
        self
    }

    /// Replace the pattern table.
    pub fn with_patterns(mut self, patterns: Vec<(Regex, f64)>) -> Self {
        self.patterns = patterns;
        self
    }

    pub fn classify(&self, content: &ExtractedContent) -> ClassifierVote {
        let haystack = self.haystack(content);
        let words: HashSet<&str> = haystack
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();

        let mut score = 0.0f64;
        let mut evidence = Vec::new();

        for (token, weight) in &self.keywords {
            if words.contains(token.as_str()) {
                evidence.push(format!("keyword:{token}"));
                score = score.max(*weight);
            }
        }

        for (pattern, weight) in &self.patterns {
            if let Some(found) = pattern.find(&haystack) {
                evidence.push(format!("pattern:{}", found.as_str()));
                score = score.max(*weight);
            }
        }

        let (verdict, confidence) = if score >= self.defacement_threshold {
            (Verdict::Defacement, score)
        } else if score >= self.suspicious_threshold {
            (Verdict::Suspicious, score)
        } else {
            // No (or weak) indicators; benign at diminishing confidence
            (Verdict::Benign, 0.5 * (1.0 - score))
        };

        ClassifierVote::Rules { verdict, confidence, evidence }
    }

    /// Lowercased concatenation of every text surface rules inspect.
    fn haystack(&self, content: &ExtractedContent) -> String {
        let mut haystack = String::with_capacity(
            content.normalized_text.len() + content.text_blocks.iter().map(String::len).sum::<usize>(),
        );
        haystack.push_str(&content.normalized_text);
        for block in &content.text_blocks {
            haystack.push(' ');
            haystack.push_str(block);
        }
        if let Some(title) = &content.title {
            haystack.push(' ');
            haystack.push_str(title);
        }
        if let Some(meta) = &content.meta_description {
            haystack.push(' ');
            haystack.push_str(meta);
        }
        haystack.to_lowercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> RuleClassifier {
        RuleClassifier::new(&ClassifierConfig::default())
    }

    fn content(text: &str) -> ExtractedContent {
        ExtractedContent { normalized_text: text.to_string(), ..Default::default() }
    }

    #[test]
    fn clean_content_is_benign_at_medium_confidence() {
        let vote = classifier().classify(&content("welcome to our store, fresh deals daily"));
        match vote {
            ClassifierVote::Rules { verdict, confidence, evidence } => {
                assert_eq!(verdict, Verdict::Benign);
                assert!((confidence - 0.5).abs() < 1e-9);
                assert!(evidence.is_empty());
            }
            _ => panic!("expected rules vote"),
        }
    }

    #[test]
    fn hacked_by_pattern_scores_defacement() {
        let vote = classifier().classify(&content("this site was HACKED BY phantom_crew lol"));
        match vote {
            ClassifierVote::Rules { verdict, confidence, evidence } => {
                assert_eq!(verdict, Verdict::Defacement);
                assert!(confidence >= 0.95);
                assert!(evidence.iter().any(|e| e.starts_with("pattern:")));
                assert!(evidence.iter().any(|e| e == "keyword:hacked"));
            }
            _ => panic!("expected rules vote"),
        }
    }

    #[test]
    fn match_is_whole_word() {
        // "chacked" must not match the "hacked" keyword
        let vote = classifier().classify(&content("the chacked widget is on sale"));
        match vote {
            ClassifierVote::Rules { verdict, .. } => assert_eq!(verdict, Verdict::Benign),
            _ => panic!("expected rules vote"),
        }
    }

    #[test]
    fn single_medium_keyword_is_suspicious() {
        let vote = classifier().classify(&content("unauthorized access detected on this server"));
        match vote {
            ClassifierVote::Rules { verdict, confidence, .. } => {
                assert_eq!(verdict, Verdict::Suspicious);
                assert!((confidence - 0.7).abs() < 1e-9);
            }
            _ => panic!("expected rules vote"),
        }
    }

    #[test]
    fn title_and_meta_are_inspected() {
        let mut c = content("nothing odd in the body");
        c.title = Some("pwned".to_string());
        let vote = classifier().classify(&c);
        match vote {
            ClassifierVote::Rules { verdict, .. } => assert_eq!(verdict, Verdict::Suspicious),
            _ => panic!("expected rules vote"),
        }
    }

    #[test]
    fn score_is_max_of_matches_not_sum() {
        let vote = classifier().classify(&content("breached and compromised and unauthorized"));
        match vote {
            ClassifierVote::Rules { confidence, verdict, .. } => {
                assert_eq!(verdict, Verdict::Suspicious);
                assert!((confidence - 0.7).abs() < 1e-9);
            }
            _ => panic!("expected rules vote"),
        }
    }
}
