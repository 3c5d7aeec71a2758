//! Change detection: decides whether a new snapshot differs from the
//! baseline enough to be worth classifying.

mod similarity;

pub use similarity::{keyword_similarity, structural_similarity};

use serde::{Deserialize, Serialize};

use crate::config::DetectorConfig;
use crate::extract::ExtractedDocument;
use crate::types::DetectorOverrides;

/// Magnitude of an observed change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeClass {
    /// All four fingerprints equal; no further work
    Unchanged,
    /// Similar enough to keep the baseline without classification
    Minor,
    /// Classifier must adjudicate
    Significant,
    /// Classifier adjudicates at reduced priority
    Ambiguous,
}

impl ChangeClass {
    /// Whether the ensemble classifier runs for this change.
    pub fn needs_classification(&self) -> bool {
        matches!(self, ChangeClass::Significant | ChangeClass::Ambiguous)
    }
}

/// Detector output: the class plus the similarity scores that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeClassification {
    pub class: ChangeClass,
    pub keyword_similarity: f64,
    pub structural_similarity: f64,
}

/// Compares a new snapshot against the previous baseline.
#[derive(Debug, Clone)]
pub struct ChangeDetector {
    config: DetectorConfig,
}

impl ChangeDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self { config }
    }

    /// Effective thresholds after applying per-site overrides.
    fn thresholds(&self, overrides: &DetectorOverrides) -> DetectorConfig {
        DetectorConfig {
            similarity_threshold: overrides
                .similarity_threshold
                .unwrap_or(self.config.similarity_threshold),
            structural_threshold: overrides
                .structural_threshold
                .unwrap_or(self.config.structural_threshold),
            critical_change_threshold: overrides
                .critical_change_threshold
                .unwrap_or(self.config.critical_change_threshold),
        }
    }

    /// Classify the magnitude of change between baseline and new capture.
    pub fn detect(
        &self,
        baseline: &ExtractedDocument,
        new: &ExtractedDocument,
        overrides: &DetectorOverrides,
    ) -> ChangeClassification {
        if baseline.fingerprints.matches(&new.fingerprints) {
            return ChangeClassification {
                class: ChangeClass::Unchanged,
                keyword_similarity: 1.0,
                structural_similarity: 1.0,
            };
        }

        let thresholds = self.thresholds(overrides);
        let keyword = keyword_similarity(&baseline.content.keywords, &new.content.keywords);

        // A baseline reconstructed without raw HTML has no outline; fall back
        // to structure-hash equality rather than penalizing every node.
        let structural = if baseline.content.outline.is_empty() ^ new.content.outline.is_empty() {
            if baseline.fingerprints.structure_hash == new.fingerprints.structure_hash {
                1.0
            } else {
                keyword
            }
        } else {
            structural_similarity(&baseline.content.outline, &new.content.outline)
        };

        let class = if keyword >= thresholds.similarity_threshold
            && structural >= thresholds.structural_threshold
        {
            ChangeClass::Minor
        } else if keyword < thresholds.critical_change_threshold
            || structural < thresholds.critical_change_threshold
        {
            ChangeClass::Significant
        } else {
            ChangeClass::Ambiguous
        };

        ChangeClassification { class, keyword_similarity: keyword, structural_similarity: structural }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExtractorConfig;
    use crate::extract::ContentExtractor;

    fn extract(html: &str) -> ExtractedDocument {
        ContentExtractor::new(&ExtractorConfig::default())
            .extract(html, "https://site.example")
            .unwrap()
    }

    fn detector() -> ChangeDetector {
        ChangeDetector::new(DetectorConfig::default())
    }

    fn page(body: &str) -> String {
        format!("<html><head><title>Site</title></head><body>{body}</body></html>")
    }

    #[test]
    fn identical_documents_are_unchanged() {
        let doc = extract(&page("<h1>Welcome</h1><p>Our catalog of fine products</p>"));
        let result = detector().detect(&doc, &doc, &DetectorOverrides::default());
        assert_eq!(result.class, ChangeClass::Unchanged);
        assert!(!result.class.needs_classification());
    }

    #[test]
    fn small_rewording_is_minor() {
        let baseline = extract(&page(
            "<h1>Welcome</h1>\
             <p>catalog anvils rockets hardware tooling supplies quality industrial shipping warranty</p>",
        ));
        let new = extract(&page(
            "<h1>Welcome</h1>\
             <p>catalog anvils rockets hardware tooling supplies quality industrial shipping discount</p>",
        ));
        let result = detector().detect(&baseline, &new, &DetectorOverrides::default());
        assert_eq!(result.class, ChangeClass::Minor);
        assert!((result.structural_similarity - 1.0).abs() < 1e-9);
    }

    #[test]
    fn full_replacement_is_significant() {
        let baseline = extract(&page("<h1>Welcome</h1><p>catalog anvils rockets hardware</p>"));
        let new = extract(&page(
            "<h1>HACKED BY PHANTOM</h1><marquee>greetings from the underground crew</marquee>",
        ));
        let result = detector().detect(&baseline, &new, &DetectorOverrides::default());
        assert_eq!(result.class, ChangeClass::Significant);
        assert!(result.class.needs_classification());
    }

    #[test]
    fn moderate_change_is_ambiguous() {
        let baseline = extract(&page(
            "<p>alpha bravo charlie delta echo foxtrot golf hotel india juliett</p>",
        ));
        let new = extract(&page(
            "<p>alpha bravo charlie delta echo foxtrot golf xray yankee zulu</p>",
        ));
        let result = detector().detect(&baseline, &new, &DetectorOverrides::default());
        // 70% keyword overlap with identical structure sits between the bands
        assert_eq!(result.class, ChangeClass::Ambiguous);
    }

    #[test]
    fn per_site_overrides_take_precedence() {
        let baseline = extract(&page(
            "<p>alpha bravo charlie delta echo foxtrot golf hotel india juliett</p>",
        ));
        let new = extract(&page(
            "<p>alpha bravo charlie delta echo foxtrot golf xray yankee zulu</p>",
        ));
        let lax = DetectorOverrides {
            similarity_threshold: Some(0.3),
            structural_threshold: Some(0.5),
            critical_change_threshold: Some(0.1),
        };
        let result = detector().detect(&baseline, &new, &lax);
        assert_eq!(result.class, ChangeClass::Minor);
    }
}
