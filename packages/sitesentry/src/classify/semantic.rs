//! Semantic analyzer.
//!
//! Compares baseline and new embeddings via cosine similarity and maps the
//! result into a risk level; additionally inspects title/meta/text-block
//! vectors independently for topic drift, reporting the maximum shift.

use crate::traits::cosine_similarity;
use crate::types::{ClassifierSource, ClassifierVote, DriftReport, RiskLevel, VectorKind};
use crate::vectorize::SnapshotVectors;

#[derive(Debug, Clone, Copy, Default)]
pub struct SemanticAnalyzer;

impl SemanticAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Compare vectors; abstains when either side has no main vector.
    pub fn analyze(&self, baseline: &SnapshotVectors, new: &SnapshotVectors) -> ClassifierVote {
        let (Some(base_main), Some(new_main)) = (baseline.main.as_ref(), new.main.as_ref()) else {
            return ClassifierVote::Abstained {
                source: ClassifierSource::Semantic,
                reason: "main vector unavailable on one side".to_string(),
            };
        };

        let similarity = cosine_similarity(base_main, new_main);
        let risk = RiskLevel::from_similarity(similarity);

        let max_drift = [VectorKind::Title, VectorKind::Meta, VectorKind::TextBlocks]
            .into_iter()
            .filter_map(|kind| {
                let base = baseline.get(kind)?;
                let new = new.get(kind)?;
                Some(DriftReport { kind, shift: 1.0 - cosine_similarity(base, new) })
            })
            .max_by(|a, b| a.shift.partial_cmp(&b.shift).unwrap_or(std::cmp::Ordering::Equal));

        tracing::debug!(similarity, ?risk, "semantic comparison complete");

        ClassifierVote::Semantic { risk, similarity, max_drift }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vectors(main: Vec<f32>) -> SnapshotVectors {
        SnapshotVectors { main: Some(main), ..Default::default() }
    }

    #[test]
    fn identical_vectors_are_low_risk() {
        let analyzer = SemanticAnalyzer::new();
        let vote = analyzer.analyze(&vectors(vec![1.0, 2.0, 3.0]), &vectors(vec![1.0, 2.0, 3.0]));
        match vote {
            ClassifierVote::Semantic { risk, similarity, .. } => {
                assert_eq!(risk, RiskLevel::Low);
                assert!((similarity - 1.0).abs() < 1e-6);
            }
            _ => panic!("expected semantic vote"),
        }
    }

    #[test]
    fn orthogonal_vectors_are_critical() {
        let analyzer = SemanticAnalyzer::new();
        let vote = analyzer.analyze(&vectors(vec![1.0, 0.0]), &vectors(vec![0.0, 1.0]));
        match vote {
            ClassifierVote::Semantic { risk, .. } => assert_eq!(risk, RiskLevel::Critical),
            _ => panic!("expected semantic vote"),
        }
    }

    #[test]
    fn missing_vectors_abstain() {
        let analyzer = SemanticAnalyzer::new();
        let vote = analyzer.analyze(&SnapshotVectors::default(), &vectors(vec![1.0]));
        assert!(vote.is_abstention());
        assert_eq!(vote.source(), ClassifierSource::Semantic);
    }

    #[test]
    fn drift_reports_largest_shift() {
        let analyzer = SemanticAnalyzer::new();
        let mut baseline = vectors(vec![1.0, 0.0]);
        baseline.title = Some(vec![1.0, 0.0]);
        baseline.meta = Some(vec![1.0, 0.0]);
        let mut new = vectors(vec![1.0, 0.1]);
        new.title = Some(vec![1.0, 0.05]); // barely moved
        new.meta = Some(vec![0.0, 1.0]); // orthogonal
        let vote = analyzer.analyze(&baseline, &new);
        match vote {
            ClassifierVote::Semantic { max_drift: Some(drift), .. } => {
                assert_eq!(drift.kind, VectorKind::Meta);
                assert!(drift.shift > 0.9);
            }
            other => panic!("expected drift report, got {other:?}"),
        }
    }
}
