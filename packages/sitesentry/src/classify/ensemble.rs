//! Confidence-weighted voting over the sub-classifier votes.
//!
//! Each classifier's effective weight is its base weight times its own
//! confidence; abstentions carry zero weight. Semantic votes are projected
//! onto verdicts before voting: critical risk votes defacement, low risk
//! votes benign, high/medium risk votes unclear (the similarity band is too
//! wide to call either way without corroboration).

use crate::types::{
    ClassificationResult, ClassifierVote, EnsembleWeights, RiskLevel, Verdict,
};

/// Ensemble confidence inputs beyond the votes themselves.
#[derive(Debug, Clone, Copy)]
pub struct EnsembleContext {
    pub has_baseline: bool,
    pub has_site_metadata: bool,
    /// Normalized false-positive rate over the site's trailing window
    pub historical_false_positive_rate: f64,
    /// Whether embeddings were computable for this check
    pub vectors_available: bool,
}

impl Default for EnsembleContext {
    fn default() -> Self {
        Self {
            has_baseline: true,
            has_site_metadata: true,
            historical_false_positive_rate: 0.0,
            vectors_available: true,
        }
    }
}

/// Tie preference: err on the side of caution.
const VERDICT_PREFERENCE: [Verdict; 4] =
    [Verdict::Defacement, Verdict::Suspicious, Verdict::Unclear, Verdict::Benign];

/// One projected, weighted ballot.
struct Ballot {
    verdict: Verdict,
    effective_weight: f64,
    confidence: f64,
}

fn project(vote: &ClassifierVote, weights: &EnsembleWeights) -> Option<Ballot> {
    match vote {
        ClassifierVote::Rules { verdict, confidence, .. } => Some(Ballot {
            verdict: *verdict,
            effective_weight: weights.rules * confidence,
            confidence: *confidence,
        }),
        ClassifierVote::Llm { verdict, confidence, .. } => Some(Ballot {
            verdict: *verdict,
            effective_weight: weights.llm * confidence,
            confidence: *confidence,
        }),
        ClassifierVote::Semantic { risk, .. } => {
            let (verdict, factor) = match risk {
                RiskLevel::Critical => (Verdict::Defacement, 0.8),
                RiskLevel::High | RiskLevel::Medium => (Verdict::Unclear, 0.6),
                RiskLevel::Low => (Verdict::Benign, 0.8),
            };
            Some(Ballot {
                verdict,
                effective_weight: weights.semantic * factor,
                confidence: factor,
            })
        }
        ClassifierVote::Abstained { .. } => None,
    }
}

/// Fold the votes into a final verdict with a calibrated confidence.
pub fn combine(
    votes: Vec<ClassifierVote>,
    weights: EnsembleWeights,
    context: &EnsembleContext,
    processing_time_ms: u64,
) -> ClassificationResult {
    let ballots: Vec<Ballot> = votes.iter().filter_map(|v| project(v, &weights)).collect();

    if ballots.is_empty() {
        return ClassificationResult {
            verdict: Verdict::Unclear,
            confidence: 0.0,
            reasoning: "all classifiers abstained".to_string(),
            votes,
            weights_used: weights,
            agreement: 0.0,
            processing_time_ms,
        };
    }

    let mut tally: Vec<(Verdict, f64)> =
        VERDICT_PREFERENCE.iter().map(|v| (*v, 0.0)).collect();
    for ballot in &ballots {
        if let Some(slot) = tally.iter_mut().find(|(v, _)| *v == ballot.verdict) {
            slot.1 += ballot.effective_weight;
        }
    }

    // Preference order breaks ties because the scan visits verdicts in
    // preference order and only a strictly greater sum displaces the leader.
    let (final_verdict, _) = tally
        .iter()
        .fold((VERDICT_PREFERENCE[0], f64::MIN), |(best_v, best_w), (v, w)| {
            if *w > best_w {
                (*v, *w)
            } else {
                (best_v, best_w)
            }
        });

    let total_weight: f64 = ballots.iter().map(|b| b.effective_weight).sum();
    let concurring: Vec<&Ballot> =
        ballots.iter().filter(|b| b.verdict == final_verdict).collect();

    let agreement = if total_weight > 0.0 {
        concurring.iter().map(|b| b.effective_weight).sum::<f64>() / total_weight
    } else {
        0.0
    };

    let clarity = if concurring.is_empty() {
        0.0
    } else {
        concurring.iter().map(|b| b.confidence).sum::<f64>() / concurring.len() as f64
    };

    let context_factor = if context.has_baseline && context.has_site_metadata {
        1.0
    } else if context.has_baseline || context.has_site_metadata {
        0.7
    } else {
        0.4
    };

    let historical = 1.0 - context.historical_false_positive_rate.clamp(0.0, 1.0);
    let semantic_quality = if context.vectors_available { 1.0 } else { 0.0 };

    let confidence = 0.30 * agreement
        + 0.20 * clarity
        + 0.20 * context_factor
        + 0.15 * historical
        + 0.15 * semantic_quality;

    let reasoning = summarize(&votes, final_verdict);

    ClassificationResult {
        verdict: final_verdict,
        confidence: confidence.clamp(0.0, 1.0),
        reasoning,
        votes,
        weights_used: weights,
        agreement,
        processing_time_ms,
    }
}

fn summarize(votes: &[ClassifierVote], final_verdict: Verdict) -> String {
    let mut parts = Vec::new();
    for vote in votes {
        match vote {
            ClassifierVote::Rules { verdict, confidence, evidence } => {
                if evidence.is_empty() {
                    parts.push(format!("rules: {verdict} ({confidence:.2})"));
                } else {
                    parts.push(format!(
                        "rules: {verdict} ({confidence:.2}, matched {})",
                        evidence.join(", ")
                    ));
                }
            }
            ClassifierVote::Semantic { risk, similarity, .. } => {
                parts.push(format!("semantic: {risk:?} risk at similarity {similarity:.2}"));
            }
            ClassifierVote::Llm { verdict, confidence, reasoning } => {
                parts.push(format!("llm: {verdict} ({confidence:.2}): {reasoning}"));
            }
            ClassifierVote::Abstained { source, reason } => {
                parts.push(format!("{} abstained: {reason}", source.as_str()));
            }
        }
    }
    format!("{final_verdict}: {}", parts.join("; "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ClassifierSource;

    fn rules(verdict: Verdict, confidence: f64) -> ClassifierVote {
        ClassifierVote::Rules { verdict, confidence, evidence: vec![] }
    }

    fn llm(verdict: Verdict, confidence: f64) -> ClassifierVote {
        ClassifierVote::Llm { verdict, confidence, reasoning: "because".into() }
    }

    fn semantic(similarity: f64) -> ClassifierVote {
        ClassifierVote::Semantic {
            risk: crate::types::RiskLevel::from_similarity(similarity),
            similarity,
            max_drift: None,
        }
    }

    fn abstained(source: ClassifierSource) -> ClassifierVote {
        ClassifierVote::Abstained { source, reason: "test".into() }
    }

    #[test]
    fn unanimous_defacement_is_high_confidence() {
        let result = combine(
            vec![rules(Verdict::Defacement, 0.95), semantic(0.3), llm(Verdict::Defacement, 0.95)],
            EnsembleWeights::default(),
            &EnsembleContext::default(),
            10,
        );
        assert_eq!(result.verdict, Verdict::Defacement);
        assert!(result.confidence >= 0.8, "confidence {}", result.confidence);
        assert!((result.agreement - 1.0).abs() < 1e-9);
    }

    #[test]
    fn all_abstained_is_unclear_with_zero_confidence() {
        let result = combine(
            vec![abstained(ClassifierSource::Rules), abstained(ClassifierSource::Llm)],
            EnsembleWeights::default(),
            &EnsembleContext::default(),
            5,
        );
        assert_eq!(result.verdict, Verdict::Unclear);
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn llm_abstention_leaves_rules_and_semantic_to_decide() {
        // Ambiguous change: benign rules, mid-band semantic, no LLM.
        let result = combine(
            vec![rules(Verdict::Benign, 0.5), semantic(0.62), abstained(ClassifierSource::Llm)],
            EnsembleWeights::default(),
            &EnsembleContext::default(),
            5,
        );
        // semantic unclear at 0.3·0.6 = 0.18 outweighs benign at 0.2·0.5 = 0.10
        assert_eq!(result.verdict, Verdict::Unclear);
        assert!(result.confidence < 0.8);
    }

    #[test]
    fn tie_prefers_the_more_cautious_verdict() {
        let weights = EnsembleWeights { llm: 0.5, semantic: 0.3, rules: 0.5 };
        let result = combine(
            vec![rules(Verdict::Benign, 0.8), llm(Verdict::Defacement, 0.8)],
            weights,
            &EnsembleContext::default(),
            5,
        );
        assert_eq!(result.verdict, Verdict::Defacement);
    }

    #[test]
    fn benign_only_evidence_scores_at_least_medium() {
        let result = combine(
            vec![rules(Verdict::Benign, 0.5), semantic(0.97), llm(Verdict::Benign, 0.9)],
            EnsembleWeights::default(),
            &EnsembleContext::default(),
            5,
        );
        assert_eq!(result.verdict, Verdict::Benign);
        assert!(result.confidence >= 0.4, "confidence {}", result.confidence);
    }

    #[test]
    fn missing_context_lowers_confidence() {
        let with_context = combine(
            vec![llm(Verdict::Benign, 0.9)],
            EnsembleWeights::default(),
            &EnsembleContext::default(),
            5,
        );
        let without_context = combine(
            vec![llm(Verdict::Benign, 0.9)],
            EnsembleWeights::default(),
            &EnsembleContext {
                has_baseline: false,
                has_site_metadata: false,
                vectors_available: false,
                historical_false_positive_rate: 0.5,
            },
            5,
        );
        assert!(without_context.confidence < with_context.confidence);
    }
}
