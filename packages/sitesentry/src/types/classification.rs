//! Classification results and the tagged per-classifier vote variants the
//! ensemble folds over.

use serde::{Deserialize, Serialize};

use super::snapshot::Verdict;
use super::vector::VectorKind;

/// Which sub-classifier a vote (or abstention) came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierSource {
    Rules,
    Semantic,
    Llm,
}

impl ClassifierSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClassifierSource::Rules => "rules",
            ClassifierSource::Semantic => "semantic",
            ClassifierSource::Llm => "llm",
        }
    }
}

/// Risk levels the semantic analyzer maps cosine similarity onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// `similarity ≥ 0.95 → low`; `[0.80, 0.95) → medium`;
    /// `[0.50, 0.80) → high`; `< 0.50 → critical`.
    pub fn from_similarity(similarity: f64) -> Self {
        if similarity >= 0.95 {
            RiskLevel::Low
        } else if similarity >= 0.80 {
            RiskLevel::Medium
        } else if similarity >= 0.50 {
            RiskLevel::High
        } else {
            RiskLevel::Critical
        }
    }
}

/// One sub-classifier's contribution. `Abstained` is a distinct tag, not a
/// zero-confidence vote; the ensemble folds over a list of these with no
/// common base type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "classifier", rename_all = "snake_case")]
pub enum ClassifierVote {
    Rules {
        verdict: Verdict,
        confidence: f64,
        /// Matched keywords/patterns kept as evidence
        evidence: Vec<String>,
    },
    Semantic {
        risk: RiskLevel,
        similarity: f64,
        /// Largest per-kind shift observed (topic drift)
        max_drift: Option<DriftReport>,
    },
    Llm {
        verdict: Verdict,
        confidence: f64,
        reasoning: String,
    },
    Abstained {
        source: ClassifierSource,
        reason: String,
    },
}

impl ClassifierVote {
    pub fn source(&self) -> ClassifierSource {
        match self {
            ClassifierVote::Rules { .. } => ClassifierSource::Rules,
            ClassifierVote::Semantic { .. } => ClassifierSource::Semantic,
            ClassifierVote::Llm { .. } => ClassifierSource::Llm,
            ClassifierVote::Abstained { source, .. } => *source,
        }
    }

    pub fn is_abstention(&self) -> bool {
        matches!(self, ClassifierVote::Abstained { .. })
    }
}

/// Per-kind semantic shift between baseline and new vectors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftReport {
    pub kind: VectorKind,
    /// 1 − cosine similarity for that kind
    pub shift: f64,
}

/// Base ensemble weights, multiplied by each classifier's own confidence to
/// get its effective voting weight.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnsembleWeights {
    pub llm: f64,
    pub semantic: f64,
    pub rules: f64,
}

impl Default for EnsembleWeights {
    fn default() -> Self {
        Self { llm: 0.5, semantic: 0.3, rules: 0.2 }
    }
}

impl EnsembleWeights {
    pub fn for_source(&self, source: ClassifierSource) -> f64 {
        match source {
            ClassifierSource::Llm => self.llm,
            ClassifierSource::Semantic => self.semantic,
            ClassifierSource::Rules => self.rules,
        }
    }

    pub fn scaled(&self, factor: f64) -> Self {
        Self { llm: self.llm * factor, semantic: self.semantic * factor, rules: self.rules * factor }
    }
}

/// Per-site adaptive weight record. Persisted by the store; updated only in
/// the persist step to avoid read-modify-write races.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptiveWeights {
    pub weights: EnsembleWeights,
    /// Trailing agreement scores, most recent last
    pub agreement_history: Vec<f64>,
}

impl Default for AdaptiveWeights {
    fn default() -> Self {
        Self { weights: EnsembleWeights::default(), agreement_history: Vec::new() }
    }
}

impl AdaptiveWeights {
    const WINDOW: usize = 10;

    pub fn with_base(weights: EnsembleWeights) -> Self {
        Self { weights, agreement_history: Vec::new() }
    }

    /// Record the agreement of a completed classification. Mean agreement
    /// below 0.3 over the window signals low reliability and scales the base
    /// weights by 0.8; otherwise the weights are kept as-is.
    pub fn observe(&mut self, agreement: f64) {
        self.agreement_history.push(agreement.clamp(0.0, 1.0));
        if self.agreement_history.len() > Self::WINDOW {
            let excess = self.agreement_history.len() - Self::WINDOW;
            self.agreement_history.drain(..excess);
        }

        let mean = self.agreement_history.iter().sum::<f64>() / self.agreement_history.len() as f64;
        if mean < 0.3 {
            self.weights = self.weights.scaled(0.8);
        }
    }
}

/// Verbal confidence buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceBucket {
    VeryHigh,
    High,
    Medium,
    Low,
    VeryLow,
}

impl ConfidenceBucket {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.8 {
            ConfidenceBucket::VeryHigh
        } else if score >= 0.6 {
            ConfidenceBucket::High
        } else if score >= 0.4 {
            ConfidenceBucket::Medium
        } else if score >= 0.2 {
            ConfidenceBucket::Low
        } else {
            ConfidenceBucket::VeryLow
        }
    }
}

/// The ensemble's adjudication of a significant change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub verdict: Verdict,
    pub confidence: f64,
    pub reasoning: String,
    pub votes: Vec<ClassifierVote>,
    pub weights_used: EnsembleWeights,
    /// Weighted agreement among non-abstaining classifiers; feeds adaptive
    /// weighting
    pub agreement: f64,
    pub processing_time_ms: u64,
}

impl ClassificationResult {
    pub fn bucket(&self) -> ConfidenceBucket {
        ConfidenceBucket::from_score(self.confidence)
    }
}
