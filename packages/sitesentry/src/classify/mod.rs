//! Ensemble classification pipeline.
//!
//! Runs the rule-based classifier, the semantic analyzer and the LLM
//! classifier, then combines their verdicts with confidence-weighted voting.
//! Parallel mode is the default; the pipeline falls back to sequential
//! execution when its executor is saturated or the LLM circuit breaker is
//! open.

mod ensemble;
mod llm;
mod rules;
mod semantic;

pub use ensemble::{combine, EnsembleContext};
pub use llm::LlmRunner;
pub use rules::RuleClassifier;
pub use semantic::SemanticAnalyzer;

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tokio::sync::Semaphore;

use crate::config::{BreakerConfig, ClassifierConfig};
use crate::scheduler::retry::CircuitBreaker;
use crate::traits::LlmClassifier;
use crate::types::{
    ClassificationResult, ClassifierSource, ClassifierVote, EnsembleWeights, ExtractedContent,
    Verdict,
};
use crate::vectorize::SnapshotVectors;

/// Executor slots for parallel classification; exhaustion triggers the
/// sequential fallback.
const EXECUTOR_SLOTS: usize = 8;

/// Everything one classification needs.
pub struct ClassificationInput<'a> {
    pub site_url: &'a str,
    pub baseline_content: Option<&'a ExtractedContent>,
    pub new_content: &'a ExtractedContent,
    pub baseline_vectors: &'a SnapshotVectors,
    pub new_vectors: &'a SnapshotVectors,
    pub prior_verdict: Option<Verdict>,
    /// Per-site adapted base weights
    pub weights: EnsembleWeights,
    pub historical_false_positive_rate: f64,
    pub now: DateTime<Utc>,
}

pub struct ClassificationPipeline {
    rules: RuleClassifier,
    semantic: SemanticAnalyzer,
    llm_runner: LlmRunner,
    llm_port: Arc<dyn LlmClassifier>,
    llm_breaker: std::sync::Mutex<CircuitBreaker>,
    executor: Arc<Semaphore>,
}

impl ClassificationPipeline {
    pub fn new(
        config: &ClassifierConfig,
        breaker_config: BreakerConfig,
        llm_port: Arc<dyn LlmClassifier>,
    ) -> Self {
        Self {
            rules: RuleClassifier::new(config),
            semantic: SemanticAnalyzer::new(),
            llm_runner: LlmRunner::new(
                std::time::Duration::from_secs(config.llm_timeout_seconds),
                config.llm_max_tokens,
            ),
            llm_port,
            llm_breaker: std::sync::Mutex::new(CircuitBreaker::new(breaker_config)),
            executor: Arc::new(Semaphore::new(EXECUTOR_SLOTS)),
        }
    }

    /// Swap in a custom rule table.
    pub fn with_rules(mut self, rules: RuleClassifier) -> Self {
        self.rules = rules;
        self
    }

    /// Adjudicate a significant or ambiguous change.
    pub async fn classify(&self, input: ClassificationInput<'_>) -> ClassificationResult {
        let started = Instant::now();

        let llm_allowed = self.llm_breaker.lock().unwrap().try_acquire(input.now);
        // Parallel mode needs executor headroom; breaker trouble also drops
        // to sequential so the remaining classifiers finish promptly.
        let permits = self.executor.clone().try_acquire_many_owned(2).ok();
        let parallel = llm_allowed && permits.is_some();

        let context = self.llm_runner.build_context(
            input.site_url,
            input.baseline_content,
            input.new_content,
            input.prior_verdict,
        );

        let votes = if parallel {
            tracing::debug!(site_url = input.site_url, "classifying in parallel mode");
            let (rules_vote, semantic_vote, llm_vote) = tokio::join!(
                async { self.rules.classify(input.new_content) },
                async { self.semantic.analyze(input.baseline_vectors, input.new_vectors) },
                self.llm_runner.run(self.llm_port.as_ref(), &context),
            );
            vec![rules_vote, semantic_vote, llm_vote]
        } else {
            tracing::debug!(
                site_url = input.site_url,
                llm_allowed,
                "classifying in sequential mode"
            );
            let rules_vote = self.rules.classify(input.new_content);
            let semantic_vote = self.semantic.analyze(input.baseline_vectors, input.new_vectors);
            let llm_vote = if llm_allowed {
                self.llm_runner.run(self.llm_port.as_ref(), &context).await
            } else {
                ClassifierVote::Abstained {
                    source: ClassifierSource::Llm,
                    reason: "circuit breaker open".to_string(),
                }
            };
            vec![rules_vote, semantic_vote, llm_vote]
        };

        if llm_allowed {
            let mut breaker = self.llm_breaker.lock().unwrap();
            match votes.iter().find(|v| v.source() == ClassifierSource::Llm) {
                Some(ClassifierVote::Llm { .. }) => breaker.record_success(),
                _ => breaker.record_failure(input.now),
            }
        }

        drop(permits);

        let ensemble_context = EnsembleContext {
            has_baseline: input.baseline_content.is_some(),
            has_site_metadata: input.new_content.title.is_some()
                || input.new_content.meta_description.is_some(),
            historical_false_positive_rate: input.historical_false_positive_rate,
            vectors_available: input.new_vectors.main.is_some()
                && input.baseline_vectors.main.is_some(),
        };

        let result = combine(
            votes,
            input.weights,
            &ensemble_context,
            started.elapsed().as_millis() as u64,
        );

        tracing::info!(
            site_url = input.site_url,
            verdict = result.verdict.as_str(),
            confidence = result.confidence,
            agreement = result.agreement,
            "classification complete"
        );

        result
    }
}
