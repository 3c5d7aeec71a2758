//! LLM classifier wrapper.
//!
//! Builds the structured prompt context, enforces the call timeout, and maps
//! every failure mode (timeout, malformed reply, rate limit) to an
//! abstention. The LLM never fails a check.

use std::collections::HashSet;
use std::time::Duration;

use crate::traits::{LlmClassifier, PromptContext};
use crate::types::{ClassifierSource, ClassifierVote, ExtractedContent, Verdict};

/// Cap on excerpts handed to the model.
const MAX_EXCERPTS: usize = 10;
/// Per-excerpt character cap.
const MAX_EXCERPT_CHARS: usize = 400;

pub struct LlmRunner {
    timeout: Duration,
    max_tokens: u32,
}

impl LlmRunner {
    pub fn new(timeout: Duration, max_tokens: u32) -> Self {
        Self { timeout, max_tokens }
    }

    /// Assemble the prompt context: changed excerpts relative to the
    /// baseline, stable site context, prior verdict.
    pub fn build_context(
        &self,
        site_url: &str,
        baseline: Option<&ExtractedContent>,
        new: &ExtractedContent,
        prior_verdict: Option<Verdict>,
    ) -> PromptContext {
        let baseline_blocks: HashSet<&str> = baseline
            .map(|b| b.text_blocks.iter().map(String::as_str).collect())
            .unwrap_or_default();

        let changed_excerpts: Vec<String> = new
            .text_blocks
            .iter()
            .filter(|block| !baseline_blocks.contains(block.as_str()))
            .take(MAX_EXCERPTS)
            .map(|block| {
                let mut excerpt = block.clone();
                if excerpt.len() > MAX_EXCERPT_CHARS {
                    let mut end = MAX_EXCERPT_CHARS;
                    while end > 0 && !excerpt.is_char_boundary(end) {
                        end -= 1;
                    }
                    excerpt.truncate(end);
                }
                excerpt
            })
            .collect();

        let static_context = format!(
            "title: {}; description: {}",
            new.title.as_deref().unwrap_or("(none)"),
            new.meta_description.as_deref().unwrap_or("(none)"),
        );

        PromptContext {
            site_url: site_url.to_string(),
            changed_excerpts,
            static_context,
            prior_verdict,
            max_tokens: self.max_tokens,
        }
    }

    /// Call the port under the configured timeout. A timeout at exactly the
    /// limit is an abstention, not an error.
    pub async fn run(&self, port: &dyn LlmClassifier, context: &PromptContext) -> ClassifierVote {
        match tokio::time::timeout(self.timeout, port.classify(context)).await {
            Ok(Ok(reply)) => {
                tracing::debug!(
                    verdict = reply.verdict.as_str(),
                    confidence = reply.confidence,
                    "LLM classification received"
                );
                ClassifierVote::Llm {
                    verdict: reply.verdict,
                    confidence: reply.confidence.clamp(0.0, 1.0),
                    reasoning: reply.reasoning,
                }
            }
            Ok(Err(err)) => {
                tracing::warn!(error = %err, "LLM classifier abstained");
                ClassifierVote::Abstained {
                    source: ClassifierSource::Llm,
                    reason: err.to_string(),
                }
            }
            Err(_) => {
                tracing::warn!(timeout_secs = self.timeout.as_secs(), "LLM call timed out");
                ClassifierVote::Abstained {
                    source: ClassifierSource::Llm,
                    reason: format!("timed out after {}s", self.timeout.as_secs()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockLlm;

    fn content(blocks: &[&str]) -> ExtractedContent {
        ExtractedContent {
            title: Some("Shop".into()),
            text_blocks: blocks.iter().map(|b| b.to_string()).collect(),
            normalized_text: blocks.join(" "),
            ..Default::default()
        }
    }

    #[test]
    fn context_contains_only_changed_blocks() {
        let runner = LlmRunner::new(Duration::from_secs(5), 512);
        let baseline = content(&["stable intro", "old promo"]);
        let new = content(&["stable intro", "HACKED BY X"]);
        let ctx = runner.build_context("https://a.example", Some(&baseline), &new, Some(Verdict::Benign));
        assert_eq!(ctx.changed_excerpts, vec!["HACKED BY X".to_string()]);
        assert_eq!(ctx.prior_verdict, Some(Verdict::Benign));
        assert!(ctx.static_context.contains("Shop"));
    }

    #[tokio::test]
    async fn successful_reply_becomes_vote() {
        let runner = LlmRunner::new(Duration::from_secs(5), 512);
        let port = MockLlm::replying(Verdict::Defacement, 0.95, "obvious defacement banner");
        let ctx = runner.build_context("https://a.example", None, &content(&["HACKED"]), None);
        let vote = runner.run(&port, &ctx).await;
        match vote {
            ClassifierVote::Llm { verdict, confidence, .. } => {
                assert_eq!(verdict, Verdict::Defacement);
                assert!((confidence - 0.95).abs() < 1e-9);
            }
            other => panic!("expected llm vote, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn upstream_error_abstains() {
        let runner = LlmRunner::new(Duration::from_secs(5), 512);
        let port = MockLlm::rate_limited();
        let ctx = runner.build_context("https://a.example", None, &content(&["text"]), None);
        let vote = runner.run(&port, &ctx).await;
        assert!(vote.is_abstention());
        assert_eq!(vote.source(), ClassifierSource::Llm);
    }

    #[tokio::test]
    async fn slow_reply_abstains_at_timeout() {
        let runner = LlmRunner::new(Duration::from_millis(20), 512);
        let port = MockLlm::hanging();
        let ctx = runner.build_context("https://a.example", None, &content(&["text"]), None);
        let vote = runner.run(&port, &ctx).await;
        assert!(vote.is_abstention());
    }
}
