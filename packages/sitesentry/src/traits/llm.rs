//! LLM classification port.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::LlmResult;
use crate::types::Verdict;

/// Structured context handed to the LLM. The engine builds this; transport,
/// prompt templating and model choice live behind the port.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptContext {
    pub site_url: String,
    /// Text blocks that changed relative to the baseline
    pub changed_excerpts: Vec<String>,
    /// Stable site context (title, description)
    pub static_context: String,
    pub prior_verdict: Option<Verdict>,
    pub max_tokens: u32,
}

/// The LLM's parsed reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmVerdict {
    pub verdict: Verdict,
    pub confidence: f64,
    pub reasoning: String,
}

/// Adjudicates a change via an external language model. Streaming is not
/// required. Any error makes the LLM vote abstain; it never fails the check.
#[async_trait]
pub trait LlmClassifier: Send + Sync {
    async fn classify(&self, context: &PromptContext) -> LlmResult<LlmVerdict>;
}
