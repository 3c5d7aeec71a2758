//! Embedding front-end.
//!
//! Prepares page text for the embedding port: whitespace normalization,
//! truncation, and sentence-boundary chunking with mean pooling for long
//! documents. A failing embedder degrades to missing vectors; the classifier
//! tolerates their absence.

use crate::config::VectorizerConfig;
use crate::error::Result;
use crate::traits::Embedder;
use crate::types::{ExtractedContent, VectorKind};

/// The per-snapshot vectors the semantic analyzer compares. Any of them may
/// be absent when embedding failed.
#[derive(Debug, Clone, Default)]
pub struct SnapshotVectors {
    pub main: Option<Vec<f32>>,
    pub title: Option<Vec<f32>>,
    pub text_blocks: Option<Vec<f32>>,
    pub meta: Option<Vec<f32>>,
    pub combined: Option<Vec<f32>>,
}

impl SnapshotVectors {
    pub fn get(&self, kind: VectorKind) -> Option<&Vec<f32>> {
        match kind {
            VectorKind::Main => self.main.as_ref(),
            VectorKind::Title => self.title.as_ref(),
            VectorKind::TextBlocks => self.text_blocks.as_ref(),
            VectorKind::Meta => self.meta.as_ref(),
            VectorKind::Combined => self.combined.as_ref(),
        }
    }

    pub fn set(&mut self, kind: VectorKind, payload: Vec<f32>) {
        match kind {
            VectorKind::Main => self.main = Some(payload),
            VectorKind::Title => self.title = Some(payload),
            VectorKind::TextBlocks => self.text_blocks = Some(payload),
            VectorKind::Meta => self.meta = Some(payload),
            VectorKind::Combined => self.combined = Some(payload),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.main.is_none()
            && self.title.is_none()
            && self.text_blocks.is_none()
            && self.meta.is_none()
            && self.combined.is_none()
    }

    /// Kinds with a vector present, in a stable order.
    pub fn present_kinds(&self) -> Vec<VectorKind> {
        [
            VectorKind::Main,
            VectorKind::Title,
            VectorKind::TextBlocks,
            VectorKind::Meta,
            VectorKind::Combined,
        ]
        .into_iter()
        .filter(|kind| self.get(*kind).is_some())
        .collect()
    }
}

/// Produces semantic embeddings for extracted content.
pub struct Vectorizer {
    config: VectorizerConfig,
}

impl Vectorizer {
    pub fn new(config: VectorizerConfig) -> Self {
        Self { config }
    }

    /// Embed every projection of the content. Per-kind failures are logged
    /// and leave that slot empty; this function itself never fails.
    pub async fn vectorize(
        &self,
        embedder: &dyn Embedder,
        content: &ExtractedContent,
    ) -> SnapshotVectors {
        let mut vectors = SnapshotVectors::default();

        let main_text = self.preprocess(&content.normalized_text);
        if !main_text.is_empty() {
            match self.embed_chunked(embedder, &main_text).await {
                Ok(v) => vectors.main = Some(v),
                Err(e) => tracing::warn!(error = %e, kind = "main", "embedding failed"),
            }
        }

        for (kind, text) in [
            (VectorKind::Title, content.title.clone().unwrap_or_default()),
            (VectorKind::TextBlocks, content.text_blocks.join(" ")),
            (VectorKind::Meta, content.meta_description.clone().unwrap_or_default()),
            (
                VectorKind::Combined,
                format!(
                    "{} {} {}",
                    content.title.as_deref().unwrap_or(""),
                    content.meta_description.as_deref().unwrap_or(""),
                    content.normalized_text
                ),
            ),
        ] {
            let text = self.preprocess(&text);
            if text.is_empty() {
                continue;
            }
            match self.embed_chunked(embedder, &text).await {
                Ok(v) => vectors.set(kind, v),
                Err(e) => tracing::warn!(error = %e, kind = kind.as_str(), "embedding failed"),
            }
        }

        vectors
    }

    /// Strip residual markup, normalize whitespace, lowercase, truncate.
    fn preprocess(&self, text: &str) -> String {
        let mut cleaned: String = text
            .replace(['<', '>'], " ")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();

        if cleaned.len() > self.config.max_content_length {
            let mut end = self.config.max_content_length;
            while end > 0 && !cleaned.is_char_boundary(end) {
                end -= 1;
            }
            cleaned.truncate(end);
        }
        cleaned
    }

    /// Embed directly, or chunk on sentence boundaries and mean-pool when the
    /// text exceeds the chunk threshold.
    async fn embed_chunked(&self, embedder: &dyn Embedder, text: &str) -> Result<Vec<f32>> {
        if text.len() <= self.config.chunk_threshold {
            return embedder.embed(text, VectorKind::Main).await;
        }

        let chunks = split_sentences(text, self.config.chunk_threshold);
        let mut embedded = Vec::with_capacity(chunks.len());
        for chunk in &chunks {
            embedded.push(embedder.embed(chunk, VectorKind::Main).await?);
        }

        Ok(mean_pool(&embedded))
    }
}

/// Split on sentence boundaries into chunks of at most `target` bytes. A
/// single sentence longer than `target` becomes its own chunk.
fn split_sentences(text: &str, target: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for sentence in text.split_inclusive(['.', '!', '?']) {
        if !current.is_empty() && current.len() + sentence.len() > target {
            chunks.push(std::mem::take(&mut current));
        }
        current.push_str(sentence);
    }
    if !current.trim().is_empty() {
        chunks.push(current);
    }

    chunks
}

/// Element-wise mean of equally sized vectors.
fn mean_pool(vectors: &[Vec<f32>]) -> Vec<f32> {
    let Some(first) = vectors.first() else { return Vec::new() };
    let mut pooled = vec![0.0f32; first.len()];
    let mut counted = 0usize;

    for vector in vectors {
        if vector.len() != pooled.len() {
            continue;
        }
        for (slot, value) in pooled.iter_mut().zip(vector) {
            *slot += value;
        }
        counted += 1;
    }

    if counted > 0 {
        for slot in &mut pooled {
            *slot /= counted as f32;
        }
    }
    pooled
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockEmbedder;

    fn vectorizer() -> Vectorizer {
        Vectorizer::new(VectorizerConfig { max_content_length: 500, chunk_threshold: 40, dimension: 8 })
    }

    fn content(text: &str) -> ExtractedContent {
        ExtractedContent {
            title: Some("Title".into()),
            normalized_text: text.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn vectorizes_present_projections() {
        let embedder = MockEmbedder::new(8);
        let vectors = vectorizer().vectorize(&embedder, &content("hello world")).await;
        assert!(vectors.main.is_some());
        assert!(vectors.title.is_some());
        assert!(vectors.combined.is_some());
        assert!(vectors.meta.is_none());
        assert!(vectors.text_blocks.is_none());
    }

    #[tokio::test]
    async fn embedding_failure_leaves_slot_empty() {
        let embedder = MockEmbedder::new(8).failing();
        let vectors = vectorizer().vectorize(&embedder, &content("hello world")).await;
        assert!(vectors.is_empty());
    }

    #[tokio::test]
    async fn long_text_is_chunked_and_pooled() {
        let embedder = MockEmbedder::new(8);
        let long = "one sentence here. another sentence there. a third one follows. and more text comes. final words now.";
        let vectors = vectorizer().vectorize(&embedder, &content(long)).await;
        let main = vectors.main.unwrap();
        assert_eq!(main.len(), 8);
        assert!(embedder.embed_calls() > 2, "expected chunked embedding");
    }

    #[test]
    fn sentences_split_near_target() {
        let chunks = split_sentences("aaa. bbb. ccc. ddd.", 10);
        assert!(chunks.len() >= 2);
        assert_eq!(chunks.join(""), "aaa. bbb. ccc. ddd.");
    }

    #[test]
    fn mean_pool_averages() {
        let pooled = mean_pool(&[vec![1.0, 3.0], vec![3.0, 5.0]]);
        assert_eq!(pooled, vec![2.0, 4.0]);
    }

    #[test]
    fn mean_pool_of_nothing_is_empty() {
        assert!(mean_pool(&[]).is_empty());
    }
}
