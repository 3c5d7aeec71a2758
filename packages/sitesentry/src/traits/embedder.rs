//! Embedding port.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::VectorKind;

/// Produces fixed-dimension semantic embeddings.
///
/// `embed` must be deterministic for a fixed model; the dimension is a
/// configuration parameter known to both the engine and the implementation.
/// A failing embedder is tolerated: the classifier runs without vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str, kind: VectorKind) -> Result<Vec<f32>>;

    fn dimension(&self) -> usize;
}
