//! Embedder trait — maps text to a dense vector for similarity checks.

use async_trait::async_trait;

use crate::error::EmbeddingError;

#[async_trait]
pub trait Embedder: Send + Sync {
    /// A human-readable name for this embedder.
    fn name(&self) -> &str;

    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}
