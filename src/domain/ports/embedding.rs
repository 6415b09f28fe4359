//! Embedding provider port.

use crate::domain::error::Result;
use async_trait::async_trait;

/// A dense vector representation of text, with the model that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingVector {
    pub values: Vec<f32>,
    pub model: String,
    pub dimensions: usize,
}

/// Boundary contract for AI providers that transform text into semantic
/// embeddings. Concrete providers (OpenAI, local models, ...) are external
/// collaborators; this crate only depends on the trait.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<EmbeddingVector>;
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>>;
    fn dimensions(&self) -> usize;
    fn model_name(&self) -> &str;
    /// Maximum characters this provider will accept for a single input,
    /// used by the TextPreparer's per-provider character ceiling.
    fn character_ceiling(&self) -> usize {
        8000
    }
    /// Preferred batch size for `embed_batch` calls.
    fn batch_size(&self) -> usize {
        32
    }
}
