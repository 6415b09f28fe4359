//! Deterministic embedding provider used where no real AI provider is
//! configured: tests, offline development, and CI. Produces a stable
//! vector from a hash of the input text rather than a call to an external
//! service, so retrieval semantics (ranking, dedup) are exercisable
//! without network access or an API key.

use crate::domain::error::Result;
use crate::domain::ports::embedding::{EmbeddingProvider, EmbeddingVector};
use async_trait::async_trait;
use sha2::{Digest, Sha256};

const DIMENSIONS: usize = 64;

pub struct DeterministicEmbeddingProvider {
    dimensions: usize,
}

impl DeterministicEmbeddingProvider {
    pub fn new() -> Self {
        Self { dimensions: DIMENSIONS }
    }

    pub fn with_dimensions(dimensions: usize) -> Self {
        Self { dimensions }
    }

    fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut values = Vec::with_capacity(self.dimensions);
        let mut counter: u32 = 0;
        while values.len() < self.dimensions {
            let mut hasher = Sha256::new();
            hasher.update(text.as_bytes());
            hasher.update(counter.to_le_bytes());
            let digest = hasher.finalize();
            for chunk in digest.chunks(4) {
                if values.len() >= self.dimensions {
                    break;
                }
                let mut buf = [0u8; 4];
                buf[..chunk.len()].copy_from_slice(chunk);
                let raw = u32::from_le_bytes(buf);
                values.push((raw as f32 / u32::MAX as f32) * 2.0 - 1.0);
            }
            counter += 1;
        }
        values
    }
}

impl Default for DeterministicEmbeddingProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingProvider for DeterministicEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<EmbeddingVector> {
        Ok(EmbeddingVector {
            values: self.vector_for(text),
            model: self.model_name().to_string(),
            dimensions: self.dimensions,
        })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>> {
        Ok(texts.iter().map(|t| EmbeddingVector {
            values: self.vector_for(t),
            model: self.model_name().to_string(),
            dimensions: self.dimensions,
        }).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        "deterministic-hash-v1"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_text_yields_same_vector() {
        let provider = DeterministicEmbeddingProvider::new();
        let a = provider.embed("find Order").await.unwrap();
        let b = provider.embed("find Order").await.unwrap();
        assert_eq!(a.values, b.values);
    }

    #[tokio::test]
    async fn different_text_yields_different_vector() {
        let provider = DeterministicEmbeddingProvider::new();
        let a = provider.embed("find Order").await.unwrap();
        let b = provider.embed("find Payment").await.unwrap();
        assert_ne!(a.values, b.values);
    }

    #[tokio::test]
    async fn vector_has_configured_dimensions() {
        let provider = DeterministicEmbeddingProvider::with_dimensions(16);
        let v = provider.embed("x").await.unwrap();
        assert_eq!(v.values.len(), 16);
    }
}
