//! In-memory `VectorStore`: brute-force cosine similarity over a
//! `dashmap`-backed table. Stands in for a real vector database (pgvector,
//! Qdrant, ...) so the engine is exercisable without one (spec.md §6.2).

use crate::domain::error::Result;
use crate::domain::ports::vector_store::{validate_filter_keys, VectorHit, VectorStore};
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::collections::BTreeMap;

struct Entry {
    vector: Vec<f32>,
    metadata: BTreeMap<String, Value>,
}

pub struct InMemoryVectorStore {
    entries: DashMap<String, Entry>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self { entries: DashMap::new() }
    }

    fn matches(metadata: &BTreeMap<String, Value>, filters: &BTreeMap<String, Value>) -> bool {
        filters.iter().all(|(k, v)| metadata.get(k) == Some(v))
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a * norm_b)) as f64
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert(&self, id: &str, vector: &[f32], metadata: BTreeMap<String, Value>) -> Result<()> {
        self.entries.insert(
            id.to_string(),
            Entry {
                vector: vector.to_vec(),
                metadata,
            },
        );
        Ok(())
    }

    async fn upsert_batch(&self, items: Vec<(String, Vec<f32>, BTreeMap<String, Value>)>) -> Result<()> {
        for (id, vector, metadata) in items {
            self.upsert(&id, &vector, metadata).await?;
        }
        Ok(())
    }

    async fn search(&self, vector: &[f32], filters: &BTreeMap<String, Value>, limit: usize) -> Result<Vec<VectorHit>> {
        validate_filter_keys(filters)?;
        let mut hits: Vec<VectorHit> = self
            .entries
            .iter()
            .filter(|entry| Self::matches(&entry.value().metadata, filters))
            .map(|entry| VectorHit {
                id: entry.key().clone(),
                similarity: cosine_similarity(vector, &entry.value().vector),
                metadata: entry.value().metadata.clone(),
            })
            .collect();
        hits.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.id.cmp(&b.id)));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn delete(&self, ids: &[String]) -> Result<()> {
        for id in ids {
            self.entries.remove(id);
        }
        Ok(())
    }

    async fn delete_by_filter(&self, filters: &BTreeMap<String, Value>) -> Result<u64> {
        validate_filter_keys(filters)?;
        let to_remove: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| Self::matches(&entry.value().metadata, filters))
            .map(|entry| entry.key().clone())
            .collect();
        let count = to_remove.len() as u64;
        for id in to_remove {
            self.entries.remove(&id);
        }
        Ok(count)
    }
}
