//! Vector store port.
//!
//! Filter keys are restricted to a declared allow-list and bound as
//! identifiers (never interpolated); values are passed as parameters. This
//! is an injection-defense requirement on every implementation, not just
//! SQL-backed ones.

use crate::domain::error::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;

/// Allow-listed filter keys a `search`/`delete_by_filter` call may use.
pub const ALLOWED_FILTER_KEYS: &[&str] = &[
    "type",
    "namespace",
    "parent",
    "chunk_kind",
    "change_frequency",
    "importance",
];

/// Validate that every key in `filters` is on the declared allow-list.
/// Unknown keys are a `Validation` error, not silently ignored.
pub fn validate_filter_keys(filters: &BTreeMap<String, Value>) -> Result<()> {
    for key in filters.keys() {
        if !ALLOWED_FILTER_KEYS.contains(&key.as_str()) {
            return Err(crate::domain::error::Error::validation(format!(
                "unknown filter key: {key}"
            )));
        }
    }
    Ok(())
}

/// A single vector search hit.
#[derive(Debug, Clone)]
pub struct VectorHit {
    pub id: String,
    pub similarity: f64,
    pub metadata: BTreeMap<String, Value>,
}

/// Persists embedding vectors keyed by chunk/unit id, with a structured
/// metadata snapshot alongside each vector for filtering.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn upsert(&self, id: &str, vector: &[f32], metadata: BTreeMap<String, Value>) -> Result<()>;
    async fn upsert_batch(&self, items: Vec<(String, Vec<f32>, BTreeMap<String, Value>)>) -> Result<()>;
    async fn search(
        &self,
        vector: &[f32],
        filters: &BTreeMap<String, Value>,
        limit: usize,
    ) -> Result<Vec<VectorHit>>;
    async fn delete(&self, ids: &[String]) -> Result<()>;
    async fn delete_by_filter(&self, filters: &BTreeMap<String, Value>) -> Result<u64>;
}
