//! Scoped repair operations, each acquiring the pipeline lock for the
//! duration of its write (spec.md §4.9).

use crate::domain::error::Result;
use crate::domain::ports::vector_store::VectorStore;
use crate::indexing::{IndexReport, Indexer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::pipeline_lock::PipelineLock;

pub struct Repair {
    indexer: Arc<Indexer>,
    vector_store: Arc<dyn VectorStore>,
    lock: PipelineLock,
    agent: String,
}

impl Repair {
    pub fn new(indexer: Arc<Indexer>, vector_store: Arc<dyn VectorStore>, lock: PipelineLock, agent: impl Into<String>) -> Self {
        Self {
            indexer,
            vector_store,
            lock,
            agent: agent.into(),
        }
    }

    /// Re-embed the listed units.
    pub async fn missing_embeddings(&self, identifiers: &[String]) -> Result<IndexReport> {
        let guard = self.lock.acquire(&self.agent, "repair:missing_embeddings").await?;
        let report = self.indexer.index_incremental(identifiers).await;
        guard.release().await;
        report
    }

    /// Delete vectors whose parent unit no longer exists.
    pub async fn orphaned_vectors(&self, identifiers: &[String]) -> Result<usize> {
        let guard = self.lock.acquire(&self.agent, "repair:orphaned_vectors").await?;
        for id in identifiers {
            let mut filters = BTreeMap::new();
            filters.insert("parent".to_string(), Value::String(id.clone()));
            self.vector_store.delete_by_filter(&filters).await?;
        }
        guard.release().await;
        Ok(identifiers.len())
    }

    /// Force an incremental reindex of the listed units to resolve a
    /// unit-count discrepancy against the manifest.
    pub async fn count_mismatch(&self, identifiers: &[String]) -> Result<IndexReport> {
        let guard = self.lock.acquire(&self.agent, "repair:count_mismatch").await?;
        let report = self.indexer.index_incremental(identifiers).await;
        guard.release().await;
        report
    }

    /// Drop checkpoint state for the listed units so the next extraction
    /// run re-extracts and re-embeds them from scratch.
    pub async fn stale_units(&self, identifiers: &[String]) -> Result<usize> {
        let guard = self.lock.acquire(&self.agent, "repair:stale_units").await?;
        let forgotten = self.indexer.forget(identifiers).await;
        guard.release().await;
        forgotten
    }
}
