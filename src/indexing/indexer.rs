//! Coordinates embedding materialization: reads `ExtractedUnit`s, chunks
//! and embeds them, upserts to the vector/metadata stores, and registers
//! dependency edges (spec.md §4.2).

use crate::chunking::{Chunker, TextPreparer};
use crate::domain::error::Result;
use crate::domain::ports::embedding::EmbeddingProvider;
use crate::domain::ports::graph_store::GraphStore;
use crate::domain::ports::metadata_store::MetadataStore;
use crate::domain::ports::unit_store::UnitStore;
use crate::domain::ports::vector_store::VectorStore;
use crate::domain::types::ChunkRecord;
use crate::graph::DependencyGraph;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::checkpoint::Checkpoint;
use super::importance::compute_importance;

/// How many times a failed chunk is re-queued for embedding before the
/// batch's failure is escalated.
const MAX_CHUNK_RETRIES: u32 = 3;

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct IndexReport {
    pub units_seen: usize,
    pub chunks_embedded: usize,
    pub chunks_skipped: usize,
    pub units_deleted: usize,
    pub chunks_failed: usize,
}

pub struct Indexer {
    unit_store: Arc<dyn UnitStore>,
    vector_store: Arc<dyn VectorStore>,
    metadata_store: Arc<dyn MetadataStore>,
    graph_store: Arc<dyn GraphStore>,
    graph: DependencyGraph,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    checkpoint_path: PathBuf,
    checkpoint: Mutex<Checkpoint>,
}

impl Indexer {
    pub async fn new(
        unit_store: Arc<dyn UnitStore>,
        vector_store: Arc<dyn VectorStore>,
        metadata_store: Arc<dyn MetadataStore>,
        graph_store: Arc<dyn GraphStore>,
        graph: DependencyGraph,
        embedding_provider: Arc<dyn EmbeddingProvider>,
        checkpoint_path: PathBuf,
    ) -> Result<Self> {
        let checkpoint = Checkpoint::load(&checkpoint_path).await?;
        Ok(Self {
            unit_store,
            vector_store,
            metadata_store,
            graph_store,
            graph,
            embedding_provider,
            checkpoint_path,
            checkpoint: Mutex::new(checkpoint),
        })
    }

    /// Build the full index from every id the `UnitStore` currently knows.
    pub async fn index_all(&self) -> Result<IndexReport> {
        let ids = self.unit_store.list_ids().await?;
        self.index_ids(&ids, true).await
    }

    /// Recompute only the listed ids; no deleted-unit cleanup pass.
    pub async fn index_incremental(&self, ids: &[String]) -> Result<IndexReport> {
        self.index_ids(ids, false).await
    }

    async fn index_ids(&self, ids: &[String], run_cleanup: bool) -> Result<IndexReport> {
        let mut report = IndexReport::default();

        for id in ids {
            let Some(unit) = self.unit_store.get(id).await? else {
                warn!(unit_id = %id, "unit listed but not found; skipping");
                continue;
            };
            report.units_seen += 1;

            let mut checkpoint = self.checkpoint.lock().await;
            let source_unchanged = checkpoint.units.get(id) == Some(&unit.source_hash);
            drop(checkpoint);

            let chunks = Chunker::chunk(&unit, self.embedding_provider.character_ceiling());
            let (embedded, skipped, failed) = self.index_chunks(&unit, &chunks).await?;
            report.chunks_embedded += embedded;
            report.chunks_skipped += skipped;
            report.chunks_failed += failed;

            if !source_unchanged || embedded > 0 {
                self.metadata_store.upsert(&unit.identifier, unit.metadata.clone()).await?;
            }

            self.graph_store
                .register(&unit.identifier, unit.unit_type.as_str(), unit.dependencies.clone())
                .await?;
            self.graph.register(&unit.identifier, unit.unit_type, unit.dependencies.clone());

            let mut checkpoint = self.checkpoint.lock().await;
            checkpoint.units.insert(unit.identifier.clone(), unit.source_hash.clone());
            checkpoint.save(&self.checkpoint_path).await?;
        }

        if run_cleanup {
            report.units_deleted = self.cleanup_deleted(ids).await?;
        }

        info!(
            units_seen = report.units_seen,
            chunks_embedded = report.chunks_embedded,
            chunks_skipped = report.chunks_skipped,
            units_deleted = report.units_deleted,
            "indexing pass complete"
        );
        Ok(report)
    }

    /// Embed any chunk whose `content_hash` doesn't match the checkpoint,
    /// batched to the provider's preferred size. The vector upsert happens
    /// before the checkpoint write for every chunk (durability ordering);
    /// a chunk is never left with a stored hash but no vector.
    async fn index_chunks(&self, unit: &crate::domain::types::ExtractedUnit, chunks: &[ChunkRecord]) -> Result<(usize, usize, usize)> {
        let mut pending: Vec<&ChunkRecord> = Vec::new();
        let mut skipped = 0;
        {
            let checkpoint = self.checkpoint.lock().await;
            for chunk in chunks {
                if checkpoint.chunk_hash_matches(&chunk.chunk_id, &chunk.content_hash) {
                    skipped += 1;
                } else {
                    pending.push(chunk);
                }
            }
        }

        let mut embedded = 0;
        let mut failed = 0;
        let batch_size = self.embedding_provider.batch_size().max(1);
        let importance = compute_importance(unit);

        for batch in pending.chunks(batch_size) {
            let texts: Vec<String> = batch
                .iter()
                .map(|c| TextPreparer::prepare(unit, c, self.embedding_provider.character_ceiling()).text)
                .collect();

            let mut attempt = 0;
            let mut to_embed: Vec<usize> = (0..batch.len()).collect();
            let mut vectors: Vec<Option<Vec<f32>>> = vec![None; batch.len()];

            while !to_embed.is_empty() && attempt < MAX_CHUNK_RETRIES {
                let subset_texts: Vec<String> = to_embed.iter().map(|&i| texts[i].clone()).collect();
                match self.embedding_provider.embed_batch(&subset_texts).await {
                    Ok(results) => {
                        for (idx, vector) in to_embed.iter().zip(results) {
                            vectors[*idx] = Some(vector.values);
                        }
                        to_embed.clear();
                    }
                    Err(e) => {
                        warn!(error = %e, attempt, "chunk batch embedding failed, retrying");
                        attempt += 1;
                    }
                }
            }

            for (idx, chunk) in batch.iter().enumerate() {
                let Some(vector) = vectors[idx].take() else {
                    failed += 1;
                    continue;
                };
                let mut metadata = BTreeMap::new();
                metadata.insert("type".to_string(), Value::String(unit.unit_type.as_str().to_string()));
                metadata.insert("namespace".to_string(), Value::String(unit.namespace.clone()));
                metadata.insert("parent".to_string(), Value::String(unit.identifier.clone()));
                metadata.insert(
                    "chunk_kind".to_string(),
                    serde_json::to_value(chunk.chunk_kind).unwrap_or(Value::Null),
                );
                metadata.insert(
                    "change_frequency".to_string(),
                    serde_json::to_value(unit.metadata.git.change_frequency).unwrap_or(Value::Null),
                );
                metadata.insert("importance".to_string(), Value::String(importance.as_str().to_string()));

                self.vector_store.upsert(&chunk.chunk_id, &vector, metadata).await?;

                let mut checkpoint = self.checkpoint.lock().await;
                checkpoint.chunks.insert(chunk.chunk_id.clone(), chunk.content_hash.clone());
                embedded += 1;
            }
        }

        Ok((embedded, skipped, failed))
    }

    /// Drop checkpoint entries for `ids` without touching the vector or
    /// metadata store, so the next indexing pass treats them as never
    /// embedded. Used by `Repair::stale_units` — re-extraction itself is
    /// upstream of this engine.
    pub async fn forget(&self, ids: &[String]) -> Result<usize> {
        let mut checkpoint = self.checkpoint.lock().await;
        let mut forgotten = 0;
        for id in ids {
            if checkpoint.units.remove(id).is_some() {
                forgotten += 1;
            }
            checkpoint.chunks.retain(|chunk_id, _| !chunk_id.starts_with(&format!("{id}::")));
        }
        checkpoint.save(&self.checkpoint_path).await?;
        Ok(forgotten)
    }

    /// Units present in the checkpoint but absent from the latest
    /// extraction are deleted from both stores.
    async fn cleanup_deleted(&self, current_ids: &[String]) -> Result<usize> {
        let current: std::collections::BTreeSet<&str> = current_ids.iter().map(|s| s.as_str()).collect();
        let stale: Vec<String> = {
            let checkpoint = self.checkpoint.lock().await;
            checkpoint
                .units
                .keys()
                .filter(|id| !current.contains(id.as_str()))
                .cloned()
                .collect()
        };

        for id in &stale {
            let mut filters = BTreeMap::new();
            filters.insert("parent".to_string(), Value::String(id.clone()));
            self.vector_store.delete_by_filter(&filters).await?;
            self.metadata_store.delete(id).await?;

            let mut checkpoint = self.checkpoint.lock().await;
            checkpoint.units.remove(id);
            checkpoint.chunks.retain(|chunk_id, _| !chunk_id.starts_with(&format!("{id}::")));
        }
        if !stale.is_empty() {
            let checkpoint = self.checkpoint.lock().await;
            checkpoint.save(&self.checkpoint_path).await?;
        }
        Ok(stale.len())
    }
}
