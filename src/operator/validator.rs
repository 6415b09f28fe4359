//! `IndexValidator`: walks the on-disk extraction tree, recomputes a
//! SHA-256 per unit, and compares against the checkpoint (spec.md §4.9).

use crate::domain::error::Result;
use crate::domain::types::{sha256_hex, ExtractedUnit};
use crate::indexing::Checkpoint;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use walkdir::WalkDir;

#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    /// On disk, never embedded (absent from the checkpoint).
    pub missing: Vec<String>,
    /// In the checkpoint, no longer present on disk.
    pub orphaned: Vec<String>,
    /// Present in both but the recomputed source hash disagrees with the
    /// checkpoint's recorded hash — the unit changed since last embed.
    pub hash_mismatch: Vec<String>,
    /// Checkpointed chunks whose parent unit is gone.
    pub stale_vectors: Vec<String>,
}

pub struct IndexValidator {
    output_dir: PathBuf,
}

impl IndexValidator {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub async fn validate(&self, checkpoint: &Checkpoint) -> Result<ValidationReport> {
        let on_disk = self.scan_units().await?;
        let on_disk_ids: BTreeSet<&str> = on_disk.keys().map(|s| s.as_str()).collect();

        let mut report = ValidationReport::default();

        for (id, hash) in &on_disk {
            match checkpoint.units.get(id) {
                None => report.missing.push(id.clone()),
                Some(checkpointed_hash) if checkpointed_hash != hash => report.hash_mismatch.push(id.clone()),
                Some(_) => {}
            }
        }

        for id in checkpoint.units.keys() {
            if !on_disk_ids.contains(id.as_str()) {
                report.orphaned.push(id.clone());
            }
        }

        for chunk_id in checkpoint.chunks.keys() {
            let parent = chunk_id.split("::").next().unwrap_or(chunk_id);
            if !on_disk_ids.contains(parent) {
                report.stale_vectors.push(chunk_id.clone());
            }
        }

        Ok(report)
    }

    async fn scan_units(&self) -> Result<BTreeMap<String, String>> {
        let mut units = BTreeMap::new();
        let root = self.output_dir.clone();
        let entries: Vec<PathBuf> = tokio::task::spawn_blocking(move || {
            WalkDir::new(&root)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("json"))
                .filter(|e| e.file_name() != "_index.json")
                .filter(|e| e.file_name() != "manifest.json")
                .filter(|e| e.file_name() != "dependency_graph.json")
                .map(|e| e.path().to_path_buf())
                .collect()
        })
        .await
        .unwrap_or_default();

        for path in entries {
            let bytes = match tokio::fs::read(&path).await {
                Ok(b) => b,
                Err(_) => continue,
            };
            let Ok(unit) = serde_json::from_slice::<ExtractedUnit>(&bytes) else {
                continue;
            };
            let hash = sha256_hex(unit.source_code.as_deref().unwrap_or("").as_bytes());
            units.insert(unit.identifier, hash);
        }
        Ok(units)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{UnitMetadata, UnitType};

    async fn write_unit(dir: &std::path::Path, identifier: &str, source: &str) {
        let unit = ExtractedUnit {
            identifier: identifier.to_string(),
            unit_type: UnitType::Model,
            file_path: format!("{identifier}.rb"),
            namespace: "".into(),
            source_code: Some(source.to_string()),
            metadata: UnitMetadata::default(),
            dependencies: vec![],
            dependents: vec![],
            chunks: vec![],
            source_hash: sha256_hex(source.as_bytes()),
            estimated_tokens: 0,
        };
        let type_dir = dir.join("models");
        tokio::fs::create_dir_all(&type_dir).await.unwrap();
        let bytes = serde_json::to_vec(&unit).unwrap();
        tokio::fs::write(type_dir.join(format!("{identifier}.json")), bytes).await.unwrap();
    }

    #[tokio::test]
    async fn unit_never_embedded_is_missing() {
        let dir = tempfile::tempdir().unwrap();
        write_unit(dir.path(), "Order", "class Order; end").await;
        let validator = IndexValidator::new(dir.path());
        let report = validator.validate(&Checkpoint::default()).await.unwrap();
        assert_eq!(report.missing, vec!["Order".to_string()]);
    }

    #[tokio::test]
    async fn changed_source_is_hash_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        write_unit(dir.path(), "Order", "class Order; end").await;
        let mut checkpoint = Checkpoint::default();
        checkpoint.units.insert("Order".to_string(), "stale-hash".to_string());
        let validator = IndexValidator::new(dir.path());
        let report = validator.validate(&checkpoint).await.unwrap();
        assert_eq!(report.hash_mismatch, vec!["Order".to_string()]);
    }

    #[tokio::test]
    async fn checkpointed_unit_absent_from_disk_is_orphaned() {
        let dir = tempfile::tempdir().unwrap();
        let mut checkpoint = Checkpoint::default();
        checkpoint.units.insert("Deleted".to_string(), "h".to_string());
        let validator = IndexValidator::new(dir.path());
        let report = validator.validate(&checkpoint).await.unwrap();
        assert_eq!(report.orphaned, vec!["Deleted".to_string()]);
    }

    #[tokio::test]
    async fn chunk_whose_parent_is_gone_is_stale_vector() {
        let dir = tempfile::tempdir().unwrap();
        let mut checkpoint = Checkpoint::default();
        checkpoint.chunks.insert("Deleted::whole#0".to_string(), "h".to_string());
        let validator = IndexValidator::new(dir.path());
        let report = validator.validate(&checkpoint).await.unwrap();
        assert_eq!(report.stale_vectors, vec!["Deleted::whole#0".to_string()]);
    }
}
