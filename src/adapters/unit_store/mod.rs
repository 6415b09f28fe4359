//! Filesystem-backed `UnitStore`: reads `ExtractedUnit` JSON from the
//! on-disk extraction layout (spec.md §6.1).

use crate::domain::error::Result;
use crate::domain::ports::unit_store::UnitStore;
use crate::domain::types::ExtractedUnit;
use async_trait::async_trait;
use dashmap::DashMap;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Reserved beyond what's already unsafe in a POSIX filename: identifiers
/// may contain `::`, `:`, `_`, `#` (spec.md §6.1); `:` and `#` are encoded.
const RESERVED: &AsciiSet = &CONTROLS.add(b':').add(b'#').add(b'/').add(b'\\');

fn encode_filename(identifier: &str) -> String {
    utf8_percent_encode(identifier, RESERVED).to_string()
}

#[derive(Clone)]
struct IndexEntry {
    path: PathBuf,
    unit_type: String,
}

/// Indexes every `<type>/<Identifier>.json` file under `output_dir` at
/// construction time so `get` is a single file read rather than a search.
pub struct FsUnitStore {
    index: DashMap<String, IndexEntry>,
}

impl FsUnitStore {
    pub async fn open(output_dir: impl Into<PathBuf>) -> Result<Self> {
        let root = output_dir.into();
        let entries = tokio::task::spawn_blocking(move || scan(&root)).await.unwrap_or_default();
        let index = DashMap::new();
        for (identifier, entry) in entries {
            index.insert(identifier, entry);
        }
        Ok(Self { index })
    }
}

fn scan(root: &Path) -> Vec<(String, IndexEntry)> {
    let mut found = Vec::new();
    for entry in WalkDir::new(root).min_depth(2).max_depth(2).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        if entry.path().extension().and_then(|s| s.to_str()) != Some("json") {
            continue;
        }
        if entry.file_name() == "_index.json" {
            continue;
        }
        let Some(type_dir) = entry.path().parent().and_then(|p| p.file_name()).and_then(|s| s.to_str()) else {
            continue;
        };
        let Ok(bytes) = std::fs::read(entry.path()) else {
            continue;
        };
        let Ok(unit) = serde_json::from_slice::<ExtractedUnit>(&bytes) else {
            continue;
        };
        found.push((
            unit.identifier,
            IndexEntry {
                path: entry.path().to_path_buf(),
                unit_type: type_dir.to_string(),
            },
        ));
    }
    found
}

#[async_trait]
impl UnitStore for FsUnitStore {
    async fn get(&self, identifier: &str) -> Result<Option<ExtractedUnit>> {
        let Some(entry) = self.index.get(identifier) else {
            return Ok(None);
        };
        let bytes = tokio::fs::read(&entry.path).await?;
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    async fn list_ids(&self) -> Result<Vec<String>> {
        Ok(self.index.iter().map(|e| e.key().clone()).collect())
    }

    async fn list_by_type(&self, unit_type: &str) -> Result<Vec<String>> {
        Ok(self
            .index
            .iter()
            .filter(|e| e.value().unit_type.trim_end_matches('s') == unit_type.trim_end_matches('s'))
            .map(|e| e.key().clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{sha256_hex, UnitMetadata, UnitType};

    async fn write_unit(dir: &Path, type_dir: &str, identifier: &str) {
        let unit = ExtractedUnit {
            identifier: identifier.to_string(),
            unit_type: UnitType::Model,
            file_path: format!("{identifier}.rb"),
            namespace: "".into(),
            source_code: Some("class Order; end".into()),
            metadata: UnitMetadata::default(),
            dependencies: vec![],
            dependents: vec![],
            chunks: vec![],
            source_hash: sha256_hex(b"class Order; end"),
            estimated_tokens: 0,
        };
        let type_path = dir.join(type_dir);
        tokio::fs::create_dir_all(&type_path).await.unwrap();
        let bytes = serde_json::to_vec(&unit).unwrap();
        tokio::fs::write(type_path.join(format!("{}.json", encode_filename(identifier))), bytes)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn get_reads_unit_by_identifier() {
        let dir = tempfile::tempdir().unwrap();
        write_unit(dir.path(), "models", "Order").await;
        let store = FsUnitStore::open(dir.path()).await.unwrap();
        let unit = store.get("Order").await.unwrap();
        assert!(unit.is_some());
    }

    #[tokio::test]
    async fn unknown_identifier_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsUnitStore::open(dir.path()).await.unwrap();
        assert!(store.get("Nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn identifier_with_namespace_separator_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        write_unit(dir.path(), "models", "Billing::Order").await;
        let store = FsUnitStore::open(dir.path()).await.unwrap();
        let unit = store.get("Billing::Order").await.unwrap();
        assert!(unit.is_some());
    }
}
