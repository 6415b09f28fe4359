//! Persisted checkpoint gating re-embedding: `{unit_id: source_hash,
//! chunk_id: content_hash}` plus provenance. Loaded once at Indexer
//! construction, written back after every successful batch.

use crate::domain::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Checkpoint {
    pub units: BTreeMap<String, String>,
    pub chunks: BTreeMap<String, String>,
    pub embedded_at: Option<chrono::DateTime<chrono::Utc>>,
    pub provider_model: Option<String>,
    pub dimensions: Option<usize>,
}

impl Checkpoint {
    pub async fn load(path: &Path) -> Result<Self> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = serde_json::to_vec_pretty(self)?;
        let tmp_path = tmp_path_for(path);
        tokio::fs::write(&tmp_path, bytes).await?;
        tokio::fs::rename(&tmp_path, path).await?;
        Ok(())
    }

    pub fn chunk_hash_matches(&self, chunk_id: &str, content_hash: &str) -> bool {
        self.chunks.get(chunk_id).map(|h| h.as_str()) == Some(content_hash)
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_checkpoint_loads_as_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoint.json");
        let checkpoint = Checkpoint::load(&path).await.unwrap();
        assert!(checkpoint.units.is_empty());
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoint.json");
        let mut checkpoint = Checkpoint::default();
        checkpoint.units.insert("Order".to_string(), "abc".to_string());
        checkpoint.save(&path).await.unwrap();

        let loaded = Checkpoint::load(&path).await.unwrap();
        assert_eq!(loaded.units.get("Order"), Some(&"abc".to_string()));
    }
}
