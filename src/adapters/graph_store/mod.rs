//! File-backed `GraphStore`: wraps an in-memory [`DependencyGraph`] and
//! persists it as `dependency_graph.json` (spec.md §6.1) after every
//! write, so the graph survives process restarts without replaying every
//! `ExtractedUnit`.

use crate::domain::error::Result;
use crate::domain::ports::graph_store::GraphStore;
use crate::domain::types::{DependencyEdge, UnitType};
use crate::graph::{DependencyGraph, GraphMap};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::sync::Mutex;

pub struct FileGraphStore {
    graph: DependencyGraph,
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileGraphStore {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let graph = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let map: GraphMap = serde_json::from_slice(&bytes)?;
                DependencyGraph::from_map(map)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => DependencyGraph::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            graph,
            path,
            write_lock: Mutex::new(()),
        })
    }

    /// The live graph, shared with the rest of the engine so reads never
    /// round-trip through this store.
    pub fn graph(&self) -> DependencyGraph {
        self.graph.clone()
    }

    async fn persist(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let map = self.graph.to_map();
        let bytes = serde_json::to_vec_pretty(&map)?;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut tmp = self.path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp_path = PathBuf::from(tmp);
        tokio::fs::write(&tmp_path, bytes).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl GraphStore for FileGraphStore {
    async fn register(&self, id: &str, unit_type: &str, edges: Vec<DependencyEdge>) -> Result<()> {
        self.graph.register(id, UnitType::parse(unit_type), edges);
        self.persist().await
    }

    async fn dependencies_of(&self, id: &str) -> Result<Vec<DependencyEdge>> {
        Ok(self.graph.dependencies_of(id))
    }

    async fn dependents_of(&self, id: &str) -> Result<Vec<String>> {
        Ok(self.graph.dependents_of(id))
    }

    async fn traverse_forward(&self, start: &str, max_depth: usize) -> Result<Vec<String>> {
        Ok(self.graph.traverse_forward(start, max_depth))
    }

    async fn traverse_reverse(&self, start: &str, max_depth: usize) -> Result<Vec<String>> {
        Ok(self.graph.traverse_reverse(start, max_depth))
    }

    async fn shortest_path(&self, from: &str, to: &str) -> Result<Option<Vec<String>>> {
        Ok(self.graph.shortest_path(from, to))
    }

    async fn subgraph_for_types(&self, types: &[String]) -> Result<Vec<String>> {
        let mut ids = std::collections::BTreeSet::new();
        for t in types {
            ids.extend(self.graph.ids_of_type(UnitType::parse(t)));
        }
        Ok(ids.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::RelationKind;

    #[tokio::test]
    async fn registered_edges_persist_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dependency_graph.json");
        let store = FileGraphStore::open(&path).await.unwrap();
        store
            .register(
                "Order",
                "model",
                vec![DependencyEdge {
                    target_identifier: "Payment".into(),
                    relation_kind: RelationKind::Associates,
                }],
            )
            .await
            .unwrap();

        let reopened = FileGraphStore::open(&path).await.unwrap();
        let deps = reopened.dependencies_of("Order").await.unwrap();
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].target_identifier, "Payment");
    }

    #[tokio::test]
    async fn missing_file_opens_as_empty_graph() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileGraphStore::open(dir.path().join("missing.json")).await.unwrap();
        assert!(store.dependencies_of("Anything").await.unwrap().is_empty());
    }
}
