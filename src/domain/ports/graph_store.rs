//! Graph store port: persisted edges backing the in-memory
//! [`crate::graph::DependencyGraph`].

use crate::domain::error::Result;
use crate::domain::types::DependencyEdge;
use async_trait::async_trait;

/// Persists the dependency graph's edges so they survive process restarts
/// and can be rebuilt without re-reading every `ExtractedUnit`.
#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn register(&self, id: &str, unit_type: &str, edges: Vec<DependencyEdge>) -> Result<()>;
    async fn dependencies_of(&self, id: &str) -> Result<Vec<DependencyEdge>>;
    async fn dependents_of(&self, id: &str) -> Result<Vec<String>>;
    async fn traverse_forward(&self, start: &str, max_depth: usize) -> Result<Vec<String>>;
    async fn traverse_reverse(&self, start: &str, max_depth: usize) -> Result<Vec<String>>;
    async fn shortest_path(&self, from: &str, to: &str) -> Result<Option<Vec<String>>>;
    async fn subgraph_for_types(&self, types: &[String]) -> Result<Vec<String>>;
}
