//! Bidirectional dependency graph: forward/reverse adjacency, traversals,
//! PageRank, and structural analysis (orphans, hubs, cycles, bridges).
//!
//! Writers install a brand-new immutable [`Snapshot`] via [`ArcSwap`] rather
//! than mutating shared state in place (spec.md §5: "copy-on-write on
//! re-register; readers hold references to the previous immutable
//! snapshot"). A reader that loaded a snapshot before a concurrent
//! `register` call always sees a fully consistent graph, never a partial
//! re-registration.

mod analysis;
mod pagerank;
mod traverse;

pub use analysis::{Bridge, Cycle, StructuralReport};
pub use pagerank::PageRankScores;

use crate::domain::types::{DependencyEdge, RelationKind, UnitType};
use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// One node's forward/reverse adjacency, keyed by identifier.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct NodeEdges {
    unit_type: Option<UnitType>,
    forward: Vec<DependencyEdge>,
    reverse: BTreeSet<String>,
}

/// An immutable point-in-time view of the graph.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    nodes: BTreeMap<String, NodeEdges>,
    type_index: BTreeMap<UnitType, BTreeSet<String>>,
}

impl Snapshot {
    fn edge_count(&self) -> usize {
        self.nodes.values().map(|n| n.forward.len()).sum()
    }
}

/// Stable, sorted serialization of the graph for reproducible output
/// (`to_map`/`from_map` in spec.md §4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphMap {
    pub nodes: Vec<GraphMapNode>,
    pub edges: Vec<GraphMapEdge>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphMapNode {
    pub id: String,
    pub unit_type: Option<UnitType>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphMapEdge {
    pub from: String,
    pub to: String,
    pub kind: RelationKind,
}

/// The dependency graph. Cheap to clone (an `Arc` to the current
/// snapshot); `register` swaps in a new snapshot atomically.
#[derive(Clone)]
pub struct DependencyGraph {
    inner: Arc<ArcSwap<Snapshot>>,
}

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ArcSwap::from_pointee(Snapshot::default())),
        }
    }

    fn snapshot(&self) -> Arc<Snapshot> {
        self.inner.load_full()
    }

    /// Idempotently (re-)register a unit's forward edges. Removes the
    /// unit from every prior `type_index` bucket before inserting it into
    /// the new one, so re-registering never leaves an id in more than one
    /// bucket (spec.md property 4).
    pub fn register(&self, id: &str, unit_type: UnitType, edges: Vec<DependencyEdge>) {
        let prev = self.snapshot();
        let mut nodes = prev.nodes.clone();
        let mut type_index = prev.type_index.clone();

        // Drop this id from whatever forward edges it previously had, so
        // stale reverse edges from a shrunk edge set don't linger.
        if let Some(old) = nodes.get(id) {
            for edge in &old.forward {
                if let Some(target) = nodes.get_mut(&edge.target_identifier) {
                    target.reverse.remove(id);
                }
            }
        }
        // Remove from every type bucket before inserting into the new one.
        for bucket in type_index.values_mut() {
            bucket.remove(id);
        }

        let mut entry = nodes.remove(id).unwrap_or_default();
        entry.unit_type = Some(unit_type);
        entry.forward = edges.clone();
        nodes.insert(id.to_string(), entry);

        for edge in &edges {
            let target = nodes.entry(edge.target_identifier.clone()).or_default();
            target.reverse.insert(id.to_string());
        }

        type_index
            .entry(unit_type)
            .or_default()
            .insert(id.to_string());

        self.inner.store(Arc::new(Snapshot { nodes, type_index }));
    }

    pub fn dependencies_of(&self, id: &str) -> Vec<DependencyEdge> {
        self.snapshot()
            .nodes
            .get(id)
            .map(|n| n.forward.clone())
            .unwrap_or_default()
    }

    pub fn dependents_of(&self, id: &str) -> Vec<String> {
        self.snapshot()
            .nodes
            .get(id)
            .map(|n| n.reverse.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn ids_of_type(&self, unit_type: UnitType) -> Vec<String> {
        self.snapshot()
            .type_index
            .get(&unit_type)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn node_count(&self) -> usize {
        self.snapshot().nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.snapshot().edge_count()
    }

    pub fn traverse_forward(&self, start: &str, max_depth: usize) -> Vec<String> {
        traverse::bfs(&self.snapshot(), start, max_depth, true)
    }

    pub fn traverse_reverse(&self, start: &str, max_depth: usize) -> Vec<String> {
        traverse::bfs(&self.snapshot(), start, max_depth, false)
    }

    pub fn shortest_path(&self, from: &str, to: &str) -> Option<Vec<String>> {
        traverse::shortest_path(&self.snapshot(), from, to)
    }

    /// Iterative reverse closure over `seeds`: every id transitively
    /// depended-upon-by-nothing-else... i.e. every id that transitively
    /// depends on a seed.
    pub fn affected_by(&self, seeds: &[String]) -> BTreeSet<String> {
        let snap = self.snapshot();
        let mut visited: BTreeSet<String> = seeds.iter().cloned().collect();
        let mut frontier: Vec<String> = seeds.to_vec();
        while let Some(id) = frontier.pop() {
            if let Some(node) = snap.nodes.get(&id) {
                for dependent in &node.reverse {
                    if visited.insert(dependent.clone()) {
                        frontier.push(dependent.clone());
                    }
                }
            }
        }
        visited
    }

    /// PageRank over the current snapshot: damping 0.85, 20 iterations,
    /// uniform initial distribution, teleport over all nodes.
    pub fn pagerank(&self) -> PageRankScores {
        pagerank::compute(&self.snapshot())
    }

    /// Structural analysis: orphans, dead-ends, hubs, cycles, bridges.
    pub fn analyze(&self, hub_limit: usize, bridge_sample_threshold: usize) -> StructuralReport {
        analysis::analyze(&self.snapshot(), hub_limit, bridge_sample_threshold)
    }

    /// Stable, sorted serialization for reproducible output.
    pub fn to_map(&self) -> GraphMap {
        let snap = self.snapshot();
        let nodes = snap
            .nodes
            .iter()
            .map(|(id, n)| GraphMapNode {
                id: id.clone(),
                unit_type: n.unit_type,
            })
            .collect();
        let mut edges = Vec::new();
        for (id, n) in &snap.nodes {
            for e in &n.forward {
                edges.push(GraphMapEdge {
                    from: id.clone(),
                    to: e.target_identifier.clone(),
                    kind: e.relation_kind,
                });
            }
        }
        edges.sort_by(|a, b| (a.from.as_str(), a.to.as_str()).cmp(&(b.from.as_str(), b.to.as_str())));
        GraphMap { nodes, edges }
    }

    /// Rebuild a graph from a previously serialized [`GraphMap`].
    pub fn from_map(map: GraphMap) -> Self {
        let graph = Self::new();
        let mut by_node: BTreeMap<String, Vec<DependencyEdge>> = BTreeMap::new();
        for edge in map.edges {
            by_node.entry(edge.from).or_default().push(DependencyEdge {
                target_identifier: edge.to,
                relation_kind: edge.kind,
            });
        }
        for node in map.nodes {
            let edges = by_node.remove(&node.id).unwrap_or_default();
            graph.register(&node.id, node.unit_type.unwrap_or(UnitType::Other), edges);
        }
        graph
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(target: &str) -> DependencyEdge {
        DependencyEdge {
            target_identifier: target.to_string(),
            relation_kind: RelationKind::Calls,
        }
    }

    #[test]
    fn register_builds_reverse_duality() {
        let g = DependencyGraph::new();
        g.register("A", UnitType::Service, vec![edge("B")]);
        assert_eq!(g.dependents_of("B"), vec!["A".to_string()]);
        assert_eq!(g.dependencies_of("A").len(), 1);
    }

    #[test]
    fn reregister_is_idempotent_in_type_index() {
        let g = DependencyGraph::new();
        g.register("A", UnitType::Service, vec![]);
        g.register("A", UnitType::Model, vec![]);
        assert!(!g.ids_of_type(UnitType::Service).contains(&"A".to_string()));
        assert_eq!(g.ids_of_type(UnitType::Model), vec!["A".to_string()]);
    }

    #[test]
    fn reregister_drops_stale_reverse_edges() {
        let g = DependencyGraph::new();
        g.register("A", UnitType::Service, vec![edge("B")]);
        g.register("A", UnitType::Service, vec![]);
        assert!(g.dependents_of("B").is_empty());
    }

    #[test]
    fn affected_by_is_transitive_reverse_closure() {
        let g = DependencyGraph::new();
        g.register("A", UnitType::Controller, vec![edge("B")]);
        g.register("B", UnitType::Service, vec![edge("C")]);
        g.register("C", UnitType::Model, vec![]);
        let affected = g.affected_by(&["C".to_string()]);
        assert!(affected.contains("A"));
        assert!(affected.contains("B"));
    }

    #[test]
    fn to_map_from_map_round_trips() {
        let g = DependencyGraph::new();
        g.register("A", UnitType::Controller, vec![edge("B")]);
        g.register("B", UnitType::Model, vec![]);
        let map = g.to_map();
        let g2 = DependencyGraph::from_map(map);
        assert_eq!(g2.dependencies_of("A").len(), 1);
        assert_eq!(g2.dependents_of("B"), vec!["A".to_string()]);
    }
}
