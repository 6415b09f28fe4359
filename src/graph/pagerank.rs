//! PageRank over the dependency graph: damping 0.85, 20 iterations,
//! uniform initial distribution and teleport over all nodes.

use super::Snapshot;
use std::collections::BTreeMap;

const DAMPING: f64 = 0.85;
const ITERATIONS: usize = 20;

/// `identifier -> score`, scores sum to ~1.0 over the node set.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct PageRankScores(pub BTreeMap<String, f64>);

impl PageRankScores {
    pub fn get(&self, id: &str) -> f64 {
        self.0.get(id).copied().unwrap_or(0.0)
    }

    /// Top `n` identifiers by score, descending, ties broken by identifier.
    pub fn top(&self, n: usize) -> Vec<(String, f64)> {
        let mut all: Vec<(String, f64)> = self.0.iter().map(|(k, v)| (k.clone(), *v)).collect();
        all.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap().then_with(|| a.0.cmp(&b.0)));
        all.truncate(n);
        all
    }
}

pub(super) fn compute(snap: &Snapshot) -> PageRankScores {
    let ids: Vec<String> = snap.nodes.keys().cloned().collect();
    let n = ids.len();
    if n == 0 {
        return PageRankScores::default();
    }
    let index: BTreeMap<&str, usize> = ids.iter().enumerate().map(|(i, id)| (id.as_str(), i)).collect();

    // out_targets[i] = indices this node points to (dedup'd for uniform
    // per-edge weight regardless of multi-edges to the same target).
    let mut out_targets: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (id, node) in &snap.nodes {
        let i = index[id.as_str()];
        let mut targets: Vec<usize> = node
            .forward
            .iter()
            .filter_map(|e| index.get(e.target_identifier.as_str()).copied())
            .collect();
        targets.sort_unstable();
        targets.dedup();
        out_targets[i] = targets;
    }
    let out_degree: Vec<usize> = out_targets.iter().map(|t| t.len()).collect();

    let mut scores = vec![1.0 / n as f64; n];
    let base = (1.0 - DAMPING) / n as f64;

    for _ in 0..ITERATIONS {
        let dangling_mass: f64 = (0..n)
            .filter(|&i| out_degree[i] == 0)
            .map(|i| scores[i])
            .sum();
        let dangling_share = DAMPING * dangling_mass / n as f64;

        let mut next = vec![base + dangling_share; n];
        for i in 0..n {
            if out_degree[i] == 0 {
                continue;
            }
            let share = DAMPING * scores[i] / out_degree[i] as f64;
            for &j in &out_targets[i] {
                next[j] += share;
            }
        }
        scores = next;
    }

    let map = ids.into_iter().zip(scores).collect();
    PageRankScores(map)
}

#[cfg(test)]
mod tests {
    use super::super::DependencyGraph;
    use crate::domain::types::{DependencyEdge, RelationKind, UnitType};

    fn edge(target: &str) -> DependencyEdge {
        DependencyEdge {
            target_identifier: target.to_string(),
            relation_kind: RelationKind::Calls,
        }
    }

    #[test]
    fn pagerank_scores_sum_to_roughly_one() {
        let g = DependencyGraph::new();
        g.register("A", UnitType::Service, vec![edge("B")]);
        g.register("B", UnitType::Service, vec![edge("C")]);
        g.register("C", UnitType::Service, vec![edge("A")]);
        let scores = g.pagerank();
        let sum: f64 = scores.0.values().sum();
        assert!((sum - 1.0).abs() < 0.01, "sum was {sum}");
    }

    #[test]
    fn heavily_referenced_node_ranks_higher() {
        let g = DependencyGraph::new();
        g.register("A", UnitType::Service, vec![edge("Hub")]);
        g.register("B", UnitType::Service, vec![edge("Hub")]);
        g.register("C", UnitType::Service, vec![edge("Hub")]);
        g.register("Hub", UnitType::Service, vec![]);
        let scores = g.pagerank();
        assert!(scores.get("Hub") > scores.get("A"));
    }
}
