//! Structural analysis: orphans, dead ends, hubs, cycles (via Tarjan's
//! SCC), and bridges. Bridge-finding falls back to random-sample
//! approximation above `bridge_sample_threshold` edges, since the exact
//! algorithm is linear but the constant factor matters at extraction-tree
//! scale.

use super::Snapshot;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// A non-trivial strongly connected component: cyclic dependency among two
/// or more units (or a unit that depends on itself).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cycle {
    pub members: Vec<String>,
}

/// An edge whose removal increases the number of connected components,
/// i.e. a single point of structural failure between its endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bridge {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StructuralReport {
    /// Units with neither incoming nor outgoing edges.
    pub orphans: Vec<String>,
    /// Units with no incoming edges (no dependents) — roots and entry
    /// points. Orphans have no dependents either, so they're a subset.
    pub dead_ends: Vec<String>,
    /// Units whose combined in+out degree is within the top `hub_limit`.
    pub hubs: Vec<String>,
    pub cycles: Vec<Cycle>,
    pub bridges: Vec<Bridge>,
    /// Set when bridge detection used sampling rather than the exact
    /// algorithm, because `edge_count > bridge_sample_threshold`.
    pub bridges_sampled: bool,
}

pub(super) fn analyze(snap: &Snapshot, hub_limit: usize, bridge_sample_threshold: usize) -> StructuralReport {
    let mut orphans = Vec::new();
    let mut dead_ends = Vec::new();
    let mut degree: Vec<(String, usize)> = Vec::new();

    for (id, node) in &snap.nodes {
        let out_deg = node.forward.len();
        let in_deg = node.reverse.len();
        if out_deg == 0 && in_deg == 0 {
            orphans.push(id.clone());
        }
        if in_deg == 0 {
            dead_ends.push(id.clone());
        }
        degree.push((id.clone(), out_deg + in_deg));
    }

    degree.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    let hubs: Vec<String> = degree
        .into_iter()
        .take(hub_limit)
        .filter(|(_, d)| *d > 0)
        .map(|(id, _)| id)
        .collect();

    let cycles = find_cycles(snap);
    let edge_count = snap.edge_count();
    let (bridges, bridges_sampled) = if edge_count > bridge_sample_threshold {
        (sample_bridges(snap, bridge_sample_threshold), true)
    } else {
        (exact_bridges(snap), false)
    };

    StructuralReport {
        orphans,
        dead_ends,
        hubs,
        cycles,
        bridges,
        bridges_sampled,
    }
}

/// Tarjan's strongly connected components; components of size 1 are kept
/// only when the node has a self-loop.
fn find_cycles(snap: &Snapshot) -> Vec<Cycle> {
    struct Tarjan<'a> {
        snap: &'a Snapshot,
        index: HashMap<String, usize>,
        lowlink: HashMap<String, usize>,
        on_stack: HashSet<String>,
        stack: Vec<String>,
        counter: usize,
        sccs: Vec<Vec<String>>,
    }

    impl<'a> Tarjan<'a> {
        fn visit(&mut self, id: &str) {
            self.index.insert(id.to_string(), self.counter);
            self.lowlink.insert(id.to_string(), self.counter);
            self.counter += 1;
            self.stack.push(id.to_string());
            self.on_stack.insert(id.to_string());

            if let Some(node) = self.snap.nodes.get(id) {
                for edge in &node.forward {
                    let target = &edge.target_identifier;
                    if !self.index.contains_key(target) {
                        if self.snap.nodes.contains_key(target) {
                            self.visit(target);
                        } else {
                            continue;
                        }
                        let tl = self.lowlink[target];
                        let cur = self.lowlink[id];
                        self.lowlink.insert(id.to_string(), cur.min(tl));
                    } else if self.on_stack.contains(target) {
                        let ti = self.index[target];
                        let cur = self.lowlink[id];
                        self.lowlink.insert(id.to_string(), cur.min(ti));
                    }
                }
            }

            if self.lowlink[id] == self.index[id] {
                let mut component = Vec::new();
                loop {
                    let w = self.stack.pop().unwrap();
                    self.on_stack.remove(&w);
                    let is_w = w == id;
                    component.push(w);
                    if is_w {
                        break;
                    }
                }
                self.sccs.push(component);
            }
        }
    }

    let mut tarjan = Tarjan {
        snap,
        index: HashMap::new(),
        lowlink: HashMap::new(),
        on_stack: HashSet::new(),
        stack: Vec::new(),
        counter: 0,
        sccs: Vec::new(),
    };

    let ids: Vec<String> = snap.nodes.keys().cloned().collect();
    for id in &ids {
        if !tarjan.index.contains_key(id) {
            tarjan.visit(id);
        }
    }

    let mut cycles: Vec<Cycle> = Vec::new();
    for mut members in tarjan.sccs {
        let has_self_loop = members.len() == 1
            && snap
                .nodes
                .get(&members[0])
                .map(|n| n.forward.iter().any(|e| &e.target_identifier == &members[0]))
                .unwrap_or(false);
        if members.len() > 1 || has_self_loop {
            members.sort();
            cycles.push(Cycle { members });
        }
    }
    cycles.sort_by(|a, b| a.members.cmp(&b.members));
    cycles
}

/// Exact bridge-finding via DFS over the underlying undirected graph
/// (Tarjan's bridge algorithm), O(V+E).
fn exact_bridges(snap: &Snapshot) -> Vec<Bridge> {
    let adjacency = undirected_adjacency(snap);
    let mut disc: HashMap<String, usize> = HashMap::new();
    let mut low: HashMap<String, usize> = HashMap::new();
    let mut timer = 0usize;
    let mut bridges = Vec::new();

    struct Frame {
        id: String,
        parent: Option<String>,
        iter_idx: usize,
    }

    let ids: Vec<String> = snap.nodes.keys().cloned().collect();
    for start in &ids {
        if disc.contains_key(start) {
            continue;
        }
        let mut stack = vec![Frame {
            id: start.clone(),
            parent: None,
            iter_idx: 0,
        }];
        disc.insert(start.clone(), timer);
        low.insert(start.clone(), timer);
        timer += 1;

        while let Some(frame) = stack.last_mut() {
            let neighbors = adjacency.get(&frame.id).cloned().unwrap_or_default();
            if frame.iter_idx < neighbors.len() {
                let next = neighbors[frame.iter_idx].clone();
                frame.iter_idx += 1;
                if Some(&next) == frame.parent.as_ref() {
                    continue;
                }
                if let Some(&next_disc) = disc.get(&next) {
                    let cur_low = low[&frame.id];
                    low.insert(frame.id.clone(), cur_low.min(next_disc));
                } else {
                    disc.insert(next.clone(), timer);
                    low.insert(next.clone(), timer);
                    timer += 1;
                    let parent = frame.id.clone();
                    stack.push(Frame {
                        id: next,
                        parent: Some(parent),
                        iter_idx: 0,
                    });
                }
            } else {
                let finished = stack.pop().unwrap();
                if let Some(parent) = finished.parent {
                    let child_low = low[&finished.id];
                    let parent_low = low[&parent];
                    low.insert(parent.clone(), parent_low.min(child_low));
                    if child_low > disc[&parent] {
                        let (from, to) = if parent < finished.id {
                            (parent.clone(), finished.id.clone())
                        } else {
                            (finished.id.clone(), parent.clone())
                        };
                        bridges.push(Bridge { from, to });
                    }
                }
            }
        }
    }
    bridges.sort_by(|a, b| (a.from.as_str(), a.to.as_str()).cmp(&(b.from.as_str(), b.to.as_str())));
    bridges.dedup_by(|a, b| a.from == b.from && a.to == b.to);
    bridges
}

/// Approximate bridge detection for large graphs: sample up to `limit`
/// undirected edges and test each in isolation for criticality (does
/// removing it disconnect its endpoints in the rest of the graph).
fn sample_bridges(snap: &Snapshot, limit: usize) -> Vec<Bridge> {
    let adjacency = undirected_adjacency(snap);
    let mut all_edges: Vec<(String, String)> = Vec::new();
    for (id, neighbors) in &adjacency {
        for n in neighbors {
            if id < n {
                all_edges.push((id.clone(), n.clone()));
            }
        }
    }
    all_edges.sort();
    let sample_size = limit.min(all_edges.len());
    let mut rng = rand::rng();
    all_edges.shuffle(&mut rng);
    all_edges.truncate(sample_size);

    let mut bridges = Vec::new();
    for (from, to) in all_edges {
        if !connected_without_edge(&adjacency, &from, &to) {
            bridges.push(Bridge { from, to });
        }
    }
    bridges.sort_by(|a, b| (a.from.as_str(), a.to.as_str()).cmp(&(b.from.as_str(), b.to.as_str())));
    bridges
}

fn connected_without_edge(adjacency: &BTreeMap<String, BTreeSet<String>>, from: &str, to: &str) -> bool {
    let mut visited: HashSet<&str> = HashSet::new();
    let mut stack = vec![from];
    visited.insert(from);
    while let Some(id) = stack.pop() {
        if id == to {
            return true;
        }
        if let Some(neighbors) = adjacency.get(id) {
            for n in neighbors {
                if id == from && n == to {
                    continue;
                }
                if from == n.as_str() && id == to {
                    continue;
                }
                if visited.insert(n.as_str()) {
                    stack.push(n.as_str());
                }
            }
        }
    }
    false
}

fn undirected_adjacency(snap: &Snapshot) -> BTreeMap<String, BTreeSet<String>> {
    let mut adjacency: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for (id, node) in &snap.nodes {
        adjacency.entry(id.clone()).or_default();
        for edge in &node.forward {
            if &edge.target_identifier == id {
                continue;
            }
            adjacency.entry(id.clone()).or_default().insert(edge.target_identifier.clone());
            adjacency
                .entry(edge.target_identifier.clone())
                .or_default()
                .insert(id.clone());
        }
    }
    adjacency
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
    fn detects_orphans_and_dead_ends() {
        let g = DependencyGraph::new();
        g.register("Orphan", UnitType::Model, vec![]);
        g.register("Root", UnitType::Controller, vec![edge("Leaf")]);
        g.register("Leaf", UnitType::Model, vec![]);
        let report = g.analyze(10, 10_000);
        assert_eq!(report.orphans, vec!["Orphan".to_string()]);
        assert_eq!(report.dead_ends, vec!["Orphan".to_string(), "Root".to_string()]);
    }

    #[test]
    fn detects_cycle() {
        let g = DependencyGraph::new();
        g.register("A", UnitType::Service, vec![edge("B")]);
        g.register("B", UnitType::Service, vec![edge("A")]);
        let report = g.analyze(10, 10_000);
        assert_eq!(report.cycles.len(), 1);
        assert_eq!(report.cycles[0].members, vec!["A".to_string(), "B".to_string()]);
    }

    #[test]
    fn detects_bridge_between_two_components() {
        let g = DependencyGraph::new();
        g.register("A", UnitType::Service, vec![edge("B")]);
        g.register("B", UnitType::Service, vec![edge("C")]);
        g.register("C", UnitType::Service, vec![]);
        let report = g.analyze(10, 10_000);
        assert_eq!(report.bridges.len(), 2);
        assert!(!report.bridges_sampled);
    }

    #[test]
    fn no_bridge_in_a_cycle() {
        let g = DependencyGraph::new();
        g.register("A", UnitType::Service, vec![edge("B")]);
        g.register("B", UnitType::Service, vec![edge("C")]);
        g.register("C", UnitType::Service, vec![edge("A")]);
        let report = g.analyze(10, 10_000);
        assert!(report.bridges.is_empty());
    }
}
