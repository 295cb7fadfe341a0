//! Weighted joinability graph over plan nodes.
//!
//! Vertices are node handles; an edge exists exactly for pairs that share at
//! least one variable and whose shared variables are type-compatible. Edges
//! are keyed by the normalized pair `(min, max)`, which makes the graph
//! symmetric and irreflexive by construction and gives `best_edge` a stable
//! tie-break.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use fedplan_core::dag::OpArena;
use fedplan_core::error::Result;
use fedplan_core::id::NodeId;
use serde::Serialize;

use crate::cost::{Cost, CostEstimator};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Validity {
    Valid,
    NoSharedVariables,
    Incompatible { var: String },
    SameNode,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JoinInfo {
    /// Always `left <= right`.
    pub left: NodeId,
    pub right: NodeId,
    pub shared: BTreeSet<String>,
    pub validity: Validity,
    pub cost: Cost,
}

impl JoinInfo {
    pub fn is_valid(&self) -> bool {
        self.validity == Validity::Valid
    }

    pub fn other(&self, n: NodeId) -> NodeId {
        if self.left == n {
            self.right
        } else {
            self.left
        }
    }
}

/// Classify the pair `(l, r)`. Invalid pairs carry an infinite cost.
pub fn joinability(
    arena: &OpArena,
    l: NodeId,
    r: NodeId,
    estimator: &dyn CostEstimator,
) -> JoinInfo {
    let (left, right) = if l <= r { (l, r) } else { (r, l) };
    let invalid = |shared: BTreeSet<String>, validity| JoinInfo {
        left,
        right,
        shared,
        validity,
        cost: Cost(f64::INFINITY),
    };
    if left == right {
        return invalid(BTreeSet::new(), Validity::SameNode);
    }
    let (ls, rs) = (arena.node(left).schema(), arena.node(right).schema());
    let shared = ls.shared(rs);
    if shared.is_empty() {
        return invalid(shared, Validity::NoSharedVariables);
    }
    if let Some(var) = ls.first_incompatible(rs) {
        return invalid(shared, Validity::Incompatible { var });
    }
    let cost = estimator.join_cost(arena, left, right, &shared);
    JoinInfo {
        left,
        right,
        shared,
        validity: Validity::Valid,
        cost,
    }
}

#[derive(Debug, Clone, Default)]
pub struct JoinGraph {
    nodes: BTreeSet<NodeId>,
    edges: BTreeMap<(NodeId, NodeId), JoinInfo>,
}

fn key(l: NodeId, r: NodeId) -> (NodeId, NodeId) {
    if l <= r {
        (l, r)
    } else {
        (r, l)
    }
}

impl JoinGraph {
    pub fn build(arena: &OpArena, nodes: &[NodeId], estimator: &dyn CostEstimator) -> Self {
        let mut graph = JoinGraph::default();
        for n in nodes {
            graph.add_node(arena, *n, estimator);
        }
        graph
    }

    /// Insert `n` and compute its edges against every present node.
    pub fn add_node(&mut self, arena: &OpArena, n: NodeId, estimator: &dyn CostEstimator) {
        if !self.nodes.insert(n) {
            return;
        }
        for other in self.nodes.iter().copied().filter(|o| *o != n) {
            let info = joinability(arena, n, other, estimator);
            if info.is_valid() {
                self.edges.insert(key(n, other), info);
            }
        }
    }

    pub fn remove_node(&mut self, n: NodeId) {
        if self.nodes.remove(&n) {
            self.edges.retain(|(l, r), _| *l != n && *r != n);
        }
    }

    pub fn contains(&self, n: NodeId) -> bool {
        self.nodes.contains(&n)
    }

    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn edges(&self) -> impl Iterator<Item = &JoinInfo> {
        self.edges.values()
    }

    /// Symmetric lookup.
    pub fn edge(&self, l: NodeId, r: NodeId) -> Option<&JoinInfo> {
        self.edges.get(&key(l, r))
    }

    pub fn neighbors(&self, n: NodeId) -> Vec<(NodeId, &JoinInfo)> {
        self.edges
            .values()
            .filter(|e| e.left == n || e.right == n)
            .map(|e| (e.other(n), e))
            .collect()
    }

    /// Cheapest edge; on equal cost the lowest `(left, right)` pair wins.
    pub fn best_edge(&self) -> Option<&JoinInfo> {
        // `min_by` keeps the first of equal elements, and edges iterate in key order.
        self.edges.values().min_by(|a, b| a.cost.cmp(&b.cost))
    }

    /// Replace `l` and `r` by a new JOIN node over both and recompute its edges.
    pub fn merge_nodes(
        &mut self,
        arena: &mut OpArena,
        l: NodeId,
        r: NodeId,
        estimator: &dyn CostEstimator,
    ) -> Result<NodeId> {
        let children = merge_order(arena, l, r);
        let joined = arena.add_join(children)?;
        self.remove_node(l);
        self.remove_node(r);
        self.add_node(arena, joined, estimator);
        Ok(joined)
    }
}

/// The side spanning more leaves goes first (left-deep); ties → lower handle.
fn merge_order(arena: &OpArena, l: NodeId, r: NodeId) -> Vec<NodeId> {
    let (ll, rl) = (arena.leaves(l).len(), arena.leaves(r).len());
    match rl.cmp(&ll).then(l.cmp(&r)) {
        Ordering::Greater => vec![r, l],
        _ => vec![l, r],
    }
}
