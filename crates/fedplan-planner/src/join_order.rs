//! Greedy join ordering over a `JoinGraph`.
//!
//! Repeatedly merges the cheapest valid edge until one component remains. If
//! the graph disconnects, the remaining components are combined under a
//! single CARTESIAN node. This is a fallback, not an error.

use fedplan_core::dag::{keys, OpArena};
use fedplan_core::error::{Error, Result};
use fedplan_core::id::NodeId;

use crate::cost::CostEstimator;
use crate::join_graph::JoinGraph;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinOrder {
    pub root: NodeId,
    /// Number of JOIN nodes created.
    pub merges: usize,
    /// Whether the root is a cartesian fallback.
    pub cartesian: bool,
}

pub fn greedy_join_order(
    arena: &mut OpArena,
    nodes: &[NodeId],
    estimator: &dyn CostEstimator,
    warn_on_cartesian: bool,
) -> Result<JoinOrder> {
    if nodes.is_empty() {
        return Err(Error::Plan("nothing to join: no leaves".into()));
    }
    let mut graph = JoinGraph::build(arena, nodes, estimator);
    let mut merges = 0usize;

    while graph.len() > 1 {
        let Some((l, r, cost)) = graph.best_edge().map(|e| (e.left, e.right, e.cost)) else {
            break;
        };
        let joined = graph.merge_nodes(arena, l, r, estimator)?;
        merges += 1;
        tracing::debug!(left = %l, right = %r, joined = %joined, cost = cost.0, "merged join edge");
    }

    let remaining: Vec<NodeId> = graph.nodes().collect();
    if let [root] = remaining.as_slice() {
        return Ok(JoinOrder {
            root: *root,
            merges,
            cartesian: false,
        });
    }

    let reason = format!(
        "no shared type-compatible variables among {} components",
        remaining.len()
    );
    if warn_on_cartesian {
        tracing::warn!(components = remaining.len(), "cartesian product in plan: {reason}");
    } else {
        tracing::debug!(components = remaining.len(), "cartesian product in plan: {reason}");
    }
    let root = arena.add_cartesian(remaining)?;
    arena.annotate(root, keys::CARTESIAN, true);
    arena.annotate(root, keys::CARTESIAN_REASON, reason);
    Ok(JoinOrder {
        root,
        merges,
        cartesian: true,
    })
}
