//! Cost estimation for join ordering.
//!
//! Only monotonicity matters to the join graph: a lower cost marks a more
//! preferred edge. The heuristic estimator below mirrors the coarse row-count
//! models used elsewhere in the planner; plug in a source-aware estimator when
//! real statistics are available.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use fedplan_core::dag::{keys, Op, OpArena};
use fedplan_core::id::{EndpointId, NodeId};
use fedplan_core::query::{CQuery, TriplePattern};
use serde::{Deserialize, Serialize};

/// Edge cost. Totally ordered (`f64::total_cmp`) so edge selection is
/// deterministic even for NaN.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Cost(pub f64);

impl PartialEq for Cost {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Cost {}

impl PartialOrd for Cost {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Cost {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

pub trait CostEstimator: Send + Sync {
    fn name(&self) -> &'static str;

    /// Estimated number of solutions produced by `node`.
    fn cardinality(&self, arena: &OpArena, node: NodeId) -> f64;

    /// Cost of joining `left` and `right` on `shared` variables.
    fn join_cost(
        &self,
        arena: &OpArena,
        left: NodeId,
        right: NodeId,
        shared: &BTreeSet<String>,
    ) -> Cost;
}

/// Optional per-endpoint row counts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CardinalityHints {
    pub endpoint_rows: BTreeMap<EndpointId, f64>,
}

impl CardinalityHints {
    pub fn with(mut self, endpoint: EndpointId, rows: f64) -> Self {
        self.endpoint_rows.insert(endpoint, rows);
        self
    }
}

/// Selectivity of one pattern based on its constant positions.
fn pattern_selectivity(tp: &TriplePattern) -> f64 {
    let mut sel = 1.0;
    if tp.s.is_const() {
        // Subject lookups are close to key lookups.
        sel *= 0.01;
    }
    if tp.p.is_const() {
        sel *= 0.5;
    }
    if tp.o.is_const() {
        sel *= 0.1;
    }
    sel
}

fn fragment_cardinality(base: f64, fragment: &CQuery) -> f64 {
    let sel: f64 = fragment.patterns().iter().map(pattern_selectivity).product();
    (base * sel).max(1.0)
}

/// Join output estimate: sqrt(L * R) capped at min(L, R), shrunk further by
/// each additional shared variable. No shared variables → cross product.
pub fn estimate_join_cardinality(left: f64, right: f64, shared: usize) -> f64 {
    if shared == 0 {
        return left * right;
    }
    let out = (left * right).sqrt().min(left.min(right));
    out / shared as f64
}

#[derive(Debug, Clone)]
pub struct HeuristicCostEstimator {
    pub hints: CardinalityHints,
    pub default_rows: f64,
}

impl Default for HeuristicCostEstimator {
    fn default() -> Self {
        Self {
            hints: CardinalityHints::default(),
            default_rows: 1000.0,
        }
    }
}

impl HeuristicCostEstimator {
    pub fn new(default_rows: f64) -> Self {
        Self {
            hints: CardinalityHints::default(),
            default_rows,
        }
    }

    pub fn with_hints(mut self, hints: CardinalityHints) -> Self {
        self.hints = hints;
        self
    }
}

impl CostEstimator for HeuristicCostEstimator {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    fn cardinality(&self, arena: &OpArena, node: NodeId) -> f64 {
        let n = arena.node(node);
        if let Some(card) = n.annotations().get_f64(keys::CARDINALITY) {
            return card;
        }
        match n.op() {
            Op::Query { endpoint, fragment } => {
                let base = self
                    .hints
                    .endpoint_rows
                    .get(endpoint)
                    .copied()
                    .unwrap_or(self.default_rows);
                fragment_cardinality(base, fragment)
            }
            Op::Empty => 0.0,
            Op::Union => n
                .children()
                .iter()
                .map(|c| self.cardinality(arena, *c))
                .sum(),
            Op::Cartesian => n
                .children()
                .iter()
                .map(|c| self.cardinality(arena, *c))
                .product(),
            Op::Join => {
                let mut children = n.children().iter();
                let Some(first) = children.next() else {
                    return 0.0;
                };
                let mut schema = arena.node(*first).schema().clone();
                let mut rows = self.cardinality(arena, *first);
                for c in children {
                    let child = arena.node(*c);
                    let shared = schema.shared(child.schema()).len();
                    rows = estimate_join_cardinality(rows, self.cardinality(arena, *c), shared);
                    schema = schema.join(child.schema());
                }
                rows
            }
        }
    }

    fn join_cost(
        &self,
        arena: &OpArena,
        left: NodeId,
        right: NodeId,
        shared: &BTreeSet<String>,
    ) -> Cost {
        let l = self.cardinality(arena, left);
        let r = self.cardinality(arena, right);
        Cost(estimate_join_cardinality(l, r, shared.len()) + l + r)
    }
}

/// Every valid edge costs the same; ordering falls back to handle order.
#[derive(Debug, Clone, Copy, Default)]
pub struct UniformCostEstimator;

impl CostEstimator for UniformCostEstimator {
    fn name(&self) -> &'static str {
        "uniform"
    }

    fn cardinality(&self, arena: &OpArena, node: NodeId) -> f64 {
        arena
            .node(node)
            .annotations()
            .get_f64(keys::CARDINALITY)
            .unwrap_or(1.0)
    }

    fn join_cost(
        &self,
        _arena: &OpArena,
        _left: NodeId,
        _right: NodeId,
        _shared: &BTreeSet<String>,
    ) -> Cost {
        Cost(1.0)
    }
}
