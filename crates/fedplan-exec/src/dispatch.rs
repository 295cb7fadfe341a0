//! Node-kind dispatch.
//!
//! The set of node kinds is closed, so dispatch is a fixed table indexed by
//! `OpKind` rather than a runtime registry. Each executor builds a lazy
//! stream for one node from the streams of its children.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use fedplan_core::config::FederationConfig;
use fedplan_core::context::QueryContext;
use fedplan_core::dag::{keys, OpKind, Plan};
use fedplan_core::id::NodeId;
use fedplan_core::schema::VarSchema;
use fedplan_core::term::Solution;
use fedplan_operators::{BuildSide, Concat, CrossProduct, HashJoin, OpError, SolutionStream};

use crate::leaf::{LeafOptions, LeafStream};
use crate::metrics::{emit_span, ExecMetrics};
use crate::registry::SourceRegistry;
use crate::runtime::ExecError;

pub type ExecutorFn = fn(&mut Executor<'_>, NodeId) -> Result<SolutionStream, ExecError>;

/// Context keys that override the engine config for one query.
pub const CTX_STRICT_PAGING: &str = "exec.strict_paging";
pub const CTX_MAX_PAGES: &str = "exec.max_pages";

// Indexed by `OpKind as usize`; order follows the enum declaration.
const DISPATCH: [(OpKind, ExecutorFn); 5] = [
    (OpKind::Query, execute_query),
    (OpKind::Join, execute_join),
    (OpKind::Cartesian, execute_cartesian),
    (OpKind::Union, execute_union),
    (OpKind::Empty, execute_empty),
];

pub fn executor_for(kind: OpKind) -> ExecutorFn {
    let (slot, f) = DISPATCH[kind as usize];
    debug_assert_eq!(slot, kind);
    f
}

/// Builds the stream of a plan, one node at a time.
pub struct Executor<'a> {
    plan: &'a Plan,
    registry: &'a SourceRegistry,
    leaf_options: LeafOptions,
    reuse_shared: bool,
    metrics: Arc<ExecMetrics>,
    ref_counts: BTreeMap<NodeId, usize>,
    shared: BTreeMap<NodeId, Arc<Mutex<SharedState>>>,
}

impl<'a> Executor<'a> {
    pub fn new(
        plan: &'a Plan,
        registry: &'a SourceRegistry,
        config: &FederationConfig,
        ctx: &QueryContext,
        metrics: Arc<ExecMetrics>,
    ) -> Self {
        let leaf_options = LeafOptions {
            strict_paging: ctx
                .get_bool(CTX_STRICT_PAGING)
                .unwrap_or(config.strict_paging),
            max_pages: ctx
                .get_u64(CTX_MAX_PAGES)
                .map(|n| n as usize)
                .or(config.max_pages_per_leaf),
        };
        Self {
            plan,
            registry,
            leaf_options,
            reuse_shared: config.reuse_shared_results,
            metrics,
            ref_counts: plan.arena.ref_counts(plan.root),
            shared: BTreeMap::new(),
        }
    }

    /// Stream for `node`. A node with several parents is evaluated once and
    /// replayed when result reuse is on.
    pub fn build(&mut self, node: NodeId) -> Result<SolutionStream, ExecError> {
        let parents = self.ref_counts.get(&node).copied().unwrap_or(0);
        if !self.reuse_shared || parents < 2 {
            return self.build_fresh(node);
        }
        let state = match self.shared.get(&node) {
            Some(state) => Arc::clone(state),
            None => {
                let inner = self.build_fresh(node)?;
                self.metrics.shared_node();
                let state = Arc::new(Mutex::new(SharedState {
                    inner: Some(inner),
                    seen: Vec::new(),
                }));
                self.shared.insert(node, Arc::clone(&state));
                state
            }
        };
        Ok(Box::new(Replay { state, cursor: 0 }))
    }

    fn build_fresh(&mut self, node: NodeId) -> Result<SolutionStream, ExecError> {
        let kind = self.plan.arena.try_node(node)?.kind();
        emit_span(
            "build",
            &[("node", node.to_string()), ("kind", kind.name().to_string())],
        );
        executor_for(kind)(self, node)
    }

    fn children(&mut self, node: NodeId) -> Result<Vec<SolutionStream>, ExecError> {
        let children = self.plan.arena.node(node).children().to_vec();
        children.into_iter().map(|c| self.build(c)).collect()
    }

    fn cardinality(&self, node: NodeId) -> Option<f64> {
        self.plan
            .arena
            .node(node)
            .annotations()
            .get_f64(keys::CARDINALITY)
    }

    fn schema(&self, node: NodeId) -> &VarSchema {
        self.plan.arena.node(node).schema()
    }
}

fn execute_query(ex: &mut Executor<'_>, node: NodeId) -> Result<SolutionStream, ExecError> {
    let Some((endpoint, fragment)) = ex.plan.arena.node(node).query() else {
        return Err(ExecError::Invalid(format!("{node} is not a QUERY node")));
    };
    let source = ex.registry.get(endpoint)?;
    tracing::debug!(%node, source = %source.name(), fragment = %fragment, "leaf start");
    Ok(Box::new(LeafStream::new(
        source,
        fragment.clone(),
        ex.leaf_options,
        Arc::clone(&ex.metrics),
    )))
}

/// Left-deep fold of binary hash joins. The side with the smaller cardinality
/// estimate is built; without estimates the right side is.
fn execute_join(ex: &mut Executor<'_>, node: NodeId) -> Result<SolutionStream, ExecError> {
    let children = ex.plan.arena.node(node).children().to_vec();
    let Some((&first, rest)) = children.split_first() else {
        return Err(ExecError::Invalid(format!("JOIN {node} has no children")));
    };
    let mut acc = ex.build(first)?;
    let mut acc_schema = ex.schema(first).clone();
    let mut acc_card = ex.cardinality(first);
    for &child in rest {
        let right = ex.build(child)?;
        let right_schema = ex.schema(child).clone();
        let right_card = ex.cardinality(child);
        let side = match (acc_card, right_card) {
            (Some(l), Some(r)) if l < r => BuildSide::Left,
            _ => BuildSide::Right,
        };
        let key_vars: Vec<String> = acc_schema.shared(&right_schema).into_iter().collect();
        acc = Box::new(HashJoin::new(acc, right, key_vars, side));
        acc_schema = acc_schema.join(&right_schema);
        acc_card = match (acc_card, right_card) {
            (Some(l), Some(r)) => Some(l.min(r)),
            _ => None,
        };
    }
    Ok(acc)
}

fn execute_cartesian(ex: &mut Executor<'_>, node: NodeId) -> Result<SolutionStream, ExecError> {
    let children = ex.children(node)?;
    Ok(Box::new(CrossProduct::new(children)))
}

fn execute_union(ex: &mut Executor<'_>, node: NodeId) -> Result<SolutionStream, ExecError> {
    let children = ex.children(node)?;
    Ok(Box::new(Concat::new(children)))
}

fn execute_empty(_ex: &mut Executor<'_>, _node: NodeId) -> Result<SolutionStream, ExecError> {
    Ok(Box::new(std::iter::empty()))
}

/// Results of a shared node, pulled on demand by whichever replay is ahead
/// and kept for the others.
struct SharedState {
    inner: Option<SolutionStream>,
    seen: Vec<Result<Solution, OpError>>,
}

struct Replay {
    state: Arc<Mutex<SharedState>>,
    cursor: usize,
}

fn lock(state: &Mutex<SharedState>) -> MutexGuard<'_, SharedState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Iterator for Replay {
    type Item = Result<Solution, OpError>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut state = lock(&self.state);
        if self.cursor == state.seen.len() {
            let pulled = state.inner.as_mut().and_then(|s| s.next());
            match pulled {
                Some(item) => state.seen.push(item),
                None => {
                    state.inner = None;
                    return None;
                }
            }
        }
        let item = state.seen[self.cursor].clone();
        self.cursor += 1;
        Some(item)
    }
}
