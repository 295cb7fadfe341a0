//! Equivalence cleaning: collapse structurally-equal subtrees into one shared
//! node. Only structure is shared here; whether a shared node's results are
//! computed once is decided at execution time.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use fedplan_core::dag::{LockedSet, OpArena};
use fedplan_core::error::Result;
use fedplan_core::id::NodeId;

/// Total order over nodes; `Equal` must coincide with structural equality.
pub trait OpComparator: Send + Sync {
    fn compare(&self, arena: &OpArena, a: NodeId, b: NodeId) -> Ordering;
}

/// Kind and payload, then output schema, then children pairwise. Annotations
/// are ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuralComparator;

impl OpComparator for StructuralComparator {
    fn compare(&self, arena: &OpArena, a: NodeId, b: NodeId) -> Ordering {
        if a == b {
            return Ordering::Equal;
        }
        let (na, nb) = (arena.node(a), arena.node(b));
        na.op()
            .cmp(nb.op())
            .then_with(|| na.schema().cmp(nb.schema()))
            .then_with(|| na.children().len().cmp(&nb.children().len()))
            .then_with(|| {
                na.children()
                    .iter()
                    .zip(nb.children())
                    .map(|(ca, cb)| self.compare(arena, *ca, *cb))
                    .find(|o| o.is_ne())
                    .unwrap_or(Ordering::Equal)
            })
    }
}

pub trait EquivCleaner: Send + Sync {
    fn name(&self) -> &'static str;

    /// Returns the (possibly new) root.
    fn clean(
        &self,
        arena: &mut OpArena,
        root: NodeId,
        comparator: &dyn OpComparator,
        locked: &LockedSet,
    ) -> Result<NodeId>;
}

/// Groups all reachable nodes into equivalence classes and points every edge at
/// the class representative (lowest unpinned handle). A node is pinned when it
/// or anything below it is locked; pinned nodes are never merged and never
/// become a merge target, so a locked node keeps exactly its own parents.
/// Idempotent.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultEquivCleaner;

impl EquivCleaner for DefaultEquivCleaner {
    fn name(&self) -> &'static str {
        "default"
    }

    fn clean(
        &self,
        arena: &mut OpArena,
        root: NodeId,
        comparator: &dyn OpComparator,
        locked: &LockedSet,
    ) -> Result<NodeId> {
        let order = arena.postorder(root);
        let mut pinned: BTreeSet<NodeId> = BTreeSet::new();
        for &id in &order {
            let below = arena.node(id).children().iter().any(|c| pinned.contains(c));
            if below || locked.contains(id) {
                pinned.insert(id);
            }
        }

        let mut nodes = order;
        nodes.sort_by(|a, b| comparator.compare(arena, *a, *b).then(a.cmp(b)));

        let mut rep: BTreeMap<NodeId, NodeId> = BTreeMap::new();
        let mut class_rep: Option<NodeId> = None;
        let mut merged = 0usize;
        for (i, id) in nodes.iter().copied().enumerate() {
            if i == 0 || comparator.compare(arena, nodes[i - 1], id) != Ordering::Equal {
                class_rep = None;
            }
            let target = if pinned.contains(&id) {
                id
            } else {
                *class_rep.get_or_insert(id)
            };
            if target != id {
                merged += 1;
            }
            rep.insert(id, target);
        }

        for id in arena.postorder(root) {
            let children = arena.node(id).children();
            let rewritten: Vec<NodeId> = children.iter().map(|c| rep[c]).collect();
            if rewritten != children {
                arena.set_children(id, rewritten)?;
            }
        }
        let new_root = rep.get(&root).copied().unwrap_or(root);
        tracing::debug!(merged, root = %new_root, "equivalence cleaning done");
        Ok(new_root)
    }
}

/// Leaves the plan untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEquivCleaner;

impl EquivCleaner for NoEquivCleaner {
    fn name(&self) -> &'static str {
        "none"
    }

    fn clean(
        &self,
        _arena: &mut OpArena,
        root: NodeId,
        _comparator: &dyn OpComparator,
        _locked: &LockedSet,
    ) -> Result<NodeId> {
        Ok(root)
    }
}
