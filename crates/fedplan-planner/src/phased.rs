//! Rewrite phase driver.
//!
//! Deep passes visit every node bottom-up; shallow passes visit pre-order and
//! do not descend into a subtree a step just produced. Each pass starts by
//! unsharing the tree (copy-on-write), so a step specializing a node never
//! affects another parent. Copies of locked nodes are locked as well.
//!
//! Locked-node guards enforced around every step application:
//! - a step may annotate a locked node, never replace or rewire it (its
//!   children are still rewritten by the pass),
//! - every locked node reachable before a pass is reachable after it.

use fedplan_core::dag::{LockedSet, OpArena};
use fedplan_core::error::{Error, Result};
use fedplan_core::id::NodeId;

use crate::steps::{PlannerStep, StepContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassKind {
    Deep,
    Shallow,
}

/// Run `steps` one after another over the tree at `root`.
pub fn run_phase(
    arena: &mut OpArena,
    root: NodeId,
    kind: PassKind,
    steps: &[Box<dyn PlannerStep>],
    locked: &mut LockedSet,
    cx: &mut StepContext<'_>,
) -> Result<NodeId> {
    let mut root = root;
    for step in steps {
        root = run_pass(arena, root, kind, step.as_ref(), locked, cx)?;
    }
    Ok(root)
}

pub fn run_pass(
    arena: &mut OpArena,
    root: NodeId,
    kind: PassKind,
    step: &dyn PlannerStep,
    locked: &mut LockedSet,
    cx: &mut StepContext<'_>,
) -> Result<NodeId> {
    arena.check_acyclic(root)?;
    for (original, copy) in arena.unshare(root) {
        if locked.contains(original) {
            locked.lock(copy);
        }
    }
    let before: Vec<NodeId> = arena
        .postorder(root)
        .into_iter()
        .filter(|n| locked.contains(*n))
        .collect();

    let locked: &LockedSet = locked;
    let new_root = match kind {
        PassKind::Deep => deep(arena, root, step, locked, cx)?,
        PassKind::Shallow => shallow(arena, root, step, locked, cx)?,
    };

    let after = arena.reachable(new_root);
    if let Some(lost) = before.iter().find(|n| !after.contains(*n)) {
        return Err(Error::Invariant(format!(
            "step '{}' made locked node {lost} unreachable",
            step.name()
        )));
    }
    tracing::debug!(step = step.name(), ?kind, root = %new_root, "planner pass done");
    Ok(new_root)
}

fn apply_guarded(
    arena: &mut OpArena,
    node: NodeId,
    step: &dyn PlannerStep,
    locked: &LockedSet,
    cx: &mut StepContext<'_>,
) -> Result<NodeId> {
    let children = arena.node(node).children().to_vec();
    let out = step.apply(arena, node, locked, cx)?;
    if locked.contains(node) && (out != node || arena.node(node).children() != children) {
        return Err(Error::Invariant(format!(
            "step '{}' tried to replace locked node {node}",
            step.name()
        )));
    }
    arena.try_node(out)?;
    Ok(out)
}

fn rewire(arena: &mut OpArena, node: NodeId, children: Vec<NodeId>) -> Result<()> {
    if arena.node(node).children() != children.as_slice() {
        arena.set_children(node, children)?;
    }
    Ok(())
}

fn deep(
    arena: &mut OpArena,
    node: NodeId,
    step: &dyn PlannerStep,
    locked: &LockedSet,
    cx: &mut StepContext<'_>,
) -> Result<NodeId> {
    let children = arena.node(node).children().to_vec();
    let mut rewritten = Vec::with_capacity(children.len());
    for child in children {
        rewritten.push(deep(arena, child, step, locked, cx)?);
    }
    rewire(arena, node, rewritten)?;
    apply_guarded(arena, node, step, locked, cx)
}

fn shallow(
    arena: &mut OpArena,
    node: NodeId,
    step: &dyn PlannerStep,
    locked: &LockedSet,
    cx: &mut StepContext<'_>,
) -> Result<NodeId> {
    let out = apply_guarded(arena, node, step, locked, cx)?;
    if out != node {
        return Ok(out);
    }
    let children = arena.node(node).children().to_vec();
    let mut rewritten = Vec::with_capacity(children.len());
    for child in children {
        rewritten.push(shallow(arena, child, step, locked, cx)?);
    }
    rewire(arena, node, rewritten)?;
    Ok(node)
}
