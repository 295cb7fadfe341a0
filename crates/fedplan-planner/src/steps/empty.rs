use fedplan_core::dag::{LockedSet, OpArena, OpKind};
use fedplan_core::error::Result;
use fedplan_core::id::NodeId;

use super::{PlannerStep, StepContext};

/// Propagates provably-empty results upward:
/// - JOIN / CARTESIAN with an EMPTY child → EMPTY,
/// - UNION drops EMPTY children, collapsing to the survivor or to EMPTY.
///
/// Skipped whenever the rewrite would drop a locked node.
#[derive(Debug, Clone, Copy, Default)]
pub struct PropagateEmpty;

fn drops_locked(arena: &OpArena, subtrees: &[NodeId], locked: &LockedSet) -> bool {
    subtrees
        .iter()
        .any(|s| arena.reachable(*s).iter().any(|n| locked.contains(*n)))
}

impl PlannerStep for PropagateEmpty {
    fn name(&self) -> &'static str {
        "propagate_empty"
    }

    fn apply(
        &self,
        arena: &mut OpArena,
        node: NodeId,
        locked: &LockedSet,
        _cx: &mut StepContext<'_>,
    ) -> Result<NodeId> {
        if locked.contains(node) {
            return Ok(node);
        }
        let n = arena.node(node);
        let children = n.children().to_vec();
        let (empty, alive): (Vec<NodeId>, Vec<NodeId>) = children
            .iter()
            .copied()
            .partition(|c| arena.node(*c).kind() == OpKind::Empty);
        if empty.is_empty() {
            return Ok(node);
        }
        match n.kind() {
            OpKind::Join | OpKind::Cartesian => {
                if drops_locked(arena, &children, locked) {
                    return Ok(node);
                }
                let schema = n.schema().clone();
                Ok(arena.add_empty(schema))
            }
            OpKind::Union => {
                if drops_locked(arena, &empty, locked) {
                    return Ok(node);
                }
                match alive.as_slice() {
                    [] => {
                        let schema = n.schema().clone();
                        Ok(arena.add_empty(schema))
                    }
                    [survivor] => Ok(*survivor),
                    _ => {
                        arena.set_children(node, alive)?;
                        Ok(node)
                    }
                }
            }
            _ => Ok(node),
        }
    }
}
