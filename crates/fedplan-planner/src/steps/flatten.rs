use fedplan_core::dag::{LockedSet, OpArena, OpKind};
use fedplan_core::error::Result;
use fedplan_core::id::NodeId;

use super::{PlannerStep, StepContext};

/// Splices nested UNION (and nested CARTESIAN) children into their parent:
/// `UNION(a, UNION(b, c))` → `UNION(a, b, c)`. Locked nodes on either level
/// are left alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlattenUnions;

impl PlannerStep for FlattenUnions {
    fn name(&self) -> &'static str {
        "flatten_unions"
    }

    fn apply(
        &self,
        arena: &mut OpArena,
        node: NodeId,
        locked: &LockedSet,
        _cx: &mut StepContext<'_>,
    ) -> Result<NodeId> {
        let kind = arena.node(node).kind();
        if !matches!(kind, OpKind::Union | OpKind::Cartesian) || locked.contains(node) {
            return Ok(node);
        }
        let mut changed = false;
        let mut children = Vec::new();
        for c in arena.node(node).children() {
            let child = arena.node(*c);
            if child.kind() == kind && !locked.contains(*c) {
                children.extend_from_slice(child.children());
                changed = true;
            } else {
                children.push(*c);
            }
        }
        if changed {
            arena.set_children(node, children)?;
        }
        Ok(node)
    }
}
