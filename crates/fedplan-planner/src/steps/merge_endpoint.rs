use fedplan_core::dag::{keys, LockedSet, OpArena, OpKind};
use fedplan_core::error::Result;
use fedplan_core::id::NodeId;

use super::{PlannerStep, StepContext};

/// Pushes a binary JOIN of two leaves on the same endpoint down to that
/// endpoint as one combined QUERY, when the endpoint evaluates joins and its
/// dialect accepts the combined fragment.
#[derive(Debug, Clone, Copy, Default)]
pub struct MergeSameEndpoint;

impl PlannerStep for MergeSameEndpoint {
    fn name(&self) -> &'static str {
        "merge_same_endpoint"
    }

    fn apply(
        &self,
        arena: &mut OpArena,
        node: NodeId,
        locked: &LockedSet,
        cx: &mut StepContext<'_>,
    ) -> Result<NodeId> {
        let n = arena.node(node);
        if n.kind() != OpKind::Join || locked.contains(node) {
            return Ok(node);
        }
        let [l, r] = n.children() else {
            return Ok(node);
        };
        let (l, r) = (*l, *r);
        if locked.contains(l) || locked.contains(r) {
            return Ok(node);
        }
        let (Some((le, lf)), Some((re, rf))) = (arena.node(l).query(), arena.node(r).query()) else {
            return Ok(node);
        };
        if le != re {
            return Ok(node);
        }
        let Some(descriptor) = cx.catalog.get(le) else {
            return Ok(node);
        };
        if !descriptor.capabilities.joins {
            return Ok(node);
        }
        let combined = lf.concat(rf);
        if !combined.is_satisfiable()
            || descriptor
                .capabilities
                .check(&descriptor.name, &combined)
                .is_err()
        {
            return Ok(node);
        }

        let label = match (arena.node(l).label(), arena.node(r).label()) {
            (Some(a), Some(b)) => Some(format!("{a}+{b}")),
            _ => None,
        };
        let endpoint_name = descriptor.name.clone();
        let merged = arena.add_query(le, combined)?;
        arena.annotate(merged, keys::ENDPOINT, endpoint_name);
        arena.annotate(merged, keys::MERGED_FROM, vec![l.get(), r.get()]);
        if let Some(label) = label {
            arena.annotate(merged, keys::LABEL, label);
        }
        cx.query.incr("planner.endpoint_merges", 1);
        tracing::debug!(left = %l, right = %r, merged = %merged, "merged same-endpoint join");
        Ok(merged)
    }
}
