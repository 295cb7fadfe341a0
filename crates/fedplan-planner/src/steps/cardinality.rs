use fedplan_core::dag::{keys, LockedSet, OpArena};
use fedplan_core::error::Result;
use fedplan_core::id::NodeId;

use super::{PlannerStep, StepContext};

/// Records the estimator's cardinality on every node that lacks one. Only
/// annotates, so it also runs on locked nodes.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnnotateCardinality;

impl PlannerStep for AnnotateCardinality {
    fn name(&self) -> &'static str {
        "annotate_cardinality"
    }

    fn apply(
        &self,
        arena: &mut OpArena,
        node: NodeId,
        _locked: &LockedSet,
        cx: &mut StepContext<'_>,
    ) -> Result<NodeId> {
        if !arena.node(node).annotations().contains(keys::CARDINALITY) {
            let card = cx.estimator.cardinality(arena, node);
            if card.is_finite() {
                arena.annotate(node, keys::CARDINALITY, card);
            }
        }
        Ok(node)
    }
}
