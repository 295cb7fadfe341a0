//! Planner steps applied by the rewrite phases.
//!
//! A step looks at one node and returns either that node (possibly annotated)
//! or a replacement. Steps receive the locked set by shared reference: they
//! may consult it but cannot unlock anything. The phase driver rejects any
//! attempt to replace or rewire a locked node.

use fedplan_core::context::QueryContext;
use fedplan_core::dag::{LockedSet, OpArena};
use fedplan_core::endpoint::EndpointCatalog;
use fedplan_core::error::Result;
use fedplan_core::id::NodeId;

use crate::cost::CostEstimator;

pub mod cardinality;
pub mod empty;
pub mod flatten;
pub mod merge_endpoint;

pub use cardinality::AnnotateCardinality;
pub use empty::PropagateEmpty;
pub use flatten::FlattenUnions;
pub use merge_endpoint::MergeSameEndpoint;

/// Everything a step may read besides the tree itself.
pub struct StepContext<'a> {
    pub catalog: &'a EndpointCatalog,
    pub estimator: &'a dyn CostEstimator,
    pub query: &'a mut QueryContext,
}

pub trait PlannerStep: Send + Sync {
    fn name(&self) -> &'static str;

    fn apply(
        &self,
        arena: &mut OpArena,
        node: NodeId,
        locked: &LockedSet,
        cx: &mut StepContext<'_>,
    ) -> Result<NodeId>;
}

/// Default phase 1 (deep): annotation and structural normalization.
pub fn default_phase1() -> Vec<Box<dyn PlannerStep>> {
    vec![Box::new(AnnotateCardinality), Box::new(FlattenUnions)]
}

/// Default phase 2 (shallow): endpoint-aware leaf merging.
pub fn default_phase2() -> Vec<Box<dyn PlannerStep>> {
    vec![Box::new(MergeSameEndpoint)]
}

/// Default phase 3 (deep): cleanup, then refresh estimates for new nodes.
pub fn default_phase3() -> Vec<Box<dyn PlannerStep>> {
    vec![Box::new(PropagateEmpty), Box::new(AnnotateCardinality)]
}
