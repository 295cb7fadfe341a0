//! Convenient re-exports for downstream crates.

pub use crate::config::FederationConfig;
pub use crate::context::QueryContext;
pub use crate::dag::{Annotations, LockedSet, Op, OpArena, OpKind, OpNode, Plan};
pub use crate::endpoint::{Capabilities, EndpointCatalog, EndpointDescriptor, LeafBinding};
pub use crate::error::{Error, Result};
pub use crate::id::{EndpointId, NodeId};
pub use crate::manifest::{ManifestId, RunManifest};
pub use crate::query::{CQuery, PatternTerm, TriplePattern};
pub use crate::schema::{TermType, VarSchema};
pub use crate::term::{Solution, Term};
