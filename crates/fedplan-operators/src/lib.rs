#![forbid(unsafe_code)]
//! fedplan-operators: pull-based operators over solution streams.
//!
//! Design intent:
//! - Synchronous iterators; consumers cancel by dropping the stream.
//! - Only build sides are materialized; probe sides stream.
//! - A child error is emitted once and the operator ends (fail-fast).

pub mod cartesian;
pub mod join;
pub mod traits;
pub mod union;

pub use cartesian::CrossProduct;
pub use join::hash::{BuildSide, HashJoin};
pub use traits::{OpError, Operator, SolutionStream};
pub use union::Concat;
