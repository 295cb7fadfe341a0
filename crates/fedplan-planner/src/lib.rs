#![forbid(unsafe_code)]
//! fedplan-planner: resolved leaf bindings → federated operator DAG.
//!
//! Pipeline:
//! - `prepare`: bindings → candidate units (leaves, source-alternative unions)
//! - `join_order`: greedy ordering over the `join_graph`, cartesian fallback
//! - `phased`: deep/shallow rewrite passes running `steps`, guarded by the
//!   locked set
//! - `clean`: equivalence cleaning (structural sharing)
//!
//! Planning is single-threaded and deterministic: identical input gives an
//! identical plan.

pub mod clean;
pub mod cost;
pub mod dsl;
pub mod join_graph;
pub mod join_order;
pub mod phased;
pub mod planner;
pub mod prepare;
pub mod steps;

pub use clean::{DefaultEquivCleaner, EquivCleaner, NoEquivCleaner, OpComparator, StructuralComparator};
pub use cost::{CardinalityHints, Cost, CostEstimator, HeuristicCostEstimator, UniformCostEstimator};
pub use dsl::yaml::{parse_federation, FederationDoc, FederationSettings, ResolvedFederation};
pub use join_graph::{joinability, JoinGraph, JoinInfo, Validity};
pub use join_order::{greedy_join_order, JoinOrder};
pub use planner::{Planner, PlannerBuilder};
pub use steps::{PlannerStep, StepContext};
