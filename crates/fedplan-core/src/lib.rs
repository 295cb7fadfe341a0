#![forbid(unsafe_code)]
//! fedplan-core: terms, query fragments, the operator DAG, configs, and
//! manifests shared by every other fedplan crate.
//!
//! Pure data and invariants only. Planning lives in `fedplan-planner`,
//! remote access in `fedplan-source`, and streaming in `fedplan-exec`.

pub mod config;
pub mod context;
pub mod dag;
pub mod endpoint;
pub mod error;
pub mod hash;
pub mod id;
pub mod manifest;
pub mod prelude;
pub mod query;
pub mod schema;
pub mod term;

pub use error::{Error, Result};

/// Engine version recorded in run manifests.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
