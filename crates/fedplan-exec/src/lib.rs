#![forbid(unsafe_code)]
//! fedplan-exec: turns a planned operator DAG into a lazy solution stream.
//!
//! - `dispatch`: fixed node-kind → executor table, shared-result replay
//! - `leaf`: pager + rate limit gate + source driving for QUERY leaves
//! - `runtime`: `Engine` (execute / run with a `RunManifest`)

pub mod dispatch;
pub mod leaf;
pub mod metrics;
pub mod registry;
pub mod runtime;

pub use leaf::{LeafOptions, LeafStream};
pub use metrics::{ExecMetrics, MetricsSnapshot};
pub use registry::SourceRegistry;
pub use runtime::{Engine, ExecError, RunOutput};
