//! Runtime: turn a `Plan` into a solution stream and emit a `RunManifest`.
//!
//! - Checks the plan is acyclic before building anything.
//! - Builds streams through the fixed dispatch table; nothing is fetched
//!   until the caller pulls.
//! - `run` drains the stream and records pages, truncations, and the plan
//!   fingerprint.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;

use fedplan_core::config::FederationConfig;
use fedplan_core::context::QueryContext;
use fedplan_core::dag::Plan;
use fedplan_core::manifest::RunManifest;
use fedplan_core::term::Solution;
use fedplan_operators::{OpError, SolutionStream};

use crate::dispatch::Executor;
use crate::metrics::{emit_span, ExecMetrics, MetricsSnapshot};
use crate::registry::SourceRegistry;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("plan: {0}")]
    Plan(#[from] fedplan_core::Error),
    #[error("source registry: {0}")]
    Registry(String),
    #[error("operator exec: {0}")]
    Operator(#[from] OpError),
    #[error("invalid plan: {0}")]
    Invalid(String),
    #[error("hashing error: {0}")]
    Hash(String),
}

/// Solutions of a completed run together with its manifest.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub solutions: Vec<Solution>,
    pub manifest: RunManifest,
}

/// Engine owns the config and the sources every plan leaf resolves against.
pub struct Engine {
    cfg: FederationConfig,
    registry: SourceRegistry,
    metrics: Arc<ExecMetrics>,
}

impl Engine {
    pub fn new(cfg: FederationConfig, registry: SourceRegistry) -> Self {
        Self {
            cfg,
            registry,
            metrics: Arc::new(ExecMetrics::default()),
        }
    }

    pub fn config(&self) -> &FederationConfig {
        &self.cfg
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    /// Counters accumulated over every `execute` and `run` on this engine.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Lazy stream of the plan's solutions.
    pub fn execute(&self, plan: &Plan, ctx: &QueryContext) -> Result<SolutionStream, ExecError> {
        self.stream(plan, ctx, Arc::clone(&self.metrics))
    }

    /// Execute to completion. The first error aborts the run.
    pub fn run(&self, plan: &Plan, ctx: &QueryContext) -> Result<RunOutput, ExecError> {
        let started_ms = now_ms();
        let plan_hash = plan
            .fingerprint()
            .map_err(|e| ExecError::Hash(e.to_string()))?;
        let manifest = RunManifest::new(ctx.query_id, plan_hash, started_ms);

        let metrics = Arc::new(ExecMetrics::default());
        let stream = self.stream(plan, ctx, Arc::clone(&metrics))?;
        let solutions = stream.collect::<Result<Vec<_>, _>>();
        let counters = metrics.snapshot();
        self.metrics.absorb(counters);
        let solutions = solutions?;

        emit_span(
            "run_done",
            &[
                ("query_id", ctx.query_id.to_string()),
                ("solutions", solutions.len().to_string()),
                ("pages", counters.pages_fetched.to_string()),
            ],
        );
        let manifest = manifest.finish(
            now_ms(),
            solutions.len() as u64,
            counters.pages_fetched,
            counters.truncated_leaves,
        );
        Ok(RunOutput {
            solutions,
            manifest,
        })
    }

    fn stream(
        &self,
        plan: &Plan,
        ctx: &QueryContext,
        metrics: Arc<ExecMetrics>,
    ) -> Result<SolutionStream, ExecError> {
        plan.arena.check_acyclic(plan.root)?;
        tracing::debug!(query_id = %ctx.query_id, plan = %plan.render(), "executing plan");
        let mut executor = Executor::new(plan, &self.registry, &self.cfg, ctx, metrics);
        executor.build(plan.root)
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
