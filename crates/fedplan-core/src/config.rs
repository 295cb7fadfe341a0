//! Engine configuration that downstream crates can serialize/deserialize.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FederationConfig {
    /// Surface pagination failures after the first page as errors instead of
    /// ending the leaf with its partial results.
    pub strict_paging: bool,

    /// Optional cap on pages fetched per leaf execution.
    pub max_pages_per_leaf: Option<usize>,

    /// Run the equivalence cleaner after the rewrite phases.
    pub clean_equivalents: bool,

    /// Evaluate shared (cleaned) subtrees once and replay them to every parent.
    pub reuse_shared_results: bool,

    /// Cardinality assumed for a leaf with no hints at all.
    pub default_leaf_cardinality: f64,

    /// Emit a warning whenever the planner falls back to a cartesian product.
    pub warn_on_cartesian: bool,
}

impl Default for FederationConfig {
    fn default() -> Self {
        Self {
            strict_paging: false,
            max_pages_per_leaf: None,
            clean_equivalents: true,
            reuse_shared_results: true,
            default_leaf_cardinality: 1_000.0,
            warn_on_cartesian: true,
        }
    }
}

impl FederationConfig {
    /// Create a config from environment variables, falling back to defaults.
    ///
    /// Environment variables:
    /// - `FEDPLAN_STRICT_PAGING`: `true`/`false`
    /// - `FEDPLAN_MAX_PAGES`: max pages per leaf
    /// - `FEDPLAN_CLEAN_EQUIVALENTS`: `true`/`false`
    /// - `FEDPLAN_REUSE_SHARED`: `true`/`false`
    /// - `FEDPLAN_DEFAULT_CARDINALITY`: float
    /// - `FEDPLAN_WARN_ON_CARTESIAN`: `true`/`false`
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Some(v) = env_parse::<bool>("FEDPLAN_STRICT_PAGING") {
            cfg.strict_paging = v;
        }

        if let Some(v) = env_parse::<usize>("FEDPLAN_MAX_PAGES") {
            cfg.max_pages_per_leaf = Some(v);
        }

        if let Some(v) = env_parse::<bool>("FEDPLAN_CLEAN_EQUIVALENTS") {
            cfg.clean_equivalents = v;
        }

        if let Some(v) = env_parse::<bool>("FEDPLAN_REUSE_SHARED") {
            cfg.reuse_shared_results = v;
        }

        if let Some(v) = env_parse::<f64>("FEDPLAN_DEFAULT_CARDINALITY") {
            if v.is_finite() && v > 0.0 {
                cfg.default_leaf_cardinality = v;
            }
        }

        if let Some(v) = env_parse::<bool>("FEDPLAN_WARN_ON_CARTESIAN") {
            cfg.warn_on_cartesian = v;
        }

        cfg
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse::<T>().ok())
}
