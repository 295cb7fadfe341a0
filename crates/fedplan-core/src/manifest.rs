//! Run manifest emitted after a plan has been executed to completion.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::hash::Hash256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ManifestId(pub Uuid);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    pub id: ManifestId,

    /// Query the run belongs to (from the `QueryContext`).
    pub query_id: Uuid,

    /// Stable hash of the reachable plan structure.
    pub plan_hash: Hash256,

    /// Engine version string for provenance.
    pub engine_version: String,

    pub solutions: u64,
    pub pages_fetched: u64,
    /// Leaves that stopped paginating early and returned partial results.
    pub truncated_leaves: u64,

    /// Milliseconds since Unix epoch (UTC).
    pub started_ms: u64,
    pub finished_ms: u64,
}

impl RunManifest {
    pub fn new(query_id: Uuid, plan_hash: Hash256, started_ms: u64) -> Self {
        Self {
            id: ManifestId(Uuid::new_v4()),
            query_id,
            plan_hash,
            engine_version: crate::VERSION.to_string(),
            solutions: 0,
            pages_fetched: 0,
            truncated_leaves: 0,
            started_ms,
            finished_ms: started_ms,
        }
    }

    pub fn finish(
        mut self,
        finished_ms: u64,
        solutions: u64,
        pages_fetched: u64,
        truncated_leaves: u64,
    ) -> Self {
        self.finished_ms = finished_ms;
        self.solutions = solutions;
        self.pages_fetched = pages_fetched;
        self.truncated_leaves = truncated_leaves;
        self
    }
}
