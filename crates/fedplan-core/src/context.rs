//! Per-query context passed explicitly through planning and execution.
//!
//! Owned by the caller; nothing here is global. Planner steps may record
//! provenance or statistics; executors only read it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryContext {
    pub query_id: Uuid,
    values: BTreeMap<String, serde_json::Value>,
}

impl Default for QueryContext {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryContext {
    pub fn new() -> Self {
        Self {
            query_id: Uuid::new_v4(),
            values: BTreeMap::new(),
        }
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.values.get(key)
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(|v| v.as_u64())
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(|v| v.as_bool())
    }

    /// Add `delta` to a numeric counter, creating it at zero.
    pub fn incr(&mut self, key: &str, delta: u64) -> u64 {
        let next = self.get_u64(key).unwrap_or(0) + delta;
        self.set(key, next);
        next
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &serde_json::Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}
