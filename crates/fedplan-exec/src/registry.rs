//! Source registry: endpoint id → protocol client.

use std::collections::BTreeMap;
use std::sync::Arc;

use fedplan_core::id::EndpointId;
use fedplan_source::Source;

use crate::runtime::ExecError;

#[derive(Default, Clone)]
pub struct SourceRegistry {
    sources: BTreeMap<EndpointId, Arc<dyn Source>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register under the source's own descriptor id.
    pub fn register(&mut self, source: Arc<dyn Source>) -> Result<(), ExecError> {
        let id = source.descriptor().id;
        if self.sources.contains_key(&id) {
            return Err(ExecError::Registry(format!(
                "source already registered for {id}"
            )));
        }
        self.sources.insert(id, source);
        Ok(())
    }

    pub fn get(&self, id: EndpointId) -> Result<Arc<dyn Source>, ExecError> {
        self.sources
            .get(&id)
            .cloned()
            .ok_or_else(|| ExecError::Registry(format!("no source registered for {id}")))
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}
