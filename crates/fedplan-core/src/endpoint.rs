//! Endpoint descriptors and the leaf bindings handed to the planner.
//!
//! Descriptors carry only what planning needs (identity and dialect
//! capabilities); the protocol client for an endpoint lives in `fedplan-source`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::id::EndpointId;
use crate::query::CQuery;

/// What the target dialect of an endpoint accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Capabilities {
    /// Only one star (one subject) per query, e.g. web APIs keyed by resource.
    pub single_star: bool,
    /// The endpoint can evaluate joins itself, so co-located leaves may merge.
    pub joins: bool,
    /// Planner steps may rewrite leaves bound to this endpoint.
    pub rewritable: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            single_star: false,
            joins: true,
            rewritable: true,
        }
    }
}

impl Capabilities {
    /// Check a fragment against this dialect.
    pub fn check(&self, endpoint: &str, fragment: &CQuery) -> Result<()> {
        if self.single_star && fragment.star_count() > 1 {
            return Err(Error::Shape(format!(
                "endpoint '{endpoint}' accepts a single star per query, got {} stars in {fragment}",
                fragment.star_count()
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointDescriptor {
    pub id: EndpointId,
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub capabilities: Capabilities,
}

impl EndpointDescriptor {
    pub fn new(id: EndpointId, name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            url: url.into(),
            capabilities: Capabilities::default(),
        }
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }
}

/// Resolved endpoints, keyed by id (deterministic iteration order).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EndpointCatalog {
    endpoints: BTreeMap<EndpointId, EndpointDescriptor>,
}

impl EndpointCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, descriptor: EndpointDescriptor) -> Result<()> {
        if self.endpoints.contains_key(&descriptor.id) {
            return Err(Error::Config(format!(
                "duplicate endpoint id {}",
                descriptor.id
            )));
        }
        self.endpoints.insert(descriptor.id, descriptor);
        Ok(())
    }

    pub fn get(&self, id: EndpointId) -> Option<&EndpointDescriptor> {
        self.endpoints.get(&id)
    }

    pub fn require(&self, id: EndpointId) -> Result<&EndpointDescriptor> {
        self.get(id)
            .ok_or_else(|| Error::Config(format!("unknown endpoint {id}")))
    }

    pub fn find_by_name(&self, name: &str) -> Option<&EndpointDescriptor> {
        self.endpoints.values().find(|d| d.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &EndpointDescriptor> {
        self.endpoints.values()
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

/// One proto-leaf: a query fragment resolved to the endpoint that answers it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeafBinding {
    pub endpoint: EndpointId,
    pub fragment: CQuery,
    /// Display label carried into the plan as the `label` annotation.
    #[serde(default)]
    pub label: Option<String>,
    /// Planner steps may annotate but never replace a locked leaf.
    #[serde(default)]
    pub locked: bool,
}

impl LeafBinding {
    pub fn new(endpoint: EndpointId, fragment: CQuery) -> Self {
        Self {
            endpoint,
            fragment,
            label: None,
            locked: false,
        }
    }

    pub fn labeled(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn locked(mut self) -> Self {
        self.locked = true;
        self
    }
}
