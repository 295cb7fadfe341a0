//! Pre-plan: turn resolved leaf bindings into candidate plan units.
//!
//! One unit per distinct fragment: a single binding becomes its own leaf,
//! while the same fragment offered by several endpoints becomes a UNION of
//! source alternatives. Units are returned in first-appearance order.

use fedplan_core::dag::{keys, LockedSet, OpArena};
use fedplan_core::endpoint::{EndpointCatalog, LeafBinding};
use fedplan_core::error::{Error, Result};
use fedplan_core::id::{EndpointId, NodeId};
use fedplan_core::query::CQuery;

#[derive(Debug, Clone)]
pub struct Assembly {
    pub units: Vec<NodeId>,
    pub locked: LockedSet,
}

struct Group<'a> {
    fragment: &'a CQuery,
    endpoints: Vec<EndpointId>,
    nodes: Vec<NodeId>,
}

pub fn assemble(
    arena: &mut OpArena,
    bindings: &[LeafBinding],
    catalog: &EndpointCatalog,
) -> Result<Assembly> {
    let mut locked = LockedSet::new();
    let mut groups: Vec<Group<'_>> = Vec::new();

    for binding in bindings {
        let descriptor = catalog.require(binding.endpoint)?;
        if binding.fragment.is_empty() {
            return Err(Error::Shape(format!(
                "empty query fragment for endpoint '{}'",
                descriptor.name
            )));
        }
        descriptor
            .capabilities
            .check(&descriptor.name, &binding.fragment)?;

        let node = if binding.fragment.is_satisfiable() {
            arena.add_query(binding.endpoint, binding.fragment.clone())?
        } else {
            tracing::debug!(endpoint = %descriptor.name, fragment = %binding.fragment, "unsatisfiable fragment");
            arena.add_empty(binding.fragment.schema())
        };
        arena.annotate(node, keys::ENDPOINT, descriptor.name.clone());
        if let Some(label) = &binding.label {
            arena.annotate(node, keys::LABEL, label.clone());
        }
        if binding.locked || !descriptor.capabilities.rewritable {
            locked.lock(node);
        }

        // Same fragment on a new endpoint is an alternative; a repeat of an
        // (endpoint, fragment) pair stays a separate unit.
        let slot = groups.iter_mut().find(|g| {
            g.fragment == &binding.fragment && !g.endpoints.contains(&binding.endpoint)
        });
        match slot {
            Some(group) => {
                group.endpoints.push(binding.endpoint);
                group.nodes.push(node);
            }
            None => groups.push(Group {
                fragment: &binding.fragment,
                endpoints: vec![binding.endpoint],
                nodes: vec![node],
            }),
        }
    }

    let mut units = Vec::with_capacity(groups.len());
    for group in groups {
        let unit = match group.nodes.as_slice() {
            [single] => *single,
            _ => {
                let alternatives = group.nodes.len();
                let union = arena.add_union(group.nodes)?;
                arena.annotate(union, keys::ALTERNATIVES, alternatives);
                union
            }
        };
        units.push(unit);
    }
    Ok(Assembly { units, locked })
}
