//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use fedplan_core::endpoint::{Capabilities, EndpointCatalog, EndpointDescriptor, LeafBinding};
use fedplan_core::id::EndpointId;
use fedplan_core::query::CQuery;
use fedplan_core::term::Term;
use fedplan_planner::dsl::yaml::parse_pattern;

/// Fragment from pattern strings, e.g. `"?x <http://ex/knows> ?y"`.
pub fn fragment(patterns: &[&str]) -> CQuery {
    CQuery::new(
        patterns
            .iter()
            .map(|p| parse_pattern(p).expect("valid pattern"))
            .collect(),
    )
}

pub fn endpoint(id: u64, name: &str) -> EndpointDescriptor {
    EndpointDescriptor::new(
        EndpointId::new(id),
        name,
        format!("http://{name}.example/sparql"),
    )
}

pub fn endpoint_with(id: u64, name: &str, capabilities: Capabilities) -> EndpointDescriptor {
    endpoint(id, name).with_capabilities(capabilities)
}

pub fn catalog(descriptors: impl IntoIterator<Item = EndpointDescriptor>) -> EndpointCatalog {
    let mut catalog = EndpointCatalog::new();
    for d in descriptors {
        catalog.insert(d).expect("unique endpoint ids");
    }
    catalog
}

pub fn leaf(endpoint: u64, label: &str, patterns: &[&str]) -> LeafBinding {
    LeafBinding::new(EndpointId::new(endpoint), fragment(patterns)).labeled(label)
}

pub fn iri(s: &str) -> Term {
    Term::iri(format!("http://ex/{s}"))
}

pub fn no_joins() -> Capabilities {
    Capabilities {
        joins: false,
        ..Capabilities::default()
    }
}
