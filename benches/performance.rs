use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use fedplan_core::config::FederationConfig;
use fedplan_core::context::QueryContext;
use fedplan_core::endpoint::{EndpointCatalog, EndpointDescriptor, LeafBinding};
use fedplan_core::id::EndpointId;
use fedplan_core::query::CQuery;
use fedplan_core::term::Term;
use fedplan_exec::{Engine, SourceRegistry};
use fedplan_planner::dsl::yaml::parse_pattern;
use fedplan_planner::Planner;
use fedplan_source::MemorySource;

const ENDPOINTS: u64 = 3;

fn catalog() -> EndpointCatalog {
    let mut catalog = EndpointCatalog::new();
    for id in 1..=ENDPOINTS {
        catalog
            .insert(EndpointDescriptor::new(
                EndpointId::new(id),
                format!("e{id}"),
                format!("http://e{id}.example/sparql"),
            ))
            .unwrap();
    }
    catalog
}

/// ?v0 p0 ?v1 . ?v1 p1 ?v2 . ... spread round-robin over the endpoints.
fn chain(leaves: usize) -> Vec<LeafBinding> {
    (0..leaves)
        .map(|i| {
            let pattern = parse_pattern(&format!("?v{i} <http://ex/p{i}> ?v{}", i + 1)).unwrap();
            LeafBinding::new(
                EndpointId::new(i as u64 % ENDPOINTS + 1),
                CQuery::new(vec![pattern]),
            )
            .labeled(format!("L{i}"))
        })
        .collect()
}

fn bench_planning(c: &mut Criterion) {
    let planner = Planner::new(catalog(), FederationConfig::default());
    let mut group = c.benchmark_group("plan_chain");
    for leaves in [4usize, 16, 48] {
        let bindings = chain(leaves);
        group.bench_with_input(BenchmarkId::from_parameter(leaves), &bindings, |b, bindings| {
            b.iter(|| {
                let _ = planner.plan(bindings, &mut QueryContext::new()).unwrap();
            })
        });
    }
    group.finish();
}

fn bench_execution(c: &mut Criterion) {
    let catalog = catalog();
    let mut registry = SourceRegistry::default();
    for descriptor in catalog.iter() {
        let triples = (0..256).flat_map(|i| {
            (0..4).map(move |p| {
                [
                    Term::iri(format!("http://ex/n{i}")),
                    Term::iri(format!("http://ex/p{p}")),
                    Term::iri(format!("http://ex/n{}", (i + 1) % 256)),
                ]
            })
        });
        registry
            .register(Arc::new(MemorySource::new(descriptor.clone()).with_triples(triples)))
            .unwrap();
    }
    let planner = Planner::new(catalog, FederationConfig::default());
    let plan = planner
        .plan(&chain(4), &mut QueryContext::new())
        .unwrap();
    let engine = Engine::new(FederationConfig::default(), registry);

    c.bench_function("run_chain_4", |b| {
        b.iter(|| {
            let _ = engine.run(&plan, &QueryContext::new()).unwrap();
        })
    });
}

criterion_group!(federation, bench_planning, bench_execution);
criterion_main!(federation);
