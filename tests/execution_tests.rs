//! End-to-end execution: planner output driven through the engine against
//! in-memory sources.

mod support;

use std::collections::BTreeSet;
use std::sync::Arc;

use fedplan_core::config::FederationConfig;
use fedplan_core::context::QueryContext;
use fedplan_core::dag::{OpArena, OpKind, Plan};
use fedplan_core::endpoint::{EndpointCatalog, EndpointDescriptor, LeafBinding};
use fedplan_core::id::EndpointId;
use fedplan_core::term::{Solution, Term};
use fedplan_exec::dispatch::{executor_for, CTX_MAX_PAGES};
use fedplan_exec::{Engine, ExecError, SourceRegistry};
use fedplan_operators::OpError;
use fedplan_planner::Planner;
use fedplan_source::{
    MemorySource, NextLinkPaging, OffsetPaging, SourceError, TokenPaging,
};
use support::{endpoint, endpoint_with, iri, leaf, no_joins};

fn names(descriptor: EndpointDescriptor) -> MemorySource {
    let name = iri("name");
    MemorySource::new(descriptor)
        .with_triple(iri("alice"), name.clone(), Term::literal("Alice"))
        .with_triple(iri("bob"), name.clone(), Term::literal("Bob"))
        .with_triple(iri("carol"), name, Term::literal("Carol"))
}

fn ages(descriptor: EndpointDescriptor) -> MemorySource {
    let age = iri("age");
    MemorySource::new(descriptor)
        .with_triple(iri("alice"), age.clone(), Term::literal("30"))
        .with_triple(iri("bob"), age.clone(), Term::literal("40"))
        .with_triple(iri("dave"), age, Term::literal("50"))
}

struct Fixture {
    catalog: EndpointCatalog,
    registry: SourceRegistry,
    sources: Vec<Arc<MemorySource>>,
}

fn fixture(sources: Vec<MemorySource>) -> Fixture {
    let mut registry = SourceRegistry::new();
    let mut catalog = EndpointCatalog::new();
    let sources: Vec<Arc<MemorySource>> = sources.into_iter().map(Arc::new).collect();
    for src in &sources {
        catalog
            .insert(fedplan_source::Source::descriptor(src.as_ref()).clone())
            .expect("unique");
        registry.register(src.clone()).expect("register");
    }
    Fixture {
        catalog,
        registry,
        sources,
    }
}

fn run(
    fx: Fixture,
    config: FederationConfig,
    bindings: &[LeafBinding],
) -> (Result<Vec<Solution>, ExecError>, Vec<Arc<MemorySource>>) {
    let planner = Planner::new(fx.catalog, config.clone());
    let mut ctx = QueryContext::new();
    let plan = planner.plan(bindings, &mut ctx).expect("plan");
    let engine = Engine::new(config, fx.registry);
    let out = engine.run(&plan, &ctx).map(|o| o.solutions);
    (out, fx.sources)
}

fn values(solutions: &[Solution], var: &str) -> BTreeSet<String> {
    solutions
        .iter()
        .filter_map(|s| s.get(var).map(|t| t.to_string()))
        .collect()
}

#[test]
fn test_scenario_d_single_response_single_fetch() {
    let fx = fixture(vec![names(endpoint(1, "names"))]);
    let (out, sources) = run(
        fx,
        FederationConfig::default(),
        &[leaf(1, "L1", &["?x <http://ex/name> ?n"])],
    );
    let solutions = out.expect("run");
    assert_eq!(solutions.len(), 3);
    assert_eq!(sources[0].fetch_count(), 1);
}

#[test]
fn test_join_matches_relational_semantics() {
    let fx = fixture(vec![
        names(endpoint(1, "names")),
        ages(endpoint(2, "ages")),
    ]);
    let (out, _) = run(
        fx,
        FederationConfig::default(),
        &[
            leaf(1, "L1", &["?x <http://ex/name> ?n"]),
            leaf(2, "L2", &["?x <http://ex/age> ?a"]),
        ],
    );
    let solutions = out.expect("run");
    assert_eq!(solutions.len(), 2);
    assert_eq!(
        values(&solutions, "x"),
        BTreeSet::from(["<http://ex/alice>".to_string(), "<http://ex/bob>".to_string()])
    );
    for s in &solutions {
        assert_eq!(s.len(), 3);
    }
}

#[test]
fn test_cartesian_emits_cross_product() {
    let fx = fixture(vec![
        names(endpoint(1, "names")),
        ages(endpoint(2, "ages")),
    ]);
    let (out, _) = run(
        fx,
        FederationConfig::default(),
        &[
            leaf(1, "L1", &["?x <http://ex/name> ?n"]),
            leaf(2, "L2", &["?y <http://ex/age> ?a"]),
        ],
    );
    let solutions = out.expect("run");
    assert_eq!(solutions.len(), 9);
    let pairs: BTreeSet<(String, String)> = solutions
        .iter()
        .map(|s| (s.get("x").expect("x").to_string(), s.get("y").expect("y").to_string()))
        .collect();
    assert_eq!(pairs.len(), 9);
}

#[test]
fn test_union_keeps_duplicates_from_alternatives() {
    let fx = fixture(vec![
        names(endpoint(1, "mirror-a")),
        names(endpoint(2, "mirror-b")),
    ]);
    let (out, _) = run(
        fx,
        FederationConfig::default(),
        &[
            leaf(1, "A", &["?x <http://ex/name> ?n"]),
            leaf(2, "B", &["?x <http://ex/name> ?n"]),
        ],
    );
    let solutions = out.expect("run");
    assert_eq!(solutions.len(), 6);
    assert_eq!(values(&solutions, "x").len(), 3);
}

#[test]
fn test_empty_plan_performs_no_io() {
    let fx = fixture(vec![
        names(endpoint(1, "names")),
        ages(endpoint(2, "ages")),
    ]);
    let (out, sources) = run(
        fx,
        FederationConfig::default(),
        &[
            leaf(1, "L1", &["?x <http://ex/name> ?n"]),
            leaf(2, "L2", &["\"x\" <http://ex/age> ?x"]),
        ],
    );
    assert!(out.expect("run").is_empty());
    assert!(sources.iter().all(|s| s.fetch_count() == 0));
}

#[test]
fn test_paged_leaves_collect_every_page() {
    let fx = fixture(vec![
        names(endpoint(1, "offset")).with_paging(Arc::new(OffsetPaging::new(2))),
        names(endpoint(2, "token"))
            .with_paging(Arc::new(TokenPaging {
                param: "cursor".into(),
            }))
            .with_page_size(1),
    ]);
    let planner = Planner::new(fx.catalog.clone(), FederationConfig::default());
    let engine = Engine::new(FederationConfig::default(), fx.registry);

    for endpoint_id in [1, 2] {
        let mut ctx = QueryContext::new();
        let plan = planner
            .plan(&[leaf(endpoint_id, "L", &["?x <http://ex/name> ?n"])], &mut ctx)
            .expect("plan");
        let out = engine.run(&plan, &ctx).expect("run");
        assert_eq!(out.solutions.len(), 3);
        assert_eq!(out.manifest.truncated_leaves, 0);
    }
    // offset: 2 + 1 rows; token: one row per page.
    assert_eq!(fx.sources[0].fetch_count(), 2);
    assert_eq!(fx.sources[1].fetch_count(), 3);
    assert_eq!(engine.metrics().pages_fetched, 5);
}

#[test]
fn test_next_link_binds_page_of_origin() {
    let fx = fixture(vec![names(endpoint(1, "linked"))
        .with_paging(Arc::new(NextLinkPaging {
            bind_var: Some("page".into()),
        }))
        .with_page_size(2)]);
    let (out, sources) = run(
        fx,
        FederationConfig::default(),
        &[leaf(1, "L1", &["?x <http://ex/name> ?n"])],
    );
    let solutions = out.expect("run");
    assert_eq!(solutions.len(), 3);
    assert_eq!(sources[0].fetch_count(), 2);
    assert_eq!(
        values(&solutions, "page"),
        BTreeSet::from([
            "<http://linked.example/sparql>".to_string(),
            "<http://linked.example/sparql?start=2>".to_string(),
        ])
    );
}

#[test]
fn test_page_cap_truncates_and_is_recorded() {
    let fx = fixture(vec![
        names(endpoint(1, "offset")).with_paging(Arc::new(OffsetPaging::new(1)))
    ]);
    let config = FederationConfig {
        max_pages_per_leaf: Some(2),
        ..FederationConfig::default()
    };
    let planner = Planner::new(fx.catalog.clone(), config.clone());
    let engine = Engine::new(config, fx.registry);
    let mut ctx = QueryContext::new();
    let plan = planner
        .plan(&[leaf(1, "L1", &["?x <http://ex/name> ?n"])], &mut ctx)
        .expect("plan");

    let out = engine.run(&plan, &ctx).expect("run");
    assert_eq!(out.solutions.len(), 2);
    assert_eq!(out.manifest.pages_fetched, 2);
    assert_eq!(out.manifest.truncated_leaves, 1);
    assert_eq!(out.manifest.plan_hash, plan.fingerprint().expect("hash"));
    assert_eq!(out.manifest.query_id, ctx.query_id);

    // The context can tighten the cap for one query.
    ctx.set(CTX_MAX_PAGES, 1u64);
    let out = engine.run(&plan, &ctx).expect("run");
    assert_eq!(out.solutions.len(), 1);
}

#[test]
fn test_first_page_failure_fails_the_run() {
    let fx = fixture(vec![
        names(endpoint(1, "names")),
        ages(endpoint(2, "ages")).fail_on_fetch(1, SourceError::transport("ages", "refused")),
    ]);
    let (out, _) = run(
        fx,
        FederationConfig::default(),
        &[
            leaf(1, "L1", &["?x <http://ex/name> ?n"]),
            leaf(2, "L2", &["?x <http://ex/age> ?a"]),
        ],
    );
    match out {
        Err(ExecError::Operator(OpError::Source(SourceError::Transport { endpoint, .. }))) => {
            assert_eq!(endpoint, "ages")
        }
        other => panic!("expected transport failure, got {other:?}"),
    }
}

#[test]
fn test_later_page_failure_is_partial_unless_strict() {
    let failing = || {
        fixture(vec![names(endpoint(1, "names"))
            .with_paging(Arc::new(OffsetPaging::new(2)))
            .fail_on_fetch(2, SourceError::Unavailable {
                endpoint: "names".into(),
            })])
    };
    let bindings = [leaf(1, "L1", &["?x <http://ex/name> ?n"])];

    let (out, _) = run(failing(), FederationConfig::default(), &bindings);
    assert_eq!(out.expect("partial results").len(), 2);

    let strict = FederationConfig {
        strict_paging: true,
        ..FederationConfig::default()
    };
    let (out, _) = run(failing(), strict, &bindings);
    assert!(matches!(out, Err(ExecError::Operator(_))));
}

#[test]
fn test_shared_node_is_fetched_once_when_reused() {
    let bindings = [
        leaf(1, "L1", &["?x <http://ex/name> ?n"]),
        leaf(1, "L1", &["?x <http://ex/name> ?n"]),
    ];
    let reuse = FederationConfig::default();
    let fx = fixture(vec![names(endpoint_with(1, "names", no_joins()))]);
    let (out, sources) = run(fx, reuse, &bindings);
    assert_eq!(out.expect("run").len(), 3);
    assert_eq!(sources[0].fetch_count(), 1);

    let no_reuse = FederationConfig {
        reuse_shared_results: false,
        ..FederationConfig::default()
    };
    let fx = fixture(vec![names(endpoint_with(1, "names", no_joins()))]);
    let (out, sources) = run(fx, no_reuse, &bindings);
    assert_eq!(out.expect("run").len(), 3);
    assert_eq!(sources[0].fetch_count(), 2);
}

#[test]
fn test_unregistered_endpoint_is_a_registry_error() {
    let mut arena = OpArena::new();
    let root = arena
        .add_query(
            EndpointId::new(7),
            support::fragment(&["?x <http://ex/name> ?n"]),
        )
        .expect("leaf");
    let plan = Plan::new(arena, root);
    let engine = Engine::new(FederationConfig::default(), SourceRegistry::new());
    let err = engine
        .execute(&plan, &QueryContext::new())
        .err()
        .expect("no source for endpoint 7");
    assert!(matches!(err, ExecError::Registry(_)));
}

#[test]
fn test_streams_are_lazy_until_pulled() {
    let fx = fixture(vec![names(endpoint(1, "names"))]);
    let planner = Planner::new(fx.catalog.clone(), FederationConfig::default());
    let engine = Engine::new(FederationConfig::default(), fx.registry);
    let mut ctx = QueryContext::new();
    let plan = planner
        .plan(&[leaf(1, "L1", &["?x <http://ex/name> ?n"])], &mut ctx)
        .expect("plan");

    let mut stream = engine.execute(&plan, &ctx).expect("stream");
    assert_eq!(fx.sources[0].fetch_count(), 0);
    assert!(stream.next().is_some());
    assert_eq!(fx.sources[0].fetch_count(), 1);
}

#[test]
fn test_dispatch_table_covers_every_kind() {
    let mut arena = OpArena::new();
    let root = arena.add_empty(Default::default());
    let plan = Plan::new(arena, root);
    let registry = SourceRegistry::new();
    let mut ex = fedplan_exec::dispatch::Executor::new(
        &plan,
        &registry,
        &FederationConfig::default(),
        &QueryContext::new(),
        Default::default(),
    );
    let stream = executor_for(OpKind::Empty)(&mut ex, root).expect("empty");
    assert_eq!(stream.count(), 0);
    // Every slot of the table is keyed by the kind it serves.
    for kind in [OpKind::Query, OpKind::Join, OpKind::Cartesian, OpKind::Union] {
        let _ = executor_for(kind);
    }
}

#[test]
fn test_cartesian_of_joined_pairs() {
    // Four leaves in two linked pairs: CARTESIAN(JOIN, JOIN) end to end.
    let fx = fixture(vec![
        names(endpoint(1, "n1")),
        ages(endpoint(2, "a1")),
        names(endpoint(3, "n2")),
        ages(endpoint(4, "a2")),
    ]);
    let (out, _) = run(
        fx,
        FederationConfig::default(),
        &[
            leaf(1, "L1", &["?x <http://ex/name> ?n"]),
            leaf(2, "L2", &["?x <http://ex/age> ?a"]),
            leaf(3, "L3", &["?y <http://ex/name> ?m"]),
            leaf(4, "L4", &["?y <http://ex/age> ?b"]),
        ],
    );
    assert_eq!(out.expect("run").len(), 4);
}
