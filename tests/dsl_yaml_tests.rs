//! Federation document parsing and resolution.

use fedplan_core::config::FederationConfig;
use fedplan_core::id::EndpointId;
use fedplan_core::query::PatternTerm;
use fedplan_core::schema::TermType;
use fedplan_core::term::Term;
use fedplan_core::Error;
use fedplan_planner::dsl::yaml::{parse_pattern, parse_term, DslError};
use fedplan_planner::{parse_federation, FederationSettings};
use fedplan_source::{PagingConfig, RateLimitConfig};

const XSD: &str = "http://www.w3.org/2001/XMLSchema#";

const TWO_SOURCES: &str = r#"
config:
  strict_paging: true
  max_pages_per_leaf: 4
sources:
  - name: people
    url: "http://people.example/sparql"
    paging: { type: offset, limit: 2 }
    rate_limit: { type: interval, min_interval_ms: 5 }
    rows: 500
    triples:
      - ["<http://ex/alice>", "<http://ex/knows>", "<http://ex/bob>"]
      - ["<http://ex/alice>", "<http://ex/age>", "42"]
  - name: places
    url: "http://places.example/api"
    capabilities: { single_star: true, joins: false }
leaves:
  - endpoint: people
    label: L1
    patterns: ["?x <http://ex/knows> ?y"]
  - endpoint: places
    label: L2
    patterns: ["?y <http://ex/city> ?c ."]
    types: { c: literal }
    locked: true
"#;

#[test]
fn test_parse_and_resolve_document() {
    let doc = parse_federation(TWO_SOURCES).expect("parse");
    assert_eq!(doc.sources.len(), 2);
    assert_eq!(doc.leaves.len(), 2);

    let resolved = doc.resolve().expect("resolve");
    let people = resolved.catalog.find_by_name("people").expect("people");
    let places = resolved.catalog.find_by_name("places").expect("places");
    assert_eq!(people.id, EndpointId::new(1));
    assert_eq!(places.id, EndpointId::new(2));
    assert!(places.capabilities.single_star);
    assert!(!places.capabilities.joins);
    assert!(places.capabilities.rewritable);

    let [l1, l2] = resolved.bindings.as_slice() else {
        panic!("expected two bindings");
    };
    assert_eq!(l1.endpoint, people.id);
    assert_eq!(l1.label.as_deref(), Some("L1"));
    assert!(!l1.locked);
    assert_eq!(l2.endpoint, places.id);
    assert!(l2.locked);
    assert_eq!(l2.fragment.declared().get("c"), Some(&TermType::Literal));

    assert_eq!(resolved.hints.endpoint_rows.get(&people.id), Some(&500.0));
    assert!(!resolved.hints.endpoint_rows.contains_key(&places.id));
}

#[test]
fn test_source_definitions_carry_paging_and_triples() {
    let doc = parse_federation(TWO_SOURCES).expect("parse");
    let people = doc.source("people").expect("people");
    assert!(matches!(people.paging, PagingConfig::Offset { limit: 2, .. }));
    assert!(matches!(
        people.rate_limit,
        RateLimitConfig::Interval { min_interval_ms: 5, .. }
    ));

    let triples = people.parse_triples().expect("triples");
    assert_eq!(triples.len(), 2);
    assert_eq!(triples[1][2], Term::typed_literal("42", format!("{XSD}integer")));

    let places = doc.source("places").expect("places");
    assert_eq!(places.paging, PagingConfig::None);
    assert_eq!(places.rate_limit, RateLimitConfig::None);
    assert!(doc.source("missing").is_none());
}

#[test]
fn test_settings_override_only_what_they_set() {
    let doc = parse_federation(TWO_SOURCES).expect("parse");
    let settings = doc.config.expect("config block");
    let mut cfg = FederationConfig::default();
    settings.apply(&mut cfg);

    assert!(cfg.strict_paging);
    assert_eq!(cfg.max_pages_per_leaf, Some(4));
    assert_eq!(cfg.clean_equivalents, FederationConfig::default().clean_equivalents);
    assert_eq!(
        cfg.default_leaf_cardinality,
        FederationConfig::default().default_leaf_cardinality
    );
}

#[test]
fn test_settings_ignore_non_positive_cardinality() {
    let mut cfg = FederationConfig::default();
    FederationSettings {
        default_leaf_cardinality: Some(-3.0),
        warn_on_cartesian: Some(false),
        ..Default::default()
    }
    .apply(&mut cfg);
    assert_eq!(cfg.default_leaf_cardinality, 1_000.0);
    assert!(!cfg.warn_on_cartesian);
}

#[test]
fn test_duplicate_source_name_is_config_error() {
    let yaml = r#"
sources:
  - { name: a, url: "http://a.example/sparql" }
  - { name: a, url: "http://b.example/sparql" }
"#;
    let err = parse_federation(yaml).expect("parse").resolve().unwrap_err();
    assert!(matches!(err, DslError::Resolve(Error::Config(_))));
}

#[test]
fn test_leaf_on_unknown_endpoint_is_config_error() {
    let yaml = r#"
sources:
  - { name: a, url: "http://a.example/sparql" }
leaves:
  - endpoint: b
    patterns: ["?x <http://ex/p> ?y"]
"#;
    let err = parse_federation(yaml).expect("parse").resolve().unwrap_err();
    assert!(matches!(err, DslError::Resolve(Error::Config(_))));
}

#[test]
fn test_unknown_declared_type_is_rejected() {
    let yaml = r#"
sources:
  - { name: a, url: "http://a.example/sparql" }
leaves:
  - endpoint: a
    patterns: ["?x <http://ex/p> ?y"]
    types: { y: number }
"#;
    let err = parse_federation(yaml).expect("parse").resolve().unwrap_err();
    assert!(matches!(err, DslError::Term(t) if t == "number"));
}

#[test]
fn test_malformed_yaml_is_rejected() {
    assert!(matches!(
        parse_federation("sources: [ {name: a"),
        Err(DslError::Yaml(_))
    ));
    // `sources` is required.
    assert!(matches!(parse_federation("leaves: []"), Err(DslError::Yaml(_))));
}

#[test]
fn test_parse_term_forms() {
    assert_eq!(parse_term("<http://ex/a>").unwrap(), Term::iri("http://ex/a"));
    assert_eq!(parse_term("_:b0").unwrap(), Term::blank("b0"));
    assert_eq!(parse_term("\"plain\"").unwrap(), Term::literal("plain"));
    assert_eq!(
        parse_term("\"chat\"@fr").unwrap(),
        Term::Literal {
            lexical: "chat".into(),
            datatype: None,
            lang: Some("fr".into()),
        }
    );
    assert_eq!(
        parse_term("\"5\"^^<http://ex/dt>").unwrap(),
        Term::typed_literal("5", "http://ex/dt")
    );
    assert_eq!(
        parse_term("true").unwrap(),
        Term::typed_literal("true", format!("{XSD}boolean"))
    );
    assert_eq!(
        parse_term("2.5").unwrap(),
        Term::typed_literal("2.5", format!("{XSD}decimal"))
    );

    for bad in ["_:", "bare", "\"open", "\"x\"^^dt"] {
        assert!(parse_term(bad).is_err(), "{bad} should not parse");
    }
}

#[test]
fn test_parse_pattern_tokens() {
    let tp = parse_pattern("?s <http://ex/label> \"two words\" .").expect("pattern");
    assert_eq!(tp.s, PatternTerm::var("s"));
    assert_eq!(tp.o, PatternTerm::Const(Term::literal("two words")));

    let tp = parse_pattern("$s <http://ex/p> ?o").expect("dollar var");
    assert_eq!(tp.s, PatternTerm::var("s"));

    assert!(matches!(
        parse_pattern("?s <http://ex/p>"),
        Err(DslError::Pattern { .. })
    ));
    assert!(matches!(
        parse_pattern("?s <http://ex/p> \"unterminated"),
        Err(DslError::Pattern { .. })
    ));
    assert!(matches!(parse_pattern("? <http://ex/p> ?o"), Err(DslError::Term(_))));
}
