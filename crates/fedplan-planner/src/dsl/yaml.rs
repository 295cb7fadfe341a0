//! YAML federation documents: sources plus the leaves to plan.
//!
//! Example:
//! ```yaml
//! config: { strict_paging: false }
//! sources:
//!   - name: people
//!     url: "http://people.example/sparql"
//!     capabilities: { single_star: false, joins: true }
//!     paging: { type: offset, limit: 2 }
//!     rate_limit: { type: interval, min_interval_ms: 5 }
//!     triples:
//!       - ["<http://ex/alice>", "<http://ex/knows>", "<http://ex/bob>"]
//! leaves:
//!   - endpoint: people
//!     label: L1
//!     patterns: ["?x <http://ex/knows> ?y"]
//! ```
//!
//! Term syntax: `?v` / `$v` variables, `<iri>`, `_:b` blank nodes, and
//! `"lexical"` literals with optional `@lang` or `^^<datatype>`. Bare
//! integers, decimals, and `true`/`false` become typed literals.

use std::collections::{BTreeMap, BTreeSet};

use fedplan_core::config::FederationConfig;
use fedplan_core::endpoint::{Capabilities, EndpointCatalog, EndpointDescriptor, LeafBinding};
use fedplan_core::id::EndpointId;
use fedplan_core::query::{CQuery, PatternTerm, TriplePattern};
use fedplan_core::schema::TermType;
use fedplan_core::term::Term;
use fedplan_source::{PagingConfig, RateLimitConfig};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cost::CardinalityHints;

const XSD: &str = "http://www.w3.org/2001/XMLSchema#";

#[derive(Debug, Error)]
pub enum DslError {
    #[error("yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("bad term '{0}'")]
    Term(String),

    #[error("bad pattern '{pattern}': {reason}")]
    Pattern { pattern: String, reason: String },

    #[error(transparent)]
    Resolve(#[from] fedplan_core::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FederationDoc {
    #[serde(default)]
    pub config: Option<FederationSettings>,
    pub sources: Vec<SourceDef>,
    #[serde(default)]
    pub leaves: Vec<LeafDef>,
}

/// Config fields a document may set; unset fields keep the caller's value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FederationSettings {
    pub strict_paging: Option<bool>,
    pub max_pages_per_leaf: Option<usize>,
    pub clean_equivalents: Option<bool>,
    pub reuse_shared_results: Option<bool>,
    pub default_leaf_cardinality: Option<f64>,
    pub warn_on_cartesian: Option<bool>,
}

impl FederationSettings {
    pub fn apply(&self, cfg: &mut FederationConfig) {
        if let Some(v) = self.strict_paging {
            cfg.strict_paging = v;
        }
        if let Some(v) = self.max_pages_per_leaf {
            cfg.max_pages_per_leaf = Some(v);
        }
        if let Some(v) = self.clean_equivalents {
            cfg.clean_equivalents = v;
        }
        if let Some(v) = self.reuse_shared_results {
            cfg.reuse_shared_results = v;
        }
        if let Some(v) = self.default_leaf_cardinality {
            if v.is_finite() && v > 0.0 {
                cfg.default_leaf_cardinality = v;
            }
        }
        if let Some(v) = self.warn_on_cartesian {
            cfg.warn_on_cartesian = v;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDef {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub capabilities: Capabilities,
    #[serde(default)]
    pub paging: PagingConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    /// Page size served by the in-memory source for token/link paging.
    #[serde(default)]
    pub page_size: Option<usize>,
    /// Row-count hint for the cost estimator.
    #[serde(default)]
    pub rows: Option<f64>,
    #[serde(default)]
    pub triples: Vec<[String; 3]>,
}

impl SourceDef {
    pub fn parse_triples(&self) -> Result<Vec<[Term; 3]>, DslError> {
        self.triples
            .iter()
            .map(|[s, p, o]| Ok([parse_term(s)?, parse_term(p)?, parse_term(o)?]))
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeafDef {
    pub endpoint: String,
    #[serde(default)]
    pub label: Option<String>,
    pub patterns: Vec<String>,
    /// Declared variable types, e.g. `{ y: literal }`.
    #[serde(default)]
    pub types: BTreeMap<String, String>,
    #[serde(default)]
    pub locked: bool,
}

/// A document resolved into planner inputs. Endpoint ids follow source order,
/// starting at 1.
#[derive(Debug, Clone)]
pub struct ResolvedFederation {
    pub catalog: EndpointCatalog,
    pub bindings: Vec<LeafBinding>,
    pub hints: CardinalityHints,
}

pub fn parse_federation(yaml_src: &str) -> Result<FederationDoc, DslError> {
    Ok(serde_yaml::from_str(yaml_src)?)
}

impl FederationDoc {
    pub fn resolve(&self) -> Result<ResolvedFederation, DslError> {
        let mut catalog = EndpointCatalog::new();
        let mut hints = CardinalityHints::default();
        let mut names = BTreeSet::new();
        for (i, src) in self.sources.iter().enumerate() {
            if !names.insert(src.name.as_str()) {
                return Err(fedplan_core::Error::Config(format!(
                    "duplicate source name '{}'",
                    src.name
                ))
                .into());
            }
            let id = EndpointId::new(i as u64 + 1);
            catalog.insert(
                EndpointDescriptor::new(id, src.name.clone(), src.url.clone())
                    .with_capabilities(src.capabilities),
            )?;
            if let Some(rows) = src.rows {
                hints = hints.with(id, rows);
            }
        }

        let mut bindings = Vec::with_capacity(self.leaves.len());
        for leaf in &self.leaves {
            let endpoint = catalog.find_by_name(&leaf.endpoint).ok_or_else(|| {
                fedplan_core::Error::Config(format!("unknown endpoint '{}'", leaf.endpoint))
            })?;
            let mut binding = LeafBinding::new(endpoint.id, leaf.fragment()?);
            binding.label = leaf.label.clone();
            binding.locked = leaf.locked;
            bindings.push(binding);
        }
        Ok(ResolvedFederation {
            catalog,
            bindings,
            hints,
        })
    }

    /// Source definition by endpoint name.
    pub fn source(&self, name: &str) -> Option<&SourceDef> {
        self.sources.iter().find(|s| s.name == name)
    }
}

impl LeafDef {
    pub fn fragment(&self) -> Result<CQuery, DslError> {
        let patterns = self
            .patterns
            .iter()
            .map(|p| parse_pattern(p))
            .collect::<Result<Vec<_>, _>>()?;
        let mut fragment = CQuery::new(patterns);
        for (var, ty) in &self.types {
            let ty = TermType::parse(ty).ok_or_else(|| DslError::Term(ty.clone()))?;
            fragment = fragment.with_declared(var.trim_start_matches(['?', '$']), ty);
        }
        Ok(fragment)
    }
}

/// Split a pattern into whitespace-separated tokens; quoted literals may
/// contain spaces.
fn tokenize(src: &str) -> Result<Vec<String>, String> {
    let mut tokens = Vec::new();
    let mut chars = src.trim().trim_end_matches('.').chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        let mut tok = String::new();
        if c == '"' {
            tok.push(c);
            chars.next();
            let mut closed = false;
            while let Some(c) = chars.next() {
                tok.push(c);
                if c == '\\' {
                    if let Some(escaped) = chars.next() {
                        tok.push(escaped);
                    }
                } else if c == '"' {
                    closed = true;
                    break;
                }
            }
            if !closed {
                return Err("unterminated literal".into());
            }
        }
        while let Some(&c) = chars.peek() {
            if c.is_whitespace() {
                break;
            }
            tok.push(c);
            chars.next();
        }
        tokens.push(tok);
    }
    Ok(tokens)
}

pub fn parse_pattern(src: &str) -> Result<TriplePattern, DslError> {
    let err = |reason: String| DslError::Pattern {
        pattern: src.to_string(),
        reason,
    };
    let tokens = tokenize(src).map_err(err)?;
    let [s, p, o] = tokens.as_slice() else {
        return Err(err(format!("expected 3 terms, got {}", tokens.len())));
    };
    Ok(TriplePattern::new(
        parse_pattern_term(s)?,
        parse_pattern_term(p)?,
        parse_pattern_term(o)?,
    ))
}

pub fn parse_pattern_term(src: &str) -> Result<PatternTerm, DslError> {
    match src.strip_prefix('?').or_else(|| src.strip_prefix('$')) {
        Some("") => Err(DslError::Term(src.to_string())),
        Some(var) => Ok(PatternTerm::var(var)),
        None => Ok(PatternTerm::Const(parse_term(src)?)),
    }
}

pub fn parse_term(src: &str) -> Result<Term, DslError> {
    let bad = || DslError::Term(src.to_string());
    let s = src.trim();
    if let Some(iri) = s.strip_prefix('<').and_then(|r| r.strip_suffix('>')) {
        return Ok(Term::iri(iri));
    }
    if let Some(label) = s.strip_prefix("_:") {
        return if label.is_empty() {
            Err(bad())
        } else {
            Ok(Term::blank(label))
        };
    }
    if let Some(rest) = s.strip_prefix('"') {
        let close = rest.rfind('"').ok_or_else(bad)?;
        let lexical = rest[..close].replace("\\\"", "\"");
        let suffix = &rest[close + 1..];
        return if suffix.is_empty() {
            Ok(Term::literal(lexical))
        } else if let Some(lang) = suffix.strip_prefix('@') {
            Ok(Term::Literal {
                lexical,
                datatype: None,
                lang: Some(lang.to_string()),
            })
        } else if let Some(dt) = suffix
            .strip_prefix("^^<")
            .and_then(|r| r.strip_suffix('>'))
        {
            Ok(Term::typed_literal(lexical, dt))
        } else {
            Err(bad())
        };
    }
    if s == "true" || s == "false" {
        return Ok(Term::typed_literal(s, format!("{XSD}boolean")));
    }
    if s.parse::<i64>().is_ok() {
        return Ok(Term::typed_literal(s, format!("{XSD}integer")));
    }
    if s.parse::<f64>().is_ok() {
        return Ok(Term::typed_literal(s, format!("{XSD}decimal")));
    }
    Err(bad())
}
