//! Conjunctive query fragments (`CQuery`): the sub-query a leaf sends to one
//! endpoint. Parsing from a concrete query syntax happens upstream.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::schema::{TermType, VarSchema};
use crate::term::Term;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PatternTerm {
    Var(String),
    Const(Term),
}

impl PatternTerm {
    pub fn var(name: impl Into<String>) -> Self {
        PatternTerm::Var(name.into())
    }

    pub fn as_var(&self) -> Option<&str> {
        match self {
            PatternTerm::Var(v) => Some(v),
            PatternTerm::Const(_) => None,
        }
    }

    pub fn is_const(&self) -> bool {
        matches!(self, PatternTerm::Const(_))
    }
}

impl From<Term> for PatternTerm {
    fn from(t: Term) -> Self {
        PatternTerm::Const(t)
    }
}

impl fmt::Display for PatternTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatternTerm::Var(v) => write!(f, "?{v}"),
            PatternTerm::Const(t) => write!(f, "{t}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TriplePattern {
    pub s: PatternTerm,
    pub p: PatternTerm,
    pub o: PatternTerm,
}

impl TriplePattern {
    pub fn new(
        s: impl Into<PatternTerm>,
        p: impl Into<PatternTerm>,
        o: impl Into<PatternTerm>,
    ) -> Self {
        Self {
            s: s.into(),
            p: p.into(),
            o: o.into(),
        }
    }

    pub fn terms(&self) -> [&PatternTerm; 3] {
        [&self.s, &self.p, &self.o]
    }
}

impl fmt::Display for TriplePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.s, self.p, self.o)
    }
}

/// A conjunctive query: triple patterns plus declared variable types (e.g.
/// derived from filters such as `isLiteral(?x)`).
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CQuery {
    patterns: Vec<TriplePattern>,
    #[serde(default)]
    declared: BTreeMap<String, TermType>,
}

impl CQuery {
    pub fn new(patterns: Vec<TriplePattern>) -> Self {
        Self {
            patterns,
            declared: BTreeMap::new(),
        }
    }

    pub fn with_declared(mut self, var: impl Into<String>, ty: TermType) -> Self {
        self.declared.insert(var.into(), ty);
        self
    }

    pub fn patterns(&self) -> &[TriplePattern] {
        &self.patterns
    }

    pub fn declared(&self) -> &BTreeMap<String, TermType> {
        &self.declared
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn vars(&self) -> BTreeSet<String> {
        self.patterns
            .iter()
            .flat_map(|tp| tp.terms())
            .filter_map(|t| t.as_var().map(str::to_string))
            .collect()
    }

    /// Number of distinct subjects (variables or constants). A single star
    /// query has exactly one.
    pub fn star_count(&self) -> usize {
        self.patterns
            .iter()
            .map(|tp| &tp.s)
            .collect::<BTreeSet<_>>()
            .len()
    }

    /// Inferred output types, or the first variable whose positional and
    /// declared types conflict.
    pub fn try_schema(&self) -> Result<VarSchema, String> {
        let mut types: BTreeMap<String, TermType> = BTreeMap::new();
        for tp in &self.patterns {
            if let Some(v) = tp.s.as_var() {
                narrow(&mut types, v, TermType::Node)?;
            }
            if let Some(v) = tp.p.as_var() {
                narrow(&mut types, v, TermType::Iri)?;
            }
            if let Some(v) = tp.o.as_var() {
                narrow(&mut types, v, TermType::Any)?;
            }
        }
        for (var, ty) in &self.declared {
            if types.contains_key(var) {
                narrow(&mut types, var, *ty)?;
            }
        }
        Ok(types.into_iter().collect())
    }

    /// Inferred output types; conflicting variables degrade to `Any`.
    pub fn schema(&self) -> VarSchema {
        self.try_schema().unwrap_or_else(|_| {
            self.vars()
                .into_iter()
                .map(|v| (v, TermType::Any))
                .collect()
        })
    }

    /// False when no RDF graph can match: a literal in subject or predicate
    /// position, a blank node as predicate, or conflicting variable types.
    pub fn is_satisfiable(&self) -> bool {
        let malformed = self.patterns.iter().any(|tp| {
            matches!(&tp.s, PatternTerm::Const(t) if t.is_literal())
                || matches!(&tp.p, PatternTerm::Const(t) if !matches!(t, Term::Iri(_)))
        });
        !malformed && self.try_schema().is_ok()
    }

    /// Concatenation of both pattern lists (declarations merged).
    pub fn concat(&self, other: &CQuery) -> CQuery {
        let mut patterns = self.patterns.clone();
        for tp in &other.patterns {
            if !patterns.contains(tp) {
                patterns.push(tp.clone());
            }
        }
        let mut declared = self.declared.clone();
        for (var, ty) in &other.declared {
            let merged = declared
                .get(var)
                .and_then(|mine| mine.meet(*ty))
                .unwrap_or(*ty);
            declared.insert(var.clone(), merged);
        }
        CQuery { patterns, declared }
    }
}

fn narrow(types: &mut BTreeMap<String, TermType>, var: &str, ty: TermType) -> Result<(), String> {
    let cur = types.get(var).copied().unwrap_or(TermType::Any);
    let next = cur.meet(ty).ok_or_else(|| var.to_string())?;
    types.insert(var.to_string(), next);
    Ok(())
}

impl fmt::Display for CQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, tp) in self.patterns.iter().enumerate() {
            if i > 0 {
                write!(f, " .")?;
            }
            write!(f, " {tp}")?;
        }
        write!(f, " }}")
    }
}
