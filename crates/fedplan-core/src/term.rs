//! RDF-style terms and solution mappings.
//!
//! Sources and serializers convert their own term models to/from these at
//! the edge.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::schema::TermType;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Term {
    Iri(String),
    Blank(String),
    Literal {
        lexical: String,
        datatype: Option<String>,
        lang: Option<String>,
    },
}

impl Term {
    pub fn iri(v: impl Into<String>) -> Self {
        Term::Iri(v.into())
    }

    pub fn blank(v: impl Into<String>) -> Self {
        Term::Blank(v.into())
    }

    /// Plain literal without datatype or language tag.
    pub fn literal(v: impl Into<String>) -> Self {
        Term::Literal {
            lexical: v.into(),
            datatype: None,
            lang: None,
        }
    }

    pub fn typed_literal(v: impl Into<String>, datatype: impl Into<String>) -> Self {
        Term::Literal {
            lexical: v.into(),
            datatype: Some(datatype.into()),
            lang: None,
        }
    }

    pub fn term_type(&self) -> TermType {
        match self {
            Term::Iri(_) => TermType::Iri,
            Term::Blank(_) => TermType::Blank,
            Term::Literal { .. } => TermType::Literal,
        }
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, Term::Literal { .. })
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Iri(iri) => write!(f, "<{iri}>"),
            Term::Blank(id) => write!(f, "_:{id}"),
            Term::Literal {
                lexical,
                datatype,
                lang,
            } => {
                write!(f, "\"{lexical}\"")?;
                if let Some(lang) = lang {
                    write!(f, "@{lang}")?;
                } else if let Some(dt) = datatype {
                    write!(f, "^^<{dt}>")?;
                }
                Ok(())
            }
        }
    }
}

/// One solution mapping: variable name → bound term.
///
/// Ordered so that solutions compare, hash, and serialize deterministically.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Solution {
    bindings: BTreeMap<String, Term>,
}

impl Solution {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, var: impl Into<String>, term: Term) -> Self {
        self.bindings.insert(var.into(), term);
        self
    }

    pub fn insert(&mut self, var: impl Into<String>, term: Term) -> Option<Term> {
        self.bindings.insert(var.into(), term)
    }

    pub fn get(&self, var: &str) -> Option<&Term> {
        self.bindings.get(var)
    }

    pub fn contains(&self, var: &str) -> bool {
        self.bindings.contains_key(var)
    }

    pub fn vars(&self) -> impl Iterator<Item = &str> {
        self.bindings.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Term)> {
        self.bindings.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Two solutions are compatible when every variable bound in both maps to
    /// the same term.
    pub fn compatible(&self, other: &Solution) -> bool {
        let (small, large) = if self.len() <= other.len() {
            (self, other)
        } else {
            (other, self)
        };
        small
            .bindings
            .iter()
            .all(|(var, term)| large.get(var).map_or(true, |t| t == term))
    }

    /// Union of both binding sets. Callers check `compatible` first; on a
    /// conflict `self` wins.
    pub fn merge(&self, other: &Solution) -> Solution {
        let mut out = self.clone();
        for (var, term) in &other.bindings {
            out.bindings
                .entry(var.clone())
                .or_insert_with(|| term.clone());
        }
        out
    }

    /// Join key over `vars`, or `None` if any of them is unbound.
    pub fn key(&self, vars: &[String]) -> Option<Vec<Term>> {
        vars.iter().map(|v| self.get(v).cloned()).collect()
    }
}

impl FromIterator<(String, Term)> for Solution {
    fn from_iter<I: IntoIterator<Item = (String, Term)>>(iter: I) -> Self {
        Self {
            bindings: iter.into_iter().collect(),
        }
    }
}
