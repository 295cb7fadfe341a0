//! Variable schemas: which variables a node produces and what kind of term each
//! one can hold. Pure data; no term values here.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Coarse term-kind lattice used for join type-compatibility.
///
/// `Node` is the supertype of `Iri` and `Blank`; `Any` is the top.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TermType {
    Any,
    Node,
    Iri,
    Blank,
    Literal,
}

impl TermType {
    /// Whether a term could satisfy both types at once.
    pub fn compatible(self, other: TermType) -> bool {
        self.meet(other).is_some()
    }

    /// Most specific type satisfying both, if any.
    pub fn meet(self, other: TermType) -> Option<TermType> {
        use TermType::*;
        match (self, other) {
            (a, b) if a == b => Some(a),
            (Any, t) | (t, Any) => Some(t),
            (Node, t @ (Iri | Blank)) | (t @ (Iri | Blank), Node) => Some(t),
            _ => None,
        }
    }

    /// Least common supertype (used for UNION outputs).
    pub fn widen(self, other: TermType) -> TermType {
        use TermType::*;
        match (self, other) {
            (a, b) if a == b => a,
            (Any, _) | (_, Any) => Any,
            (Literal, _) | (_, Literal) => Any,
            _ => Node,
        }
    }

    pub fn parse(s: &str) -> Option<TermType> {
        match s.to_ascii_lowercase().as_str() {
            "any" => Some(TermType::Any),
            "node" | "resource" => Some(TermType::Node),
            "iri" | "uri" => Some(TermType::Iri),
            "blank" | "bnode" => Some(TermType::Blank),
            "literal" => Some(TermType::Literal),
            _ => None,
        }
    }
}

/// Output variables of an operator node with their inferred types.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VarSchema {
    vars: BTreeMap<String, TermType>,
}

impl VarSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, var: impl Into<String>, ty: TermType) -> Self {
        self.vars.insert(var.into(), ty);
        self
    }

    pub fn insert(&mut self, var: impl Into<String>, ty: TermType) {
        self.vars.insert(var.into(), ty);
    }

    pub fn get(&self, var: &str) -> Option<TermType> {
        self.vars.get(var).copied()
    }

    pub fn contains(&self, var: &str) -> bool {
        self.vars.contains_key(var)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn names(&self) -> BTreeSet<String> {
        self.vars.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, TermType)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Variables present in both schemas (ignores type compatibility).
    pub fn shared(&self, other: &VarSchema) -> BTreeSet<String> {
        self.vars
            .keys()
            .filter(|k| other.vars.contains_key(*k))
            .cloned()
            .collect()
    }

    /// First shared variable (in name order) whose types cannot meet.
    pub fn first_incompatible(&self, other: &VarSchema) -> Option<String> {
        self.vars
            .iter()
            .find(|(k, ty)| other.get(k).is_some_and(|o| !ty.compatible(o)))
            .map(|(k, _)| k.clone())
    }

    /// Output schema of a join: all variables, shared ones narrowed by `meet`.
    /// Incompatible shared variables keep the left type; callers validate first.
    pub fn join(&self, other: &VarSchema) -> VarSchema {
        let mut out = self.clone();
        for (var, ty) in &other.vars {
            let merged = match out.vars.get(var) {
                Some(mine) => mine.meet(*ty).unwrap_or(*mine),
                None => *ty,
            };
            out.vars.insert(var.clone(), merged);
        }
        out
    }

    /// Output schema of a union: all variables, shared ones widened.
    pub fn union(&self, other: &VarSchema) -> VarSchema {
        let mut out = self.clone();
        for (var, ty) in &other.vars {
            let merged = match out.vars.get(var) {
                Some(mine) => mine.widen(*ty),
                None => *ty,
            };
            out.vars.insert(var.clone(), merged);
        }
        out
    }
}

impl FromIterator<(String, TermType)> for VarSchema {
    fn from_iter<I: IntoIterator<Item = (String, TermType)>>(iter: I) -> Self {
        Self {
            vars: iter.into_iter().collect(),
        }
    }
}
