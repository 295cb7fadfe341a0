//! Operator DAG: the federation plan representation.
//!
//! Nodes live in an [`OpArena`] and are addressed by stable [`NodeId`] handles.
//! A plan reachable from a root is a proper tree until the equivalence cleaner
//! runs; afterwards structurally-equal subtrees may be shared by several
//! parents. Rewrites that must specialize a shared node copy it first
//! ([`OpArena::unshare`]).
//!
//! Arity invariants (enforced by every constructor and `set_children`):
//! - `Query` and `Empty` have no children,
//! - `Join`, `Cartesian`, `Union` have at least two.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::hash::{hash_serde, Hash256};
use crate::id::{EndpointId, NodeId};
use crate::query::CQuery;
use crate::schema::VarSchema;

/// Well-known annotation keys.
pub mod keys {
    pub const LABEL: &str = "label";
    pub const ENDPOINT: &str = "endpoint";
    pub const CARDINALITY: &str = "cardinality";
    pub const CARTESIAN: &str = "cartesian";
    pub const CARTESIAN_REASON: &str = "cartesian_reason";
    pub const ALTERNATIVES: &str = "alternatives";
    pub const MERGED_FROM: &str = "merged_from";
}

/// Open-ended metadata attached by planner steps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Annotations(BTreeMap<String, serde_json::Value>);

impl Annotations {
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(|v| v.as_f64())
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(|v| v.as_str())
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &serde_json::Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum OpKind {
    Query,
    Join,
    Cartesian,
    Union,
    Empty,
}

impl OpKind {
    pub fn name(self) -> &'static str {
        match self {
            OpKind::Query => "QUERY",
            OpKind::Join => "JOIN",
            OpKind::Cartesian => "CARTESIAN",
            OpKind::Union => "UNION",
            OpKind::Empty => "EMPTY",
        }
    }

    pub fn is_leaf(self) -> bool {
        matches!(self, OpKind::Query | OpKind::Empty)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Op {
    /// Leaf bound to one endpoint and one sub-query.
    Query {
        endpoint: EndpointId,
        fragment: CQuery,
    },
    Join,
    Cartesian,
    Union,
    /// Provably no results.
    Empty,
}

impl Op {
    pub fn kind(&self) -> OpKind {
        match self {
            Op::Query { .. } => OpKind::Query,
            Op::Join => OpKind::Join,
            Op::Cartesian => OpKind::Cartesian,
            Op::Union => OpKind::Union,
            Op::Empty => OpKind::Empty,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpNode {
    op: Op,
    children: Vec<NodeId>,
    schema: VarSchema,
    annotations: Annotations,
}

impl OpNode {
    pub fn op(&self) -> &Op {
        &self.op
    }

    pub fn kind(&self) -> OpKind {
        self.op.kind()
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Output variables of this node.
    pub fn schema(&self) -> &VarSchema {
        &self.schema
    }

    pub fn annotations(&self) -> &Annotations {
        &self.annotations
    }

    pub fn label(&self) -> Option<&str> {
        self.annotations.get_str(keys::LABEL)
    }

    /// Endpoint and fragment of a `Query` node.
    pub fn query(&self) -> Option<(EndpointId, &CQuery)> {
        match &self.op {
            Op::Query { endpoint, fragment } => Some((*endpoint, fragment)),
            _ => None,
        }
    }
}

/// Arena of operator nodes. Handles are never reused; unreachable nodes are
/// simply garbage once no plan root references them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpArena {
    nodes: Vec<OpNode>,
}

impl OpArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of allocated nodes (reachable or not).
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// # Panics
    /// If `id` was not minted by this arena.
    pub fn node(&self, id: NodeId) -> &OpNode {
        &self.nodes[id.get() as usize]
    }

    pub fn try_node(&self, id: NodeId) -> Result<&OpNode> {
        self.nodes
            .get(id.get() as usize)
            .ok_or_else(|| Error::Invariant(format!("dangling node handle {id}")))
    }

    pub fn contains(&self, id: NodeId) -> bool {
        (id.get() as usize) < self.nodes.len()
    }

    pub fn add_query(&mut self, endpoint: EndpointId, fragment: CQuery) -> Result<NodeId> {
        self.add(Op::Query { endpoint, fragment }, Vec::new())
    }

    pub fn add_join(&mut self, children: Vec<NodeId>) -> Result<NodeId> {
        self.add(Op::Join, children)
    }

    pub fn add_cartesian(&mut self, children: Vec<NodeId>) -> Result<NodeId> {
        self.add(Op::Cartesian, children)
    }

    pub fn add_union(&mut self, children: Vec<NodeId>) -> Result<NodeId> {
        self.add(Op::Union, children)
    }

    pub fn add_empty(&mut self, schema: VarSchema) -> NodeId {
        self.push(OpNode {
            op: Op::Empty,
            children: Vec::new(),
            schema,
            annotations: Annotations::default(),
        })
    }

    /// Allocate a node, validating arity and deriving its output schema.
    pub fn add(&mut self, op: Op, children: Vec<NodeId>) -> Result<NodeId> {
        self.check_children(&op, &children)?;
        if let Op::Query { fragment, .. } = &op {
            if fragment.is_empty() {
                return Err(Error::Shape("query leaf needs at least one pattern".into()));
            }
        }
        let schema = self.derive_schema(&op, &children);
        Ok(self.push(OpNode {
            op,
            children,
            schema,
            annotations: Annotations::default(),
        }))
    }

    fn push(&mut self, node: OpNode) -> NodeId {
        let id = NodeId::new(self.nodes.len() as u64);
        self.nodes.push(node);
        id
    }

    fn check_children(&self, op: &Op, children: &[NodeId]) -> Result<()> {
        let kind = op.kind();
        if kind.is_leaf() && !children.is_empty() {
            return Err(Error::Plan(format!("{} node cannot have children", kind.name())));
        }
        if !kind.is_leaf() && children.len() < 2 {
            return Err(Error::Plan(format!(
                "{} node needs at least two children, got {}",
                kind.name(),
                children.len()
            )));
        }
        if let Some(bad) = children.iter().find(|c| !self.contains(**c)) {
            return Err(Error::Invariant(format!("dangling child handle {bad}")));
        }
        Ok(())
    }

    fn derive_schema(&self, op: &Op, children: &[NodeId]) -> VarSchema {
        let mut schemas = children.iter().map(|c| self.node(*c).schema());
        match op {
            Op::Query { fragment, .. } => fragment.schema(),
            Op::Empty => VarSchema::new(),
            Op::Join | Op::Cartesian => schemas
                .fold(VarSchema::new(), |acc, s| acc.join(s)),
            Op::Union => match schemas.next() {
                Some(first) => schemas.fold(first.clone(), |acc, s| acc.union(s)),
                None => VarSchema::new(),
            },
        }
    }

    pub fn annotations_mut(&mut self, id: NodeId) -> &mut Annotations {
        &mut self.nodes[id.get() as usize].annotations
    }

    pub fn annotate(&mut self, id: NodeId, key: &str, value: impl Into<serde_json::Value>) {
        self.annotations_mut(id).set(key, value);
    }

    /// Replace the children of an internal node; the schema is re-derived.
    pub fn set_children(&mut self, id: NodeId, children: Vec<NodeId>) -> Result<()> {
        let op = self.try_node(id)?.op.clone();
        self.check_children(&op, &children)?;
        let schema = self.derive_schema(&op, &children);
        let node = &mut self.nodes[id.get() as usize];
        node.children = children;
        node.schema = schema;
        Ok(())
    }

    /// Clone the subtree rooted at `id` into fresh handles, recording each
    /// `(original, copy)` pair.
    fn deep_copy_mapped(&mut self, id: NodeId, mapping: &mut Vec<(NodeId, NodeId)>) -> NodeId {
        let original = self.node(id).clone();
        let children = original
            .children
            .iter()
            .map(|c| self.deep_copy_mapped(*c, mapping))
            .collect();
        let copy = self.push(OpNode {
            children,
            ..original
        });
        mapping.push((id, copy));
        copy
    }

    /// Copy-on-write: duplicate every node reachable through more than one
    /// path so the structure under `root` becomes a proper tree. Returns
    /// `(original, copy)` pairs. The structure must be acyclic.
    pub fn unshare(&mut self, root: NodeId) -> Vec<(NodeId, NodeId)> {
        let mut seen = BTreeSet::from([root]);
        let mut copies = Vec::new();
        self.unshare_rec(root, &mut seen, &mut copies);
        copies
    }

    fn unshare_rec(
        &mut self,
        id: NodeId,
        seen: &mut BTreeSet<NodeId>,
        copies: &mut Vec<(NodeId, NodeId)>,
    ) {
        let children = self.node(id).children.clone();
        let mut changed = false;
        let mut next = Vec::with_capacity(children.len());
        for child in children {
            if seen.insert(child) {
                self.unshare_rec(child, seen, copies);
                next.push(child);
            } else {
                next.push(self.deep_copy_mapped(child, copies));
                changed = true;
            }
        }
        if changed {
            // Copies are structurally equal, so the schema stays valid.
            self.nodes[id.get() as usize].children = next;
        }
    }

    /// Distinct reachable nodes, children before parents.
    pub fn postorder(&self, root: NodeId) -> Vec<NodeId> {
        fn walk(arena: &OpArena, id: NodeId, seen: &mut BTreeSet<NodeId>, out: &mut Vec<NodeId>) {
            if !seen.insert(id) {
                return;
            }
            for c in arena.node(id).children() {
                walk(arena, *c, seen, out);
            }
            out.push(id);
        }
        let mut out = Vec::new();
        walk(self, root, &mut BTreeSet::new(), &mut out);
        out
    }

    pub fn reachable(&self, root: NodeId) -> BTreeSet<NodeId> {
        self.postorder(root).into_iter().collect()
    }

    /// Number of parent edges pointing at each reachable node (root: 0).
    pub fn ref_counts(&self, root: NodeId) -> BTreeMap<NodeId, usize> {
        let mut counts: BTreeMap<NodeId, usize> = BTreeMap::new();
        for id in self.postorder(root) {
            counts.entry(id).or_insert(0);
            for c in self.node(id).children() {
                *counts.entry(*c).or_insert(0) += 1;
            }
        }
        counts
    }

    /// Zero-child nodes in left-to-right order, counted once per path.
    pub fn leaves(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let node = self.node(id);
            if node.children.is_empty() {
                out.push(id);
            } else {
                stack.extend(node.children.iter().rev());
            }
        }
        out
    }

    pub fn count_kind(&self, root: NodeId, kind: OpKind) -> usize {
        self.postorder(root)
            .into_iter()
            .filter(|id| self.node(*id).kind() == kind)
            .count()
    }

    pub fn check_acyclic(&self, root: NodeId) -> Result<()> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Active,
            Done,
        }
        fn visit(arena: &OpArena, id: NodeId, marks: &mut BTreeMap<NodeId, Mark>) -> Result<()> {
            match marks.get(&id) {
                Some(Mark::Done) => return Ok(()),
                Some(Mark::Active) => {
                    return Err(Error::Invariant(format!("cycle through node {id}")))
                }
                None => {}
            }
            marks.insert(id, Mark::Active);
            for c in arena.try_node(id)?.children() {
                visit(arena, *c, marks)?;
            }
            marks.insert(id, Mark::Done);
            Ok(())
        }
        visit(self, root, &mut BTreeMap::new())
    }

    /// Acyclic and every reachable node has exactly one parent.
    pub fn check_tree(&self, root: NodeId) -> Result<()> {
        self.check_acyclic(root)?;
        if let Some((id, n)) = self.ref_counts(root).into_iter().find(|(_, n)| *n > 1) {
            return Err(Error::Invariant(format!(
                "node {id} is referenced by {n} parents"
            )));
        }
        Ok(())
    }

    /// Structural equality across (possibly different) arenas; annotations are
    /// ignored.
    pub fn structurally_equal(&self, a: NodeId, other: &OpArena, b: NodeId) -> bool {
        let (na, nb) = (self.node(a), other.node(b));
        na.op == nb.op
            && na.schema == nb.schema
            && na.children.len() == nb.children.len()
            && na
                .children
                .iter()
                .zip(nb.children.iter())
                .all(|(ca, cb)| self.structurally_equal(*ca, other, *cb))
    }

    /// Compact textual form, e.g. `JOIN(JOIN(L1,L2),L3)`.
    pub fn render(&self, root: NodeId) -> String {
        let mut out = String::new();
        self.render_into(root, &mut out);
        out
    }

    fn render_into(&self, id: NodeId, out: &mut String) {
        let node = self.node(id);
        match &node.op {
            Op::Query { endpoint, .. } => match node.label() {
                Some(label) => out.push_str(label),
                None => {
                    let _ = write!(out, "Q{}@{}", id.get(), endpoint.get());
                }
            },
            Op::Empty => out.push_str("EMPTY"),
            op => {
                out.push_str(op.kind().name());
                out.push('(');
                for (i, c) in node.children.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    self.render_into(*c, out);
                }
                out.push(')');
            }
        }
    }

    /// Multi-line explain output with schemas and annotations.
    pub fn explain(&self, root: NodeId) -> String {
        let mut out = String::new();
        self.explain_into(root, 0, &mut out);
        out
    }

    fn explain_into(&self, id: NodeId, depth: usize, out: &mut String) {
        let node = self.node(id);
        let _ = write!(out, "{}{} #{}", "  ".repeat(depth), node.kind().name(), id.get());
        if let Some((endpoint, fragment)) = node.query() {
            let _ = write!(out, " @{} {}", endpoint.get(), fragment);
        }
        let vars: Vec<String> = node.schema.names().into_iter().collect();
        let _ = write!(out, " [{}]", vars.join(","));
        for (k, v) in node.annotations.iter() {
            let _ = write!(out, " {k}={v}");
        }
        out.push('\n');
        for c in node.children() {
            self.explain_into(*c, depth + 1, out);
        }
    }
}

/// Node handles planner steps may annotate but never replace.
///
/// Keyed by handle identity: two structurally equal nodes are distinct entries.
/// Locks are never removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockedSet(BTreeSet<NodeId>);

impl LockedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock(&mut self, id: NodeId) {
        self.0.insert(id);
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.0.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.0.iter().copied()
    }
}

/// A planned operator DAG.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub arena: OpArena,
    pub root: NodeId,
    #[serde(default)]
    pub locked: LockedSet,
}

#[derive(Serialize)]
struct NodeSnapshot<'a> {
    op: &'a Op,
    children: Vec<usize>,
}

impl Plan {
    pub fn new(arena: OpArena, root: NodeId) -> Self {
        Self {
            arena,
            root,
            locked: LockedSet::new(),
        }
    }

    pub fn root_node(&self) -> &OpNode {
        self.arena.node(self.root)
    }

    pub fn render(&self) -> String {
        self.arena.render(self.root)
    }

    pub fn explain(&self) -> String {
        self.arena.explain(self.root)
    }

    pub fn leaves(&self) -> Vec<NodeId> {
        self.arena.leaves(self.root)
    }

    pub fn count_kind(&self, kind: OpKind) -> usize {
        self.arena.count_kind(self.root, kind)
    }

    /// Hash of the reachable structure, independent of handle numbering and
    /// of unreachable garbage in the arena.
    pub fn fingerprint(&self) -> Result<Hash256> {
        let order = self.arena.postorder(self.root);
        let position: BTreeMap<NodeId, usize> =
            order.iter().enumerate().map(|(i, id)| (*id, i)).collect();
        let snapshot: Vec<NodeSnapshot<'_>> = order
            .iter()
            .map(|id| {
                let node = self.arena.node(*id);
                NodeSnapshot {
                    op: &node.op,
                    children: node.children.iter().map(|c| position[c]).collect(),
                }
            })
            .collect();
        hash_serde(&snapshot)
    }
}
