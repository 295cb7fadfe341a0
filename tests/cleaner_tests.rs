//! Equivalence cleaning: structural sharing, idempotence, and the no-op
//! cleaner.

mod support;

use fedplan_core::config::FederationConfig;
use fedplan_core::context::QueryContext;
use fedplan_core::dag::{LockedSet, OpArena};
use fedplan_core::id::{EndpointId, NodeId};
use fedplan_planner::{
    DefaultEquivCleaner, EquivCleaner, NoEquivCleaner, OpComparator, Planner,
    StructuralComparator,
};
use std::cmp::Ordering;
use support::{catalog, endpoint_with, fragment, leaf, no_joins};

/// JOIN(UNION(a, b), UNION(a', b')) where primed leaves are distinct copies.
fn duplicated_unions(arena: &mut OpArena) -> NodeId {
    let unit = |arena: &mut OpArena| {
        let a = arena
            .add_query(EndpointId::new(1), fragment(&["?x <http://ex/p1> ?y"]))
            .expect("leaf");
        let b = arena
            .add_query(EndpointId::new(2), fragment(&["?x <http://ex/p1> ?y"]))
            .expect("leaf");
        arena.add_union(vec![a, b]).expect("union")
    };
    let left = unit(arena);
    let right = unit(arena);
    arena.add_join(vec![left, right]).expect("join")
}

#[test]
fn test_scenario_c_identical_leaves_collapse_to_one_shared_node() {
    let planner = Planner::new(
        catalog([endpoint_with(1, "a", no_joins())]),
        FederationConfig::default(),
    );
    let bindings = vec![
        leaf(1, "L1", &["?x <http://ex/p1> ?y"]),
        leaf(1, "L1", &["?x <http://ex/p1> ?y"]),
    ];
    let plan = planner
        .plan(&bindings, &mut QueryContext::new())
        .expect("plan");

    let children = plan.root_node().children();
    assert_eq!(children.len(), 2);
    assert_eq!(children[0], children[1]);
    let counts = plan.arena.ref_counts(plan.root);
    assert_eq!(counts[&children[0]], 2);
    assert_eq!(plan.render(), "JOIN(L1,L1)");
    plan.arena.check_acyclic(plan.root).expect("dag");
}

#[test]
fn test_cleaning_shares_whole_subtrees() {
    let mut arena = OpArena::new();
    let root = duplicated_unions(&mut arena);
    let root = DefaultEquivCleaner
        .clean(&mut arena, root, &StructuralComparator, &LockedSet::new())
        .expect("clean");

    let children = arena.node(root).children();
    assert_eq!(children[0], children[1]);
    // One union and its two leaves survive.
    assert_eq!(arena.reachable(root).len(), 4);
}

#[test]
fn test_cleaning_is_idempotent() {
    let mut arena = OpArena::new();
    let root = duplicated_unions(&mut arena);
    let once = DefaultEquivCleaner
        .clean(&mut arena, root, &StructuralComparator, &LockedSet::new())
        .expect("clean");
    let snapshot = arena.clone();
    let twice = DefaultEquivCleaner
        .clean(&mut arena, once, &StructuralComparator, &LockedSet::new())
        .expect("clean again");

    assert_eq!(once, twice);
    assert!(snapshot.structurally_equal(once, &arena, twice));
    assert_eq!(snapshot.ref_counts(once), arena.ref_counts(twice));
}

#[test]
fn test_noop_cleaner_returns_input_unchanged() {
    let mut arena = OpArena::new();
    let root = duplicated_unions(&mut arena);
    let before = arena.clone();
    let out = NoEquivCleaner
        .clean(&mut arena, root, &StructuralComparator, &LockedSet::new())
        .expect("noop");

    assert_eq!(out, root);
    assert!(before.structurally_equal(root, &arena, out));
    assert_eq!(before.ref_counts(root), arena.ref_counts(out));
}

#[test]
fn test_locked_duplicates_stay_distinct() {
    for lock_first in [true, false] {
        let mut arena = OpArena::new();
        let a = arena
            .add_query(EndpointId::new(1), fragment(&["?x <http://ex/p1> ?y"]))
            .expect("leaf");
        let b = arena
            .add_query(EndpointId::new(1), fragment(&["?x <http://ex/p1> ?y"]))
            .expect("leaf");
        let root = arena.add_join(vec![a, b]).expect("join");
        let mut locked = LockedSet::new();
        locked.lock(if lock_first { a } else { b });

        let root = DefaultEquivCleaner
            .clean(&mut arena, root, &StructuralComparator, &locked)
            .expect("clean");
        assert_eq!(arena.node(root).children(), &[a, b], "lock_first={lock_first}");
        arena.check_tree(root).expect("no node shared");
    }
}

#[test]
fn test_subtrees_above_locked_nodes_are_not_shared() {
    let mut arena = OpArena::new();
    let root = duplicated_unions(&mut arena);
    let left = arena.node(root).children()[0];
    let locked_leaf = arena.node(left).children()[0];
    let mut locked = LockedSet::new();
    locked.lock(locked_leaf);

    let root = DefaultEquivCleaner
        .clean(&mut arena, root, &StructuralComparator, &locked)
        .expect("clean");
    let children = arena.node(root).children();
    assert_eq!(children[0], left);
    assert_ne!(children[0], children[1]);
    assert_eq!(arena.ref_counts(root)[&locked_leaf], 1);
    // Unlocked duplicates still collapse: both unions share the endpoint-2 leaf.
    let right = children[1];
    assert_eq!(arena.node(right).children()[1], arena.node(left).children()[1]);
    assert_eq!(arena.reachable(root).len(), 6);
}

#[test]
fn test_structural_comparator_ignores_annotations_only() {
    let mut arena = OpArena::new();
    let a = arena
        .add_query(EndpointId::new(1), fragment(&["?x <http://ex/p1> ?y"]))
        .expect("leaf");
    let b = arena
        .add_query(EndpointId::new(1), fragment(&["?x <http://ex/p1> ?y"]))
        .expect("leaf");
    let c = arena
        .add_query(EndpointId::new(2), fragment(&["?x <http://ex/p1> ?y"]))
        .expect("leaf");
    arena.annotate(a, "label", "first");

    let cmp = StructuralComparator;
    assert_eq!(cmp.compare(&arena, a, b), Ordering::Equal);
    assert_ne!(cmp.compare(&arena, a, c), Ordering::Equal);
    assert_eq!(
        cmp.compare(&arena, a, c),
        cmp.compare(&arena, c, a).reverse()
    );
}
