//! # Property-Based Tests
//!
//! Random insert/move sequences must keep the tree invariants intact.

use pagetree_core::integrity::verify;
use pagetree_core::path;
use pagetree_core::{NodeDraft, NodeId, NodeStore, Position, RequestContext, Session, TreeError};
use proptest::collection::vec;
use proptest::prelude::*;

fn admin() -> RequestContext {
    RequestContext::admin("admin")
}

/// A parked session with `count` pages inserted under pseudo-random parents.
fn grow(parents: &[usize]) -> (Session, Vec<NodeId>) {
    let mut session = Session::new();
    session.park(&[]).expect("park");
    let root = session
        .store()
        .get_by_path("/")
        .expect("get")
        .map(|n| n.id)
        .expect("root");

    let mut ids = vec![root];
    for (i, pick) in parents.iter().enumerate() {
        let parent = ids[pick % ids.len()];
        let node = session
            .insert(&admin(), parent, NodeDraft::new(format!("p{}", i)))
            .expect("insert");
        ids.push(node.id);
    }
    (session, ids)
}

fn position(code: u8) -> Position {
    match code % 3 {
        0 => Position::Before,
        1 => Position::After,
        _ => Position::Inside,
    }
}

// =============================================================================
// PROPERTY TESTS
// =============================================================================

proptest! {
    /// Levels match paths and sibling ranks stay gapless after any inserts.
    #[test]
    fn inserts_keep_invariants(parents in vec(0usize..64, 1..40)) {
        let (session, _) = grow(&parents);
        prop_assert!(verify(session.store()).expect("verify").is_empty());
    }

    /// Any sequence of moves, accepted or refused, keeps the invariants.
    #[test]
    fn moves_keep_invariants(
        parents in vec(0usize..64, 2..30),
        moves in vec((0usize..64, 0usize..64, 0u8..3), 1..20)
    ) {
        let (mut session, ids) = grow(&parents);
        for (a, b, p) in moves {
            let node = ids[a % ids.len()];
            let target = ids[b % ids.len()];
            let before = session.snapshot().expect("snapshot");
            match session.move_node(&admin(), node, target, position(p)) {
                Ok(moved) => {
                    prop_assert_eq!(moved.level, path::level_of(&moved.path));
                }
                Err(e) => {
                    // Refused moves leave no trace.
                    prop_assert!(e.is_validation(), "{}", e);
                    prop_assert_eq!(session.snapshot().expect("snapshot"), before);
                }
            }
            prop_assert!(verify(session.store()).expect("verify").is_empty());
        }
    }

    /// Moving inside the same target twice equals moving once.
    #[test]
    fn inside_move_is_idempotent(
        parents in vec(0usize..64, 2..30),
        a in 1usize..64,
        b in 0usize..64
    ) {
        let (mut session, ids) = grow(&parents);
        let node = ids[1 + a % (ids.len() - 1)];
        let target = ids[b % ids.len()];
        if session.move_node(&admin(), node, target, Position::Inside).is_ok() {
            let once = session.snapshot().expect("snapshot");
            session
                .move_node(&admin(), node, target, Position::Inside)
                .expect("second move");
            prop_assert_eq!(session.snapshot().expect("snapshot"), once);
        }
    }

    /// Every former descendant is re-prefixed under the new location.
    #[test]
    fn subtree_follows_moved_root(
        parents in vec(0usize..64, 2..30),
        a in 1usize..64,
        b in 0usize..64
    ) {
        let (mut session, ids) = grow(&parents);
        let node_id = ids[1 + a % (ids.len() - 1)];
        let target_id = ids[b % ids.len()];
        let node = session.store().get(node_id).expect("get").expect("node");
        let descendants: Vec<NodeId> = session
            .store()
            .scan_subtree(&node.path)
            .expect("scan")
            .into_iter()
            .map(|n| n.id)
            .collect();

        match session.move_node(&admin(), node_id, target_id, Position::Inside) {
            Ok(moved) => {
                for id in descendants {
                    let d = session.store().get(id).expect("get").expect("descendant");
                    prop_assert!(path::is_within(&d.path, &moved.path));
                }
            }
            Err(TreeError::CyclicMove { .. }) => {
                prop_assert!(descendants.contains(&target_id));
            }
            Err(e) => prop_assert!(e.is_validation(), "{}", e),
        }
    }

    /// A subtree scan returns exactly the nodes under the prefix.
    #[test]
    fn scan_matches_prefix(parents in vec(0usize..64, 1..40), pick in 0usize..64) {
        let (session, ids) = grow(&parents);
        let root = session.store().get(ids[pick % ids.len()]).expect("get").expect("node");
        let all = session.store().scan_subtree("/").expect("scan");
        let scanned = session.store().scan_subtree(&root.path).expect("scan");
        let expected = all.iter().filter(|n| path::is_within(&n.path, &root.path)).count();
        prop_assert_eq!(scanned.len(), expected);
    }
}
