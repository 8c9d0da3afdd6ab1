//! # Scenario Tests (T0-T3)
//!
//! A small site exercised end to end through the public API.
//!
//! ## Tiers
//! - T0: Parked fixtures
//! - T1: Query cursor
//! - T2: Insert
//! - T3: Move and trash

use pagetree_core::{
    Ancestors, Filter, MemoryStore, Node, NodeDraft, NodeId, NodeStore, Position, RequestContext,
    Session, TreeError,
};
use std::collections::BTreeMap;

fn page(id: u64, slug: &str, path: &str, level: u32, rank: u32) -> Node {
    Node {
        id: NodeId(id),
        slug: slug.to_string(),
        path: path.to_string(),
        level,
        rank,
        node_type: "testPage".to_string(),
        title: slug.to_string(),
        fields: BTreeMap::new(),
        published: true,
        trash: false,
        parked: false,
    }
}

/// root, parent (child, sibling (cousin)), another-parent, trash
fn site() -> Session {
    let mut root = page(1, "/", "/", 0, 0);
    root.node_type = "home".to_string();
    root.parked = true;
    let mut trash = page(2, "trash", "/trash", 1, 2);
    trash.node_type = "trash".to_string();
    trash.published = false;
    trash.trash = true;
    trash.parked = true;

    Session::with_store(MemoryStore::from_nodes([
        root,
        trash,
        page(1234, "parent", "/parent", 1, 0),
        page(2341, "child", "/parent/child", 2, 0),
        page(4321, "sibling", "/parent/sibling", 2, 1),
        page(4312, "cousin", "/parent/sibling/cousin", 3, 0),
        page(4333, "another-parent", "/another-parent", 1, 1),
    ]))
}

fn admin() -> RequestContext {
    RequestContext::admin("admin")
}

fn fetch(session: &Session, id: u64) -> Node {
    session
        .store()
        .get(NodeId(id))
        .expect("get")
        .expect("node exists")
}

// =============================================================================
// TIER T0: PARKED FIXTURES
// =============================================================================

mod t0_parked_fixtures {
    use super::*;

    /// T0.1: The home page is found anonymously by its slug.
    #[test]
    fn home_page_found_by_slash() {
        let session = site();
        let anon = RequestContext::anonymous();
        let home = session
            .find(&anon)
            .slug("/")
            .to_object()
            .expect("query")
            .expect("home page");
        assert_eq!(home.node.path, "/");
        assert_eq!(home.node.node_type, "home");
        assert!(home.node.parked);
        assert!(home.node.published);
    }

    /// T0.2: The trash can needs an admin plus both lifecycle filters.
    #[test]
    fn trash_can_needs_explicit_filters() {
        let session = site();
        let anon = RequestContext::anonymous();
        let hidden = session
            .find(&anon)
            .path("/trash")
            .published(Filter::Any)
            .trash(Filter::Any)
            .to_object()
            .expect("query");
        assert!(hidden.is_none());

        let ctx = admin();
        let trash = session
            .find(&ctx)
            .path("/trash")
            .published(Filter::Any)
            .trash(Filter::Any)
            .to_object()
            .expect("query")
            .expect("trash can");
        assert_eq!(trash.node.node_type, "trash");
        assert!(trash.node.parked);
    }

    /// T0.3: Parked nodes refuse to move.
    #[test]
    fn parked_nodes_refuse_to_move() {
        let mut session = site();
        let err = session
            .move_node(&admin(), NodeId(2), NodeId(4333), Position::Inside)
            .expect_err("parked");
        assert!(matches!(err, TreeError::CannotMoveParked(_)));
    }
}

// =============================================================================
// TIER T1: QUERY CURSOR
// =============================================================================

mod t1_cursor {
    use super::*;

    /// T1.1: Ancestors come back root first.
    #[test]
    fn ancestors_root_first() {
        let session = site();
        let anon = RequestContext::anonymous();
        let child = session
            .find(&anon)
            .slug("child")
            .ancestors(Ancestors::All)
            .to_object()
            .expect("query")
            .expect("child");
        let paths: Vec<&str> = child.ancestors.iter().map(|a| a.node.path.as_str()).collect();
        assert_eq!(paths, vec!["/", "/parent"]);
    }

    /// T1.2: A depth keeps only the nearest ancestors.
    #[test]
    fn ancestors_depth_one() {
        let session = site();
        let anon = RequestContext::anonymous();
        let child = session
            .find(&anon)
            .slug("child")
            .ancestors(Ancestors::Depth(1))
            .to_object()
            .expect("query")
            .expect("child");
        assert_eq!(child.ancestors.len(), 1);
        assert_eq!(child.ancestors[0].node.path, "/parent");
    }

    /// T1.3: Ancestor children are attached in rank order.
    #[test]
    fn ancestor_children_in_rank_order() {
        let session = site();
        let anon = RequestContext::anonymous();
        let child = session
            .find(&anon)
            .slug("child")
            .ancestors(Ancestors::All)
            .ancestors_children(true)
            .to_object()
            .expect("query")
            .expect("child");
        let parent = &child.ancestors[1];
        let paths: Vec<&str> = parent.children.iter().map(|c| c.path.as_str()).collect();
        assert_eq!(paths, vec!["/parent/child", "/parent/sibling"]);
    }

    /// T1.4: Unknown slugs give an empty result, not an error.
    #[test]
    fn unknown_slug_is_none() {
        let session = site();
        let anon = RequestContext::anonymous();
        let result = session
            .find(&anon)
            .slug("nobodyschild")
            .to_object()
            .expect("query");
        assert!(result.is_none());
    }

    /// T1.5: Plural queries come back ordered and countable.
    #[test]
    fn plural_query_by_type() {
        let session = site();
        let anon = RequestContext::anonymous();
        let cursor = session.find(&anon).field("type", "testPage");
        assert_eq!(cursor.count().expect("count"), 5);
        let first = &cursor.to_vec().expect("query")[0];
        assert_eq!(first.node.path, "/parent");
    }
}

// =============================================================================
// TIER T2: INSERT
// =============================================================================

mod t2_insert {
    use super::*;

    /// T2.1: A new page lands after the existing children.
    #[test]
    fn insert_appends_after_two_children() {
        let mut session = site();
        let node = session
            .insert(&admin(), NodeId(1234), NodeDraft::new("new-page"))
            .expect("insert");
        assert_eq!(node.rank, 2);
        assert_eq!(node.path, "/parent/new-page");
        assert_eq!(node.level, 2);
        assert!(session.verify().expect("verify").is_empty());
    }

    /// T2.2: Sibling slugs are unique.
    #[test]
    fn duplicate_slug_rejected() {
        let mut session = site();
        let err = session
            .insert(&admin(), NodeId(1234), NodeDraft::new("sibling"))
            .expect_err("conflict");
        assert!(matches!(err, TreeError::SlugConflict { .. }));
    }

    /// T2.3: Visitors cannot insert.
    #[test]
    fn anonymous_insert_denied() {
        let mut session = site();
        let err = session
            .insert(
                &RequestContext::anonymous(),
                NodeId(1234),
                NodeDraft::new("x"),
            )
            .expect_err("denied");
        assert!(matches!(err, TreeError::PermissionDenied(_)));
    }
}

// =============================================================================
// TIER T3: MOVE AND TRASH
// =============================================================================

mod t3_move {
    use super::*;

    /// T3.1: After a top-level node.
    #[test]
    fn cousin_after_parent() {
        let mut session = site();
        let moved = session
            .move_node(&admin(), NodeId(4312), NodeId(1234), Position::After)
            .expect("move");
        assert_eq!(moved.path, "/cousin");
        assert_eq!(moved.level, 1);
        assert_eq!(moved.rank, 1);
        assert!(session.verify().expect("verify").is_empty());
    }

    /// T3.2: Before a deeper node.
    #[test]
    fn cousin_before_child() {
        let mut session = site();
        let moved = session
            .move_node(&admin(), NodeId(4312), NodeId(2341), Position::Before)
            .expect("move");
        assert_eq!(moved.path, "/parent/cousin");
        assert_eq!(moved.level, 2);
        assert_eq!(moved.rank, 0);
        assert_eq!(fetch(&session, 2341).rank, 1);
        assert!(session.verify().expect("verify").is_empty());
    }

    /// T3.3: Back inside its original parent.
    #[test]
    fn cousin_back_inside_sibling() {
        let mut session = site();
        session
            .move_node(&admin(), NodeId(4312), NodeId(1234), Position::After)
            .expect("move out");
        let moved = session
            .move_node(&admin(), NodeId(4312), NodeId(4321), Position::Inside)
            .expect("move back");
        assert_eq!(moved.path, "/parent/sibling/cousin");
        assert_eq!(moved.level, 3);
        assert_eq!(moved.rank, 0);
        assert!(session.verify().expect("verify").is_empty());
    }

    /// T3.4: A whole subtree follows its root.
    #[test]
    fn parent_inside_another_parent() {
        let mut session = site();
        session
            .move_node(&admin(), NodeId(1234), NodeId(4333), Position::Inside)
            .expect("move");
        assert_eq!(fetch(&session, 1234).path, "/another-parent/parent");
        let sibling = fetch(&session, 4321);
        assert_eq!(sibling.path, "/another-parent/parent/sibling");
        assert_eq!(sibling.level, 3);
        assert_eq!(fetch(&session, 4312).level, 4);
        assert!(session.verify().expect("verify").is_empty());
    }

    /// T3.5: Cycles are refused and nothing changes.
    #[test]
    fn cyclic_move_leaves_tree_unchanged() {
        let mut session = site();
        let before = session.snapshot().expect("snapshot");
        let err = session
            .move_node(&admin(), NodeId(1234), NodeId(4321), Position::Inside)
            .expect_err("cyclic");
        assert!(matches!(err, TreeError::CyclicMove { .. }));
        assert_eq!(session.snapshot().expect("snapshot"), before);
    }

    /// T3.6: Trashing hides the subtree; restoring brings it back.
    #[test]
    fn trash_and_restore() {
        let mut session = site();
        let trashed = session.trash(&admin(), NodeId(4321)).expect("trash");
        assert_eq!(trashed.path, "/trash/sibling");
        assert!(fetch(&session, 4312).trash);

        let anon = RequestContext::anonymous();
        assert!(session
            .find(&anon)
            .slug("cousin")
            .to_object()
            .expect("query")
            .is_none());

        let ctx = admin();
        let in_trash = session
            .find(&ctx)
            .slug("cousin")
            .trash(Filter::Only(true))
            .ancestors(Ancestors::All)
            .to_object()
            .expect("query")
            .expect("trashed cousin");
        // The trash container is unpublished, so the default filter hides it.
        let paths: Vec<&str> = in_trash.ancestors.iter().map(|a| a.node.path.as_str()).collect();
        assert_eq!(paths, vec!["/", "/trash/sibling"]);

        session
            .move_node(&admin(), NodeId(4321), NodeId(2341), Position::After)
            .expect("restore");
        assert!(!fetch(&session, 4312).trash);
        assert_eq!(fetch(&session, 4312).path, "/parent/sibling/cousin");
        assert!(session.verify().expect("verify").is_empty());
    }

    /// T3.7: Same-named pages from different parents can all be trashed.
    #[test]
    fn trash_renames_on_slug_collision() {
        let mut session = site();
        let first = session
            .insert(&admin(), NodeId(1234), NodeDraft::new("news"))
            .expect("insert /parent/news");
        let second = session
            .insert(&admin(), NodeId(4333), NodeDraft::new("news"))
            .expect("insert /another-parent/news");
        let below = session
            .insert(&admin(), second.id, NodeDraft::new("2026"))
            .expect("insert below");

        let trashed = session.trash(&admin(), first.id).expect("first trash");
        assert_eq!(trashed.path, "/trash/news");

        let trashed = session.trash(&admin(), second.id).expect("second trash");
        assert_eq!(trashed.slug, "news-1");
        assert_eq!(trashed.path, "/trash/news-1");
        assert_eq!(trashed.rank, 1);
        let below = fetch(&session, below.id.0);
        assert_eq!(below.path, "/trash/news-1/2026");
        assert!(below.trash);
        assert!(session.verify().expect("verify").is_empty());
    }

    /// T3.8: Outside the trash a slug collision still fails.
    #[test]
    fn move_slug_collision_outside_trash() {
        let mut session = site();
        session
            .insert(&admin(), NodeId(4333), NodeDraft::new("child"))
            .expect("insert");
        let err = session
            .move_node(&admin(), NodeId(2341), NodeId(4333), Position::Inside)
            .expect_err("conflict");
        assert!(matches!(err, TreeError::SlugConflict { .. }));
    }
}
