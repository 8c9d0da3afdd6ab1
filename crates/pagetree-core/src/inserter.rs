//! # Inserter
//!
//! Creates a node under a chosen parent and derives its tree fields.

use crate::guard::{PermissionGuard, RequestContext};
use crate::primitives::{MAX_TITLE_LENGTH, MAX_TREE_DEPTH};
use crate::store::NodeStore;
use crate::{Node, NodeDraft, NodeId, TreeError, path};
use tracing::info;

/// Validate the caller-supplied part of a node.
pub fn validate_draft(draft: &NodeDraft) -> Result<(), TreeError> {
    path::validate_slug(&draft.slug)?;
    if draft.node_type.trim().is_empty() {
        return Err(TreeError::InvalidNode("type must not be empty".to_string()));
    }
    if draft.title.len() > MAX_TITLE_LENGTH {
        return Err(TreeError::InvalidNode(format!(
            "title length {} exceeds maximum {} bytes",
            draft.title.len(),
            MAX_TITLE_LENGTH
        )));
    }
    Ok(())
}

/// Inserts nodes through a store, checking edit rights with a guard.
pub struct Inserter<'a> {
    store: &'a mut dyn NodeStore,
    guard: &'a dyn PermissionGuard,
}

impl<'a> Inserter<'a> {
    pub fn new(store: &'a mut dyn NodeStore, guard: &'a dyn PermissionGuard) -> Self {
        Self { store, guard }
    }

    /// Create a node as the last child of `parent_id`.
    ///
    /// The new node gets `path = parent.path + slug`, `level = parent.level + 1`,
    /// `rank = number of existing children`, and inherits the parent's trash
    /// state. Returns the stored record.
    pub fn insert(
        &mut self,
        ctx: &RequestContext,
        parent_id: NodeId,
        draft: NodeDraft,
    ) -> Result<Node, TreeError> {
        let parent = self
            .store
            .get(parent_id)?
            .ok_or_else(|| TreeError::NotFound(format!("parent {}", parent_id)))?;

        if !self.guard.can_edit(ctx, &parent) {
            return Err(TreeError::PermissionDenied(format!(
                "cannot add children to '{}'",
                parent.path
            )));
        }

        validate_draft(&draft)?;

        let level = parent.level.saturating_add(1);
        if level > MAX_TREE_DEPTH {
            return Err(TreeError::InvalidNode(format!(
                "depth {} exceeds maximum {}",
                level, MAX_TREE_DEPTH
            )));
        }

        let siblings = self.store.children(&parent.path)?;
        if siblings.iter().any(|s| s.slug == draft.slug) {
            return Err(TreeError::SlugConflict {
                parent_path: parent.path,
                slug: draft.slug,
            });
        }

        let rank = u32::try_from(siblings.len())
            .map_err(|_| TreeError::InvalidNode("too many siblings".to_string()))?;
        let id = self.store.allocate_id()?;

        let node = Node {
            id,
            path: path::join(&parent.path, &draft.slug),
            slug: draft.slug,
            level,
            rank,
            node_type: draft.node_type,
            title: draft.title,
            fields: draft.fields,
            published: draft.published,
            trash: parent.trash,
            parked: false,
        };

        self.store.upsert_many(std::slice::from_ref(&node))?;
        info!(id = %node.id, path = %node.path, rank = node.rank, "node inserted");
        Ok(node)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guard::RoleGuard;
    use crate::store::MemoryStore;
    use crate::store::tests::node;

    fn sample_store() -> MemoryStore {
        let mut trash = node(2, "/trash", 1);
        trash.trash = true;
        trash.published = false;
        MemoryStore::from_nodes([
            node(1, "/", 0),
            trash,
            node(1234, "/parent", 0),
            node(2341, "/parent/child", 0),
            node(4321, "/parent/sibling", 1),
        ])
    }

    #[test]
    fn insert_appends_last() {
        let mut store = sample_store();
        let ctx = RequestContext::admin("editor");
        let node = Inserter::new(&mut store, &RoleGuard)
            .insert(&ctx, NodeId(1234), NodeDraft::new("new-page"))
            .expect("insert");
        assert_eq!(node.path, "/parent/new-page");
        assert_eq!(node.level, 2);
        assert_eq!(node.rank, 2);
        assert!(!node.parked);
        assert_eq!(
            store.get_by_path("/parent/new-page").expect("get").map(|n| n.id),
            Some(node.id)
        );
    }

    #[test]
    fn insert_into_empty_parent_gets_rank_zero() {
        let mut store = sample_store();
        let ctx = RequestContext::admin("editor");
        let node = Inserter::new(&mut store, &RoleGuard)
            .insert(&ctx, NodeId(2341), NodeDraft::new("leaf"))
            .expect("insert");
        assert_eq!(node.rank, 0);
        assert_eq!(node.level, 3);
    }

    #[test]
    fn insert_under_trash_inherits_trash() {
        let mut store = sample_store();
        let ctx = RequestContext::admin("editor");
        let node = Inserter::new(&mut store, &RoleGuard)
            .insert(&ctx, NodeId(2), NodeDraft::new("old"))
            .expect("insert");
        assert!(node.trash);
        assert_eq!(node.path, "/trash/old");
    }

    #[test]
    fn missing_parent_is_not_found() {
        let mut store = sample_store();
        let ctx = RequestContext::admin("editor");
        let err = Inserter::new(&mut store, &RoleGuard)
            .insert(&ctx, NodeId(999), NodeDraft::new("x"))
            .expect_err("missing parent");
        assert!(matches!(err, TreeError::NotFound(_)));
    }

    #[test]
    fn anonymous_insert_denied() {
        let mut store = sample_store();
        let before = store.len().expect("len");
        let err = Inserter::new(&mut store, &RoleGuard)
            .insert(&RequestContext::anonymous(), NodeId(1234), NodeDraft::new("x"))
            .expect_err("denied");
        assert!(matches!(err, TreeError::PermissionDenied(_)));
        assert_eq!(store.len().expect("len"), before);
    }

    #[test]
    fn duplicate_slug_fails_hard() {
        let mut store = sample_store();
        let ctx = RequestContext::admin("editor");
        let err = Inserter::new(&mut store, &RoleGuard)
            .insert(&ctx, NodeId(1234), NodeDraft::new("child"))
            .expect_err("conflict");
        assert!(matches!(err, TreeError::SlugConflict { .. }));
    }

    #[test]
    fn bad_drafts_rejected() {
        assert!(validate_draft(&NodeDraft::new("ok")).is_ok());
        assert!(validate_draft(&NodeDraft::new("a/b")).is_err());
        assert!(validate_draft(&NodeDraft::new("x").node_type(" ")).is_err());
        assert!(validate_draft(&NodeDraft::new("x").title("t".repeat(MAX_TITLE_LENGTH + 1))).is_err());
    }
}
