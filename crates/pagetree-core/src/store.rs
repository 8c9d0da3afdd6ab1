//! # Node Store
//!
//! The document collection underneath the tree.
//!
//! This module defines the `NodeStore` trait and its in-memory
//! implementation. All structures use `BTreeMap` so that scans come back in
//! a deterministic order.

use crate::path;
use crate::primitives::SEPARATOR;
use crate::{Node, NodeId, TreeError};
use std::collections::BTreeMap;
use std::ops::Bound;

// =============================================================================
// NODESTORE TRAIT
// =============================================================================

/// The NodeStore trait defines the storage operations the engine needs.
///
/// Stores provide no locking. Callers serialize conflicting writes.
///
/// All fallible operations return `Result<T, TreeError>` to support both
/// in-memory and persistent storage backends uniformly.
pub trait NodeStore {
    /// Lookup a node by id.
    fn get(&self, id: NodeId) -> Result<Option<Node>, TreeError>;

    /// Lookup a node by its exact path.
    fn get_by_path(&self, path: &str) -> Result<Option<Node>, TreeError>;

    /// All nodes whose path equals `prefix` or starts with `prefix` + separator.
    ///
    /// This is a prefix query over the path index; its cost is proportional
    /// to the size of the subtree, not the depth of the tree.
    fn scan_subtree(&self, prefix: &str) -> Result<Vec<Node>, TreeError>;

    /// Immediate children of the node at `parent_path`, ordered by rank then path.
    ///
    /// The default filters a subtree scan by level, so it costs as much as
    /// `scan_subtree(parent_path)`. Stores with an ordered path index can
    /// skip grandchild branches instead (see `MemoryStore`).
    fn children(&self, parent_path: &str) -> Result<Vec<Node>, TreeError> {
        let child_level = path::level_of(parent_path).saturating_add(1);
        let mut children: Vec<Node> = self
            .scan_subtree(parent_path)?
            .into_iter()
            .filter(|n| n.level == child_level && n.path != parent_path)
            .collect();
        sort_by_rank(&mut children);
        Ok(children)
    }

    /// Write a batch of records, inserting or replacing by id.
    ///
    /// On per-record failure returns `TreeError::PartialFailure` listing the
    /// ids that were written and the ids that were not.
    fn upsert_many(&mut self, nodes: &[Node]) -> Result<(), TreeError>;

    /// Reserve a fresh node id.
    fn allocate_id(&mut self) -> Result<NodeId, TreeError>;

    /// Total number of stored nodes.
    fn len(&self) -> Result<usize, TreeError>;

    /// Whether the store holds no nodes at all.
    fn is_empty(&self) -> Result<bool, TreeError> {
        Ok(self.len()? == 0)
    }
}

/// Sort nodes into display order: rank, then path as tie-break.
pub fn sort_by_rank(nodes: &mut [Node]) {
    nodes.sort_by(|a, b| a.rank.cmp(&b.rank).then_with(|| a.path.cmp(&b.path)));
}

// =============================================================================
// MEMORY STORE
// =============================================================================

/// In-memory node store.
///
/// Batches are applied record by record. A record whose path already
/// belongs to a node outside the batch is rejected while the rest of the
/// batch still lands, which is the partial-failure mode the engine has to
/// surface.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    /// Node storage: NodeId -> Node
    nodes: BTreeMap<NodeId, Node>,

    /// Path index: path -> NodeId
    path_index: BTreeMap<String, NodeId>,

    /// Next available NodeId
    next_node_id: u64,
}

impl MemoryStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from existing records, preserving their ids.
    #[must_use]
    pub fn from_nodes(nodes: impl IntoIterator<Item = Node>) -> Self {
        let mut store = Self::new();
        for node in nodes {
            store.import_node(node);
        }
        store
    }

    /// Import a record as-is, bypassing batch validation.
    ///
    /// Used when rebuilding a store from a snapshot or a persistent backend.
    pub fn import_node(&mut self, node: Node) {
        self.bump_next_id(node.id);
        if let Some(old) = self.nodes.get(&node.id)
            && self.path_index.get(&old.path) == Some(&node.id)
        {
            self.path_index.remove(&old.path);
        }
        self.path_index.insert(node.path.clone(), node.id);
        self.nodes.insert(node.id, node);
    }

    /// All nodes in id order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Get the next node id that would be allocated.
    #[must_use]
    pub fn next_node_id(&self) -> u64 {
        self.next_node_id
    }

    /// Make sure future allocations start at `next` or later.
    pub fn reserve_ids(&mut self, next: u64) {
        self.next_node_id = self.next_node_id.max(next);
    }

    fn bump_next_id(&mut self, id: NodeId) {
        if id.0 >= self.next_node_id {
            self.next_node_id = id.0.saturating_add(1);
        }
    }
}

impl NodeStore for MemoryStore {
    fn get(&self, id: NodeId) -> Result<Option<Node>, TreeError> {
        Ok(self.nodes.get(&id).cloned())
    }

    fn get_by_path(&self, path: &str) -> Result<Option<Node>, TreeError> {
        Ok(self
            .path_index
            .get(path)
            .and_then(|id| self.nodes.get(id))
            .cloned())
    }

    fn scan_subtree(&self, prefix: &str) -> Result<Vec<Node>, TreeError> {
        let mut out = Vec::new();
        if let Some(root) = self.get_by_path(prefix)? {
            out.push(root);
        }
        let (lower, upper) = path::descendant_bounds(prefix);
        for (key, id) in self.path_index.range(lower..upper) {
            if key == prefix {
                continue;
            }
            if let Some(node) = self.nodes.get(id) {
                out.push(node.clone());
            }
        }
        Ok(out)
    }

    /// Walks the path index one child at a time, jumping over each
    /// child's descendant range.
    fn children(&self, parent_path: &str) -> Result<Vec<Node>, TreeError> {
        let (first, upper) = path::descendant_bounds(parent_path);
        let mut lower = Bound::Included(first.clone());
        let mut children = Vec::new();

        while let Some((key, id)) = self
            .path_index
            .range::<String, _>((lower.clone(), Bound::Excluded(upper.clone())))
            .next()
        {
            let rest = key.get(first.len()..).unwrap_or_default();
            lower = match rest.split_once(SEPARATOR) {
                Some((segment, _)) => {
                    Bound::Included(path::descendant_bounds(&path::join(parent_path, segment)).1)
                }
                None => {
                    if !rest.is_empty()
                        && let Some(node) = self.nodes.get(id)
                    {
                        children.push(node.clone());
                    }
                    Bound::Excluded(key.clone())
                }
            };
        }

        sort_by_rank(&mut children);
        Ok(children)
    }

    fn upsert_many(&mut self, nodes: &[Node]) -> Result<(), TreeError> {
        // Release the old index entries of every record that changes path, so
        // that records in the same batch can trade places.
        let mut released: BTreeMap<NodeId, String> = BTreeMap::new();
        for node in nodes {
            if let Some(old) = self.nodes.get(&node.id)
                && old.path != node.path
                && self.path_index.get(&old.path) == Some(&node.id)
            {
                self.path_index.remove(&old.path);
                released.insert(node.id, old.path.clone());
            }
        }

        let mut written = Vec::with_capacity(nodes.len());
        let mut failed = Vec::new();

        for node in nodes {
            match self.path_index.get(&node.path) {
                Some(owner) if *owner != node.id => {
                    failed.push((
                        node.id,
                        format!("path '{}' already belongs to node {}", node.path, owner),
                    ));
                }
                _ => {
                    self.path_index.insert(node.path.clone(), node.id);
                    self.nodes.insert(node.id, node.clone());
                    self.bump_next_id(node.id);
                    written.push(node.id);
                }
            }
        }

        if failed.is_empty() {
            return Ok(());
        }

        // Failed records keep their old version; put their index entry back.
        for (id, _) in &failed {
            if let Some(old_path) = released.get(id) {
                self.path_index.entry(old_path.clone()).or_insert(*id);
            }
        }

        Err(TreeError::PartialFailure { written, failed })
    }

    fn allocate_id(&mut self) -> Result<NodeId, TreeError> {
        let id = NodeId(self.next_node_id);
        self.next_node_id = self.next_node_id.saturating_add(1);
        Ok(id)
    }

    fn len(&self) -> Result<usize, TreeError> {
        Ok(self.nodes.len())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn node(id: u64, path: &str, rank: u32) -> Node {
        let slug = path::segments(path).last().unwrap_or("/").to_string();
        Node {
            id: NodeId(id),
            slug,
            path: path.to_string(),
            level: path::level_of(path),
            rank,
            node_type: "testPage".to_string(),
            title: path.to_string(),
            fields: BTreeMap::new(),
            published: true,
            trash: false,
            parked: false,
        }
    }

    fn sample_store() -> MemoryStore {
        MemoryStore::from_nodes([
            node(1, "/", 0),
            node(1234, "/parent", 0),
            node(2341, "/parent/child", 0),
            node(4321, "/parent/sibling", 1),
            node(4312, "/parent/sibling/cousin", 0),
            node(5000, "/parent-x", 1),
        ])
    }

    #[test]
    fn get_by_id_and_path() {
        let store = sample_store();
        assert_eq!(
            store.get(NodeId(2341)).expect("get").map(|n| n.path),
            Some("/parent/child".to_string())
        );
        assert_eq!(
            store.get_by_path("/parent/sibling").expect("get").map(|n| n.id),
            Some(NodeId(4321))
        );
        assert!(store.get(NodeId(9)).expect("get").is_none());
    }

    #[test]
    fn scan_subtree_is_prefix_bounded() {
        let store = sample_store();
        let mut ids: Vec<u64> = store
            .scan_subtree("/parent")
            .expect("scan")
            .iter()
            .map(|n| n.id.0)
            .collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![1234, 2341, 4312, 4321]);
    }

    #[test]
    fn scan_root_returns_everything_once() {
        let store = sample_store();
        assert_eq!(store.scan_subtree("/").expect("scan").len(), 6);
    }

    #[test]
    fn children_are_ranked() {
        let store = sample_store();
        let paths: Vec<String> = store
            .children("/parent")
            .expect("children")
            .into_iter()
            .map(|n| n.path)
            .collect();
        assert_eq!(paths, vec!["/parent/child", "/parent/sibling"]);

        let top: Vec<String> = store
            .children("/")
            .expect("children")
            .into_iter()
            .map(|n| n.path)
            .collect();
        assert_eq!(top, vec!["/parent", "/parent-x"]);
    }

    #[test]
    fn children_skip_grandchild_branches() {
        let store = MemoryStore::from_nodes([
            node(1, "/", 0),
            node(2, "/a", 0),
            node(3, "/a-b", 1),
            node(4, "/a-b/c", 0),
            node(5, "/a/x", 0),
            node(6, "/a/x/y", 0),
            node(7, "/b", 2),
            node(8, "/ghost/orphan", 0),
        ]);
        let top: Vec<u64> = store
            .children("/")
            .expect("children")
            .iter()
            .map(|n| n.id.0)
            .collect();
        assert_eq!(top, vec![2, 3, 7]);
        let under_a: Vec<u64> = store
            .children("/a")
            .expect("children")
            .iter()
            .map(|n| n.id.0)
            .collect();
        assert_eq!(under_a, vec![5]);
        assert!(store.children("/a/x/y").expect("children").is_empty());
        assert!(store.children("/missing").expect("children").is_empty());
    }

    #[test]
    fn upsert_swaps_paths_within_one_batch() {
        let mut store = MemoryStore::from_nodes([node(1, "/a", 0), node(2, "/b", 1)]);
        let mut a = node(1, "/b", 1);
        a.slug = "b".to_string();
        let mut b = node(2, "/a", 0);
        b.slug = "a".to_string();
        store.upsert_many(&[a, b]).expect("swap");
        assert_eq!(
            store.get_by_path("/a").expect("get").map(|n| n.id),
            Some(NodeId(2))
        );
        assert_eq!(
            store.get_by_path("/b").expect("get").map(|n| n.id),
            Some(NodeId(1))
        );
    }

    #[test]
    fn upsert_reports_partial_failure() {
        let mut store = MemoryStore::from_nodes([node(1, "/a", 0), node(2, "/b", 1)]);
        let moved = node(2, "/a", 0);
        let fresh = node(3, "/c", 2);
        let err = store.upsert_many(&[moved, fresh]).expect_err("conflict");
        assert!(matches!(err, TreeError::PartialFailure { .. }), "{err}");
        if let TreeError::PartialFailure { written, failed } = err {
            assert_eq!(written, vec![NodeId(3)]);
            assert_eq!(failed.len(), 1);
            assert_eq!(failed[0].0, NodeId(2));
        }
        // The rejected record keeps its old path and index entry.
        assert_eq!(
            store.get_by_path("/b").expect("get").map(|n| n.id),
            Some(NodeId(2))
        );
        assert_eq!(store.len().expect("len"), 3);
    }

    #[test]
    fn allocate_id_skips_imported_ids() {
        let mut store = sample_store();
        let id = store.allocate_id().expect("alloc");
        assert_eq!(id, NodeId(5001));
        assert_eq!(store.allocate_id().expect("alloc"), NodeId(5002));
    }
}
