//! # Session Module
//!
//! The facade the application layer talks to: one storage backend plus the
//! permission guard every read and write goes through.
//!
//! ## Storage Backends
//!
//! - `InMemory`: `MemoryStore` (fast, volatile unless saved as a snapshot)
//! - `Persistent`: `RedbStore` for disk-backed storage
//!
//! A session provides no locking. Callers that share it across tasks must
//! serialize writers themselves.

use crate::cursor::Cursor;
use crate::formats::Snapshot;
use crate::guard::{PermissionGuard, RequestContext, RoleGuard};
use crate::inserter::Inserter;
use crate::integrity::{self, TreeMetrics, Violation};
use crate::mover::{MovePlan, Mover};
use crate::park::{self, ParkSpec};
use crate::primitives::{ROOT_PATH, TRASH_SLUG};
use crate::storage::RedbStore;
use crate::store::{MemoryStore, NodeStore};
use crate::{Node, NodeDraft, NodeId, Position, TreeError, path};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Storage backend for a Session.
#[derive(Debug)]
pub enum StorageBackend {
    /// In-memory store (fast, volatile).
    InMemory(MemoryStore),
    /// Disk-backed store using redb.
    Persistent(RedbStore),
}

impl Default for StorageBackend {
    fn default() -> Self {
        Self::InMemory(MemoryStore::new())
    }
}

// NOTE: StorageBackend does NOT implement Clone.
// RedbStore holds a database handle.

/// A storage backend paired with a permission guard.
pub struct Session {
    backend: StorageBackend,
    guard: Arc<dyn PermissionGuard>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("backend", &self.backend)
            .finish_non_exhaustive()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::with_store(MemoryStore::new())
    }
}

impl Session {
    /// Create a new empty session with in-memory storage and the role guard.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session over an existing in-memory store.
    #[must_use]
    pub fn with_store(store: MemoryStore) -> Self {
        Self {
            backend: StorageBackend::InMemory(store),
            guard: Arc::new(RoleGuard),
        }
    }

    /// Create a session with persistent redb storage at the given path.
    pub fn with_redb(path: impl AsRef<Path>) -> Result<Self, TreeError> {
        Ok(Self::with_redb_store(RedbStore::open(path)?))
    }

    /// Create a session over an existing `RedbStore`.
    #[must_use]
    pub fn with_redb_store(store: RedbStore) -> Self {
        Self {
            backend: StorageBackend::Persistent(store),
            guard: Arc::new(RoleGuard),
        }
    }

    /// Replace the permission guard.
    #[must_use]
    pub fn with_guard(mut self, guard: Arc<dyn PermissionGuard>) -> Self {
        self.guard = guard;
        self
    }

    /// Check if using persistent storage.
    #[must_use]
    pub fn is_persistent(&self) -> bool {
        matches!(self.backend, StorageBackend::Persistent(_))
    }

    /// Get a reference to the storage backend.
    #[must_use]
    pub fn backend(&self) -> &StorageBackend {
        &self.backend
    }

    /// The store behind the session, whatever the backend.
    #[must_use]
    pub fn store(&self) -> &dyn NodeStore {
        match &self.backend {
            StorageBackend::InMemory(store) => store,
            StorageBackend::Persistent(redb) => redb,
        }
    }

    fn parts_mut(&mut self) -> (&mut dyn NodeStore, &dyn PermissionGuard) {
        let store: &mut dyn NodeStore = match &mut self.backend {
            StorageBackend::InMemory(store) => store,
            StorageBackend::Persistent(redb) => redb,
        };
        (store, self.guard.as_ref())
    }

    // =========================================================================
    // READ
    // =========================================================================

    /// Start a query as the given actor.
    pub fn find<'a>(&'a self, ctx: &'a RequestContext) -> Cursor<'a> {
        Cursor::new(self.store(), self.guard.as_ref(), ctx)
    }

    /// Number of stored nodes.
    pub fn node_count(&self) -> Result<usize, TreeError> {
        self.store().len()
    }

    // =========================================================================
    // WRITE
    // =========================================================================

    /// Create a node as the last child of `parent`.
    pub fn insert(
        &mut self,
        ctx: &RequestContext,
        parent: NodeId,
        draft: NodeDraft,
    ) -> Result<Node, TreeError> {
        let (store, guard) = self.parts_mut();
        Inserter::new(store, guard).insert(ctx, parent, draft)
    }

    /// Validate a move and return its plan without writing.
    pub fn plan_move(
        &mut self,
        ctx: &RequestContext,
        node: NodeId,
        target: NodeId,
        position: Position,
    ) -> Result<MovePlan, TreeError> {
        let (store, guard) = self.parts_mut();
        Mover::new(store, guard).plan(ctx, node, target, position)
    }

    /// Move `node` relative to `target`. Returns the moved node.
    pub fn move_node(
        &mut self,
        ctx: &RequestContext,
        node: NodeId,
        target: NodeId,
        position: Position,
    ) -> Result<Node, TreeError> {
        let (store, guard) = self.parts_mut();
        Mover::new(store, guard).move_node(ctx, node, target, position)
    }

    /// Soft-delete: move `node` into the trash container.
    pub fn trash(&mut self, ctx: &RequestContext, node: NodeId) -> Result<Node, TreeError> {
        let trash_path = path::join(ROOT_PATH, TRASH_SLUG);
        let container = self
            .store()
            .get_by_path(&trash_path)?
            .ok_or_else(|| TreeError::NotFound(format!("trash container '{}'", trash_path)))?;
        debug!(node = %node, trash = %container.id, "trashing node");
        self.move_node(ctx, node, container.id, Position::Inside)
    }

    /// Create missing parked fixtures.
    pub fn park(&mut self, specs: &[ParkSpec]) -> Result<Vec<Node>, TreeError> {
        let (store, _) = self.parts_mut();
        park::park(store, specs)
    }

    // =========================================================================
    // INTEGRITY
    // =========================================================================

    pub fn verify(&self) -> Result<Vec<Violation>, TreeError> {
        integrity::verify(self.store())
    }

    /// Close rank gaps. Returns how many records changed.
    pub fn repair(&mut self) -> Result<usize, TreeError> {
        let (store, _) = self.parts_mut();
        integrity::renumber_ranks(store)
    }

    pub fn metrics(&self) -> Result<TreeMetrics, TreeError> {
        let mut metrics = TreeMetrics::collect(self.store())?;
        metrics.next_node_id = Some(self.next_node_id());
        Ok(metrics)
    }

    fn next_node_id(&self) -> u64 {
        match &self.backend {
            StorageBackend::InMemory(store) => store.next_node_id(),
            StorageBackend::Persistent(redb) => redb.next_node_id(),
        }
    }

    // =========================================================================
    // SNAPSHOTS
    // =========================================================================

    /// Capture the whole tree, keeping the id counter.
    pub fn snapshot(&self) -> Result<Snapshot, TreeError> {
        let nodes = match &self.backend {
            StorageBackend::InMemory(store) => store.nodes().cloned().collect(),
            StorageBackend::Persistent(redb) => redb.nodes()?,
        };
        Ok(Snapshot::new(nodes, self.next_node_id()))
    }

    /// Replace the whole tree with a snapshot.
    pub fn restore(&mut self, snapshot: Snapshot) -> Result<(), TreeError> {
        debug!(nodes = snapshot.nodes.len(), "restoring snapshot");
        snapshot.validate()?;
        match &mut self.backend {
            StorageBackend::InMemory(store) => {
                *store = snapshot.into_store();
                Ok(())
            }
            StorageBackend::Persistent(redb) => redb.replace_all(&snapshot),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
