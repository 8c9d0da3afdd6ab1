//! # pagetree-core
//!
//! The page tree engine: a flat node store organized as a tree through
//! materialized paths.
//!
//! This crate holds the node data model, the path/level/rank invariants,
//! the query cursor, and the insert and move algorithms that keep paths and
//! sibling order consistent while the tree is restructured.
//!
//! ## Architectural Constraints
//!
//! - Synchronous and runtime-free: no async, no network dependencies
//! - Permission decisions are delegated to a `PermissionGuard`
//! - Stores provide no locking; callers serialize writers

// =============================================================================
// MODULES
// =============================================================================

pub mod cursor;
pub mod formats;
pub mod guard;
pub mod inserter;
pub mod integrity;
pub mod mover;
pub mod park;
pub mod path;
pub mod primitives;
pub mod session;
pub mod storage;
pub mod store;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types
// =============================================================================

pub use types::{Node, NodeDraft, NodeId, Position, TreeError};

// =============================================================================
// RE-EXPORTS: Engine
// =============================================================================

pub use cursor::{Ancestors, Criterion, Cursor, CursorOptions, Filter, PageView};
pub use guard::{PermissionGuard, RequestContext, RoleGuard};
pub use inserter::Inserter;
pub use integrity::{TreeMetrics, Violation};
pub use mover::{MovePlan, Mover};
pub use park::ParkSpec;
pub use session::{Session, StorageBackend};
pub use storage::RedbStore;
pub use store::{MemoryStore, NodeStore};

// =============================================================================
// RE-EXPORTS: Formats
// =============================================================================

pub use formats::{Snapshot, SnapshotHeader, snapshot_from_bytes, snapshot_to_bytes};
