//! # Snapshot Format
//!
//! Binary serialization of a whole tree, used by the file backend and by
//! export/import.
//!
//! Format: Header (5 bytes) + postcard-serialized snapshot.
//! - 4 bytes: Magic ("PTRE")
//! - 1 byte: Version
//!
//! Size and header are validated before the payload is decoded.

use crate::store::{MemoryStore, NodeStore};
use crate::{Node, TreeError, primitives};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Maximum accepted snapshot size, checked before decoding.
pub const MAX_SNAPSHOT_PAYLOAD_SIZE: usize = 256 * 1024 * 1024; // 256 MB

const HEADER_SIZE: usize = 5;

// =============================================================================
// HEADER
// =============================================================================

/// The header that precedes every snapshot payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotHeader {
    pub magic: [u8; 4],
    pub version: u8,
}

impl SnapshotHeader {
    /// Header with the current format version.
    #[must_use]
    pub fn new() -> Self {
        Self {
            magic: *primitives::MAGIC_BYTES,
            version: primitives::FORMAT_VERSION,
        }
    }

    pub fn validate(&self) -> Result<(), TreeError> {
        if &self.magic != primitives::MAGIC_BYTES {
            return Err(TreeError::Serialization("Invalid magic bytes".to_string()));
        }
        if self.version != primitives::FORMAT_VERSION {
            return Err(TreeError::Serialization(format!(
                "Unsupported version: {} (expected {})",
                self.version,
                primitives::FORMAT_VERSION
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[0..4].copy_from_slice(&self.magic);
        bytes[4] = self.version;
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TreeError> {
        let Some(head) = bytes.get(..HEADER_SIZE) else {
            return Err(TreeError::Serialization("Header too short".to_string()));
        };
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&head[0..4]);
        Ok(Self {
            magic,
            version: head[4],
        })
    }
}

impl Default for SnapshotHeader {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// SNAPSHOT
// =============================================================================

/// Every node of a tree plus the id counter.
///
/// Nodes are kept in id order so the same tree always encodes to the same
/// bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub next_node_id: u64,
    pub nodes: Vec<Node>,
}

impl Snapshot {
    #[must_use]
    pub fn new(mut nodes: Vec<Node>, next_node_id: u64) -> Self {
        nodes.sort_by_key(|n| n.id);
        let floor = nodes
            .last()
            .map_or(0, |n| n.id.0.saturating_add(1));
        Self {
            next_node_id: next_node_id.max(floor),
            nodes,
        }
    }

    /// Capture every node of a store.
    pub fn capture(store: &dyn NodeStore) -> Result<Self, TreeError> {
        let nodes = store.scan_subtree(primitives::ROOT_PATH)?;
        Ok(Self::new(nodes, 0))
    }

    /// Reject snapshots in which two records share an id or a path.
    ///
    /// Stores index records by path, so a duplicate would silently hide one
    /// of them.
    pub fn validate(&self) -> Result<(), TreeError> {
        let mut ids = BTreeSet::new();
        let mut paths = BTreeSet::new();
        for node in &self.nodes {
            if !ids.insert(node.id) {
                return Err(TreeError::Serialization(format!(
                    "duplicate node id {}",
                    node.id
                )));
            }
            if !paths.insert(node.path.as_str()) {
                return Err(TreeError::Serialization(format!(
                    "duplicate path '{}' (node {})",
                    node.path, node.id
                )));
            }
        }
        Ok(())
    }

    /// Rebuild an in-memory store holding exactly this snapshot.
    ///
    /// Call `validate` first on untrusted input.
    #[must_use]
    pub fn into_store(self) -> MemoryStore {
        let next = self.next_node_id;
        let mut store = MemoryStore::from_nodes(self.nodes);
        store.reserve_ids(next);
        store
    }
}

/// Serialize a snapshot (header + payload). No file I/O.
pub fn snapshot_to_bytes(snapshot: &Snapshot) -> Result<Vec<u8>, TreeError> {
    let header = SnapshotHeader::new();
    let payload =
        postcard::to_stdvec(snapshot).map_err(|e| TreeError::Serialization(e.to_string()))?;

    let mut result = Vec::with_capacity(HEADER_SIZE + payload.len());
    result.extend_from_slice(&header.to_bytes());
    result.extend_from_slice(&payload);
    Ok(result)
}

/// Deserialize a snapshot. No file I/O.
pub fn snapshot_from_bytes(bytes: &[u8]) -> Result<Snapshot, TreeError> {
    if bytes.len() < HEADER_SIZE {
        return Err(TreeError::Serialization(format!(
            "Data too short: minimum {} bytes required",
            HEADER_SIZE
        )));
    }
    if bytes.len() > MAX_SNAPSHOT_PAYLOAD_SIZE {
        return Err(TreeError::Serialization(format!(
            "Data size {} bytes exceeds maximum allowed {} bytes",
            bytes.len(),
            MAX_SNAPSHOT_PAYLOAD_SIZE
        )));
    }

    let header = SnapshotHeader::from_bytes(bytes)?;
    header.validate()?;

    let snapshot: Snapshot = postcard::from_bytes(&bytes[HEADER_SIZE..]).map_err(|e| {
        TreeError::Serialization(format!("Failed to deserialize snapshot: {}", e))
    })?;
    snapshot.validate()?;
    Ok(snapshot)
}

// =============================================================================
// TESTS
// =============================================================================
