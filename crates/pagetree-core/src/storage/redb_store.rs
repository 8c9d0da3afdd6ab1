//! # redb-backed Node Storage
//!
//! A disk-backed node store using the redb embedded database.
//!
//! Records are postcard-encoded under their id. A second table maps every
//! path to its owner, so subtree scans are range queries over the path key
//! space and never walk ids.
//!
//! Unlike `MemoryStore`, a batch is applied inside one write transaction:
//! either every record lands or none does.

use crate::formats::Snapshot;
use crate::path;
use crate::store::NodeStore;
use crate::{Node, NodeId, TreeError};
use redb::{Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition};
use std::path::Path;

/// Table for nodes: NodeId(u64) -> postcard-encoded Node
const NODES: TableDefinition<u64, &[u8]> = TableDefinition::new("nodes");

/// Table for the path index: path -> NodeId(u64)
const PATHS: TableDefinition<&str, u64> = TableDefinition::new("paths");

/// Table for metadata: key string -> value u64
const METADATA: TableDefinition<&str, u64> = TableDefinition::new("metadata");

const NEXT_NODE_ID: &str = "next_node_id";

/// A disk-backed node store using redb.
pub struct RedbStore {
    db: Database,
    next_node_id: u64,
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore")
            .field("next_node_id", &self.next_node_id)
            .finish_non_exhaustive()
    }
}

fn decode(bytes: &[u8]) -> Result<Node, TreeError> {
    postcard::from_bytes(bytes).map_err(|e| TreeError::Serialization(e.to_string()))
}

fn encode(node: &Node) -> Result<Vec<u8>, TreeError> {
    postcard::to_allocvec(node).map_err(|e| TreeError::Serialization(e.to_string()))
}

impl RedbStore {
    /// Open or create a node database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, TreeError> {
        let db = Database::create(path.as_ref()).map_err(|e| TreeError::Store(e.to_string()))?;

        // Initialize tables if they don't exist
        {
            let write_txn = db
                .begin_write()
                .map_err(|e| TreeError::Store(e.to_string()))?;
            let _ = write_txn
                .open_table(NODES)
                .map_err(|e| TreeError::Store(e.to_string()))?;
            let _ = write_txn
                .open_table(PATHS)
                .map_err(|e| TreeError::Store(e.to_string()))?;
            let _ = write_txn
                .open_table(METADATA)
                .map_err(|e| TreeError::Store(e.to_string()))?;
            write_txn
                .commit()
                .map_err(|e| TreeError::Store(e.to_string()))?;
        }

        let next_node_id = {
            let read_txn = db
                .begin_read()
                .map_err(|e| TreeError::Store(e.to_string()))?;
            let table = read_txn
                .open_table(METADATA)
                .map_err(|e| TreeError::Store(e.to_string()))?;
            table
                .get(NEXT_NODE_ID)
                .map_err(|e| TreeError::Store(e.to_string()))?
                .map(|v| v.value())
                .unwrap_or(0)
        };

        Ok(Self { db, next_node_id })
    }

    /// Compact the database file.
    pub fn compact(&mut self) -> Result<(), TreeError> {
        self.db
            .compact()
            .map_err(|e| TreeError::Store(e.to_string()))?;
        Ok(())
    }

    /// The next id `allocate_id` would hand out.
    #[must_use]
    pub fn next_node_id(&self) -> u64 {
        self.next_node_id
    }

    /// All nodes in id order.
    pub fn nodes(&self) -> Result<Vec<Node>, TreeError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| TreeError::Store(e.to_string()))?;
        let nodes_table = read_txn
            .open_table(NODES)
            .map_err(|e| TreeError::Store(e.to_string()))?;

        let mut nodes = Vec::new();
        for entry in nodes_table
            .iter()
            .map_err(|e| TreeError::Store(e.to_string()))?
        {
            let (_, value) = entry.map_err(|e| TreeError::Store(e.to_string()))?;
            nodes.push(decode(value.value())?);
        }
        Ok(nodes)
    }

    /// Replace the whole content of the database with a snapshot, in one
    /// transaction.
    pub fn replace_all(&mut self, snapshot: &Snapshot) -> Result<(), TreeError> {
        snapshot.validate()?;
        let next = snapshot
            .nodes
            .iter()
            .map(|n| n.id.0.saturating_add(1))
            .fold(snapshot.next_node_id, u64::max);

        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| TreeError::Store(e.to_string()))?;
        write_txn
            .delete_table(NODES)
            .map_err(|e| TreeError::Store(e.to_string()))?;
        write_txn
            .delete_table(PATHS)
            .map_err(|e| TreeError::Store(e.to_string()))?;
        {
            let mut nodes_table = write_txn
                .open_table(NODES)
                .map_err(|e| TreeError::Store(e.to_string()))?;
            let mut paths_table = write_txn
                .open_table(PATHS)
                .map_err(|e| TreeError::Store(e.to_string()))?;
            let mut meta_table = write_txn
                .open_table(METADATA)
                .map_err(|e| TreeError::Store(e.to_string()))?;
            for node in &snapshot.nodes {
                let bytes = encode(node)?;
                nodes_table
                    .insert(node.id.0, bytes.as_slice())
                    .map_err(|e| TreeError::Store(e.to_string()))?;
                paths_table
                    .insert(node.path.as_str(), node.id.0)
                    .map_err(|e| TreeError::Store(e.to_string()))?;
            }
            meta_table
                .insert(NEXT_NODE_ID, next)
                .map_err(|e| TreeError::Store(e.to_string()))?;
        }
        write_txn
            .commit()
            .map_err(|e| TreeError::Store(e.to_string()))?;

        self.next_node_id = next;
        Ok(())
    }
}

// =============================================================================
// NODESTORE TRAIT IMPLEMENTATION
// =============================================================================

impl NodeStore for RedbStore {
    fn get(&self, id: NodeId) -> Result<Option<Node>, TreeError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| TreeError::Store(e.to_string()))?;
        let nodes_table = read_txn
            .open_table(NODES)
            .map_err(|e| TreeError::Store(e.to_string()))?;

        match nodes_table
            .get(id.0)
            .map_err(|e| TreeError::Store(e.to_string()))?
        {
            Some(data) => Ok(Some(decode(data.value())?)),
            None => Ok(None),
        }
    }

    fn get_by_path(&self, path: &str) -> Result<Option<Node>, TreeError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| TreeError::Store(e.to_string()))?;
        let paths_table = read_txn
            .open_table(PATHS)
            .map_err(|e| TreeError::Store(e.to_string()))?;
        let nodes_table = read_txn
            .open_table(NODES)
            .map_err(|e| TreeError::Store(e.to_string()))?;

        let Some(id) = paths_table
            .get(path)
            .map_err(|e| TreeError::Store(e.to_string()))?
            .map(|v| v.value())
        else {
            return Ok(None);
        };
        match nodes_table
            .get(id)
            .map_err(|e| TreeError::Store(e.to_string()))?
        {
            Some(data) => Ok(Some(decode(data.value())?)),
            None => Ok(None),
        }
    }

    fn scan_subtree(&self, prefix: &str) -> Result<Vec<Node>, TreeError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| TreeError::Store(e.to_string()))?;
        let paths_table = read_txn
            .open_table(PATHS)
            .map_err(|e| TreeError::Store(e.to_string()))?;
        let nodes_table = read_txn
            .open_table(NODES)
            .map_err(|e| TreeError::Store(e.to_string()))?;

        let mut ids = Vec::new();
        if let Some(id) = paths_table
            .get(prefix)
            .map_err(|e| TreeError::Store(e.to_string()))?
        {
            ids.push(id.value());
        }
        let (lower, upper) = path::descendant_bounds(prefix);
        for entry in paths_table
            .range(lower.as_str()..upper.as_str())
            .map_err(|e| TreeError::Store(e.to_string()))?
        {
            let (key, value) = entry.map_err(|e| TreeError::Store(e.to_string()))?;
            if key.value() != prefix {
                ids.push(value.value());
            }
        }

        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(data) = nodes_table
                .get(id)
                .map_err(|e| TreeError::Store(e.to_string()))?
            {
                out.push(decode(data.value())?);
            }
        }
        Ok(out)
    }

    fn upsert_many(&mut self, nodes: &[Node]) -> Result<(), TreeError> {
        if nodes.is_empty() {
            return Ok(());
        }

        let mut next = self.next_node_id;
        let mut failed = Vec::new();

        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| TreeError::Store(e.to_string()))?;
        {
            let mut nodes_table = write_txn
                .open_table(NODES)
                .map_err(|e| TreeError::Store(e.to_string()))?;
            let mut paths_table = write_txn
                .open_table(PATHS)
                .map_err(|e| TreeError::Store(e.to_string()))?;
            let mut meta_table = write_txn
                .open_table(METADATA)
                .map_err(|e| TreeError::Store(e.to_string()))?;

            // Pass 1: release the old path of every record that changes path.
            for node in nodes {
                let old = nodes_table
                    .get(node.id.0)
                    .map_err(|e| TreeError::Store(e.to_string()))?
                    .map(|data| decode(data.value()))
                    .transpose()?;
                if let Some(old) = old
                    && old.path != node.path
                {
                    let owner = paths_table
                        .get(old.path.as_str())
                        .map_err(|e| TreeError::Store(e.to_string()))?
                        .map(|v| v.value());
                    if owner == Some(node.id.0) {
                        paths_table
                            .remove(old.path.as_str())
                            .map_err(|e| TreeError::Store(e.to_string()))?;
                    }
                }
            }

            // Pass 2: write records, refusing paths owned outside the batch.
            for node in nodes {
                let owner = paths_table
                    .get(node.path.as_str())
                    .map_err(|e| TreeError::Store(e.to_string()))?
                    .map(|v| v.value());
                if let Some(owner) = owner
                    && owner != node.id.0
                {
                    failed.push((
                        node.id,
                        format!("path '{}' already belongs to node {}", node.path, owner),
                    ));
                    continue;
                }
                let bytes = encode(node)?;
                nodes_table
                    .insert(node.id.0, bytes.as_slice())
                    .map_err(|e| TreeError::Store(e.to_string()))?;
                paths_table
                    .insert(node.path.as_str(), node.id.0)
                    .map_err(|e| TreeError::Store(e.to_string()))?;
                next = next.max(node.id.0.saturating_add(1));
            }

            meta_table
                .insert(NEXT_NODE_ID, next)
                .map_err(|e| TreeError::Store(e.to_string()))?;
        }

        if !failed.is_empty() {
            // Dropping the transaction discards every write of the batch.
            write_txn
                .abort()
                .map_err(|e| TreeError::Store(e.to_string()))?;
            return Err(TreeError::PartialFailure {
                written: Vec::new(),
                failed,
            });
        }

        write_txn
            .commit()
            .map_err(|e| TreeError::Store(e.to_string()))?;
        self.next_node_id = next;
        Ok(())
    }

    fn allocate_id(&mut self) -> Result<NodeId, TreeError> {
        let id = NodeId(self.next_node_id);
        let next = self.next_node_id.saturating_add(1);

        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| TreeError::Store(e.to_string()))?;
        {
            let mut meta_table = write_txn
                .open_table(METADATA)
                .map_err(|e| TreeError::Store(e.to_string()))?;
            meta_table
                .insert(NEXT_NODE_ID, next)
                .map_err(|e| TreeError::Store(e.to_string()))?;
        }
        write_txn
            .commit()
            .map_err(|e| TreeError::Store(e.to_string()))?;

        self.next_node_id = next;
        Ok(id)
    }

    fn len(&self) -> Result<usize, TreeError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| TreeError::Store(e.to_string()))?;
        let nodes_table = read_txn
            .open_table(NODES)
            .map_err(|e| TreeError::Store(e.to_string()))?;
        let count = nodes_table
            .len()
            .map_err(|e| TreeError::Store(e.to_string()))?;
        usize::try_from(count).map_err(|e| TreeError::Store(e.to_string()))
    }
}

// =============================================================================
// TESTS
// =============================================================================
