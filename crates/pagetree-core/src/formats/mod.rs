//! # Formats
//!
//! Byte-level encodings of a whole tree. File I/O lives in the app layer.

pub mod persistence;

pub use persistence::{
    MAX_SNAPSHOT_PAYLOAD_SIZE, Snapshot, SnapshotHeader, snapshot_from_bytes, snapshot_to_bytes,
};
