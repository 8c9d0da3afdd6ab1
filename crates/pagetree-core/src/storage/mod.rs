//! # Storage
//!
//! Persistent backends for the node store.

pub mod redb_store;

pub use redb_store::RedbStore;
