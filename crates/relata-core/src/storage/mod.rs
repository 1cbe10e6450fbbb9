//! # Storage
//!
//! Disk-backed workspace storage.

mod redb_store;

pub use redb_store::RedbStore;
