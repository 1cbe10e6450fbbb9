//! # Formats
//!
//! Byte-level encodings of a [`Workspace`](crate::Workspace). File I/O lives
//! in the app layer.

pub mod persistence;

pub use persistence::{
    MAX_PERSISTENCE_PAYLOAD_SIZE, PersistenceHeader, workspace_from_bytes, workspace_to_bytes,
};
