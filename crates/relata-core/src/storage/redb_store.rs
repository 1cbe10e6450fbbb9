//! # redb-backed Workspace Storage
//!
//! Stores a workspace in a redb database, one row per entity and one row per
//! property, so individual properties stay inspectable with generic redb
//! tooling. `save` replaces the whole content in a single write transaction;
//! a crash mid-save leaves the previous content intact.

use crate::workspace::{EntityRecord, EntityShape, SerializableWorkspace};
use crate::{Property, RelataError, Workspace, primitives};
use redb::{Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// Entity name -> postcard-encoded [`EntityShape`].
const ENTITIES: TableDefinition<&str, &[u8]> = TableDefinition::new("entities");

/// (entity name, property key) -> property value.
const PROPERTIES: TableDefinition<(&str, &str), &str> = TableDefinition::new("properties");

/// Key string -> value u64.
const METADATA: TableDefinition<&str, u64> = TableDefinition::new("metadata");

fn io_err(e: impl std::fmt::Display) -> RelataError {
    RelataError::IoError(e.to_string())
}

/// A workspace persisted in a redb database file.
pub struct RedbStore {
    db: Database,
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore").finish_non_exhaustive()
    }
}

impl RedbStore {
    /// Open or create a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RelataError> {
        let db = Database::create(path.as_ref()).map_err(io_err)?;

        let write_txn = db.begin_write().map_err(io_err)?;
        {
            let _ = write_txn.open_table(ENTITIES).map_err(io_err)?;
            let _ = write_txn.open_table(PROPERTIES).map_err(io_err)?;
            let mut meta = write_txn.open_table(METADATA).map_err(io_err)?;
            let version = meta.get("format_version").map_err(io_err)?.map(|v| v.value());
            match version {
                None => {
                    meta.insert("format_version", u64::from(primitives::FORMAT_VERSION))
                        .map_err(io_err)?;
                }
                Some(v) if v == u64::from(primitives::FORMAT_VERSION) => {}
                Some(v) => {
                    return Err(RelataError::SerializationError(format!(
                        "Unsupported store version: {} (expected {})",
                        v,
                        primitives::FORMAT_VERSION
                    )));
                }
            }
        }
        write_txn.commit().map_err(io_err)?;

        Ok(Self { db })
    }

    /// Number of stored entities.
    pub fn entity_count(&self) -> Result<usize, RelataError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let table = read_txn.open_table(ENTITIES).map_err(io_err)?;
        Ok(table.len().map_err(io_err)? as usize)
    }

    /// Number of stored properties across all entities.
    pub fn property_count(&self) -> Result<usize, RelataError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let table = read_txn.open_table(PROPERTIES).map_err(io_err)?;
        Ok(table.len().map_err(io_err)? as usize)
    }

    /// Load the stored workspace.
    pub fn load(&self) -> Result<Workspace, RelataError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;

        let mut properties: BTreeMap<String, BTreeMap<String, Property>> = BTreeMap::new();
        {
            let table = read_txn.open_table(PROPERTIES).map_err(io_err)?;
            for entry in table.iter().map_err(io_err)? {
                let (key, value) = entry.map_err(io_err)?;
                let (name, prop) = key.value();
                properties
                    .entry(name.to_string())
                    .or_default()
                    .insert(prop.to_string(), Property::new(value.value()));
            }
        }

        let mut entities = Vec::new();
        {
            let table = read_txn.open_table(ENTITIES).map_err(io_err)?;
            for entry in table.iter().map_err(io_err)? {
                let (key, value) = entry.map_err(io_err)?;
                let name = key.value().to_string();
                let shape: EntityShape = postcard::from_bytes(value.value()).map_err(|e| {
                    RelataError::SerializationError(format!("entity '{}': {}", name, e))
                })?;
                let props = properties.remove(&name).unwrap_or_default();
                entities.push(EntityRecord {
                    name,
                    shape,
                    properties: props,
                });
            }
        }

        debug!(entities = entities.len(), "loaded workspace from redb");
        Workspace::try_from(SerializableWorkspace { entities })
    }

    /// Replace the stored workspace with `workspace`.
    pub fn save(&self, workspace: &Workspace) -> Result<(), RelataError> {
        let snapshot = SerializableWorkspace::from(workspace);
        let write_txn = self.db.begin_write().map_err(io_err)?;
        write_txn.delete_table(ENTITIES).map_err(io_err)?;
        write_txn.delete_table(PROPERTIES).map_err(io_err)?;
        {
            let mut entities = write_txn.open_table(ENTITIES).map_err(io_err)?;
            let mut properties = write_txn.open_table(PROPERTIES).map_err(io_err)?;
            for record in &snapshot.entities {
                let shape = postcard::to_stdvec(&record.shape)
                    .map_err(|e| RelataError::SerializationError(e.to_string()))?;
                entities
                    .insert(record.name.as_str(), shape.as_slice())
                    .map_err(io_err)?;
                for (key, value) in &record.properties {
                    properties
                        .insert((record.name.as_str(), key.as_str()), value.as_str())
                        .map_err(io_err)?;
                }
            }
        }
        write_txn.commit().map_err(io_err)?;
        debug!(entities = snapshot.entities.len(), "saved workspace to redb");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::DataEntity;
    use tempfile::TempDir;

    #[test]
    fn save_then_load() {
        let dir = TempDir::new().expect("tempdir");
        let store = RedbStore::open(dir.path().join("ws.redb")).expect("open");

        let mut ws = Workspace::new();
        ws.add_data("img", DataEntity::with_uid("img-1").kind("image").property_value("k", "v"))
            .expect("add");
        ws.add_node("node", Some("img")).expect("node");
        ws.set_property("node", "Relations.1.relationUID", "u").expect("set");
        store.save(&ws).expect("save");

        assert_eq!(store.entity_count().expect("count"), 2);
        assert_eq!(store.property_count().expect("count"), 2);

        let loaded = store.load().expect("load");
        assert_eq!(
            SerializableWorkspace::from(&loaded),
            SerializableWorkspace::from(&ws)
        );
    }

    #[test]
    fn save_replaces_previous_content() {
        let dir = TempDir::new().expect("tempdir");
        let store = RedbStore::open(dir.path().join("ws.redb")).expect("open");

        let mut first = Workspace::new();
        first.add_data("a", DataEntity::new().property_value("x", "1")).expect("a");
        store.save(&first).expect("save");

        let mut second = Workspace::new();
        second.add_data("b", DataEntity::new()).expect("b");
        store.save(&second).expect("save");

        let loaded = store.load().expect("load");
        assert_eq!(loaded.names().collect::<Vec<_>>(), vec!["b"]);
        assert_eq!(store.property_count().expect("count"), 0);
    }

    #[test]
    fn reopen_keeps_content() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("ws.redb");
        {
            let store = RedbStore::open(&path).expect("open");
            let mut ws = Workspace::new();
            ws.add_data("a", DataEntity::with_uid("a")).expect("a");
            store.save(&ws).expect("save");
        }
        let store = RedbStore::open(&path).expect("reopen");
        assert_eq!(store.load().expect("load").len(), 1);
    }
}
