//! # CLI Command Implementations
//!
//! Each command loads the workspace, runs one engine operation and, for
//! mutating commands, saves the workspace back.

use super::Settings;
use crate::config::{Backend, SEQUENTIAL_UID_PREFIX, UidMode};
use relata_core::rule::instance::InstanceIndex;
use relata_core::{
    DataEntity, RedbStore, RelataError, RelationRule, RelationType, RelationUid,
    SequentialUidSource, UidSource, UuidSource, Workspace, parse_rule, workspace_from_bytes,
    workspace_to_bytes,
};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

// =============================================================================
// FILE SIZE LIMITS
// =============================================================================

/// Maximum workspace snapshot size read by the file backend (256 MB).
const MAX_WORKSPACE_FILE_SIZE: u64 = 256 * 1024 * 1024;

/// Validate file size before reading.
fn validate_file_size(path: &Path, max_size: u64) -> Result<(), RelataError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| RelataError::IoError(format!("Cannot read file metadata: {}", e)))?;

    if metadata.len() > max_size {
        return Err(RelataError::SerializationError(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            max_size
        )));
    }
    Ok(())
}

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

/// Load the workspace, or an empty one if nothing is stored yet.
pub fn load_workspace(settings: &Settings) -> Result<Workspace, RelataError> {
    let path = settings.workspace.as_path();
    match settings.backend {
        Backend::Redb => RedbStore::open(path)?.load(),
        Backend::File => {
            if !path.exists() {
                return Ok(Workspace::new());
            }
            validate_file_size(path, MAX_WORKSPACE_FILE_SIZE)?;
            let data = std::fs::read(path)
                .map_err(|e| RelataError::IoError(format!("Read workspace: {}", e)))?;
            workspace_from_bytes(&data)
        }
    }
}

/// Persist the workspace.
pub fn save_workspace(settings: &Settings, workspace: &Workspace) -> Result<(), RelataError> {
    let path = settings.workspace.as_path();
    match settings.backend {
        Backend::Redb => RedbStore::open(path)?.save(workspace),
        Backend::File => {
            let data = workspace_to_bytes(workspace)?;
            std::fs::write(path, &data)
                .map_err(|e| RelataError::IoError(format!("Write workspace: {}", e)))
        }
    }
}

fn uid_source(settings: &Settings, workspace: &Workspace) -> Arc<dyn UidSource> {
    match settings.uid_mode {
        UidMode::Uuid => Arc::new(UuidSource),
        UidMode::Sequential => Arc::new(SequentialUidSource::starting_after(
            SEQUENTIAL_UID_PREFIX,
            workspace.highest_sequential_uid(SEQUENTIAL_UID_PREFIX),
        )),
    }
}

fn rule(
    settings: &Settings,
    workspace: &Workspace,
    rule_name: &str,
) -> Result<RelationRule, RelataError> {
    parse_rule(rule_name, uid_source(settings, workspace))
}

/// Parse a `KEY=VALUE` argument.
pub fn parse_property(arg: &str) -> Result<(String, String), RelataError> {
    let (key, value) = arg.split_once('=').ok_or_else(|| {
        RelataError::InvalidArgument(format!("property '{}' is not KEY=VALUE", arg))
    })?;
    Ok((key.trim().to_string(), value.to_string()))
}

fn print_json(value: &serde_json::Value) {
    println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
}

fn print_names(json_mode: bool, field: &str, names: &[String]) {
    if json_mode {
        print_json(&serde_json::json!({ field: names }));
    } else if names.is_empty() {
        println!("(none)");
    } else {
        for name in names {
            println!("{}", name);
        }
    }
}

// =============================================================================
// INIT COMMAND
// =============================================================================

/// Initialize a new empty workspace.
pub fn cmd_init(settings: &Settings, force: bool) -> Result<(), RelataError> {
    let path = settings.workspace.as_path();
    if path.exists() {
        if !force {
            return Err(RelataError::InvalidArgument(
                "Workspace already exists. Use --force to overwrite.".to_string(),
            ));
        }
        std::fs::remove_file(path)
            .map_err(|e| RelataError::IoError(format!("Remove workspace: {}", e)))?;
    }

    save_workspace(settings, &Workspace::new())?;
    info!(path = %path.display(), backend = ?settings.backend, "initialized workspace");
    println!("Initialized new workspace at {:?}", path);
    Ok(())
}

// =============================================================================
// ENTITY COMMANDS
// =============================================================================

/// Add a data entity or a wrapper node.
pub fn cmd_add(
    settings: &Settings,
    name: &str,
    uid: Option<String>,
    kind: Option<String>,
    wraps: Option<&str>,
    properties: &[String],
) -> Result<(), RelataError> {
    let mut workspace = load_workspace(settings)?;
    let properties = properties
        .iter()
        .map(|p| parse_property(p))
        .collect::<Result<Vec<_>, _>>()?;

    match wraps {
        Some(target) => {
            workspace.add_node(name, Some(target))?;
            for (key, value) in &properties {
                workspace.set_property(name, key, value)?;
            }
        }
        None => {
            let mut data = match uid {
                Some(uid) => DataEntity::with_uid(uid),
                None => DataEntity::new(),
            };
            if let Some(kind) = kind {
                data = data.kind(kind);
            }
            for (key, value) in &properties {
                data = data.property_value(key, value.as_str());
            }
            workspace.add_data(name, data)?;
        }
    }

    save_workspace(settings, &workspace)?;
    info!(entity = name, "added entity");
    if settings.json {
        print_json(&serde_json::json!({ "added": name }));
    } else {
        println!("Added '{}'", name);
    }
    Ok(())
}

/// Show one entity.
pub fn cmd_show(settings: &Settings, name: &str) -> Result<(), RelataError> {
    let workspace = load_workspace(settings)?;
    let entity = workspace.resolve(name)?;
    let owner = entity.owner();
    let properties: Vec<(String, String)> = owner
        .property_keys()
        .into_iter()
        .filter_map(|k| owner.property(&k).map(|v| (k, v.0)))
        .collect();

    if settings.json {
        let props: serde_json::Map<String, serde_json::Value> = properties
            .into_iter()
            .map(|(k, v)| (k, serde_json::Value::String(v)))
            .collect();
        print_json(&serde_json::json!({
            "name": name,
            "shape": if entity.is_node() { "node" } else { "data" },
            "uid": entity.uid(),
            "kind": entity.kind(),
            "wraps": entity.wraps(),
            "properties": props,
        }));
        return Ok(());
    }

    println!("Entity:  {}", name);
    println!("Shape:   {}", if entity.is_node() { "node" } else { "data" });
    println!("UID:     {}", entity.uid().unwrap_or_else(|| "-".to_string()));
    println!("Kind:    {}", entity.kind().unwrap_or("-"));
    if let Some(wraps) = entity.wraps() {
        println!("Wraps:   {}", wraps);
    }
    println!();
    for (key, value) in properties {
        println!("{} = {}", key, value);
    }
    Ok(())
}

// =============================================================================
// RELATION COMMANDS
// =============================================================================

/// Connect a source to a destination.
pub fn cmd_connect(
    settings: &Settings,
    rule_name: &str,
    source: &str,
    destination: &str,
) -> Result<(), RelataError> {
    let workspace = load_workspace(settings)?;
    let rule = rule(settings, &workspace, rule_name)?;
    let uid = workspace.connect(&rule, source, destination)?;
    save_workspace(settings, &workspace)?;

    info!(rule = %rule.rule_id(), source, destination, relation_uid = %uid, "connected");
    if settings.json {
        print_json(&serde_json::json!({ "relation_uid": uid.as_str() }));
    } else {
        println!("{}", uid);
    }
    Ok(())
}

/// Remove a relation layer, by destination or by relation UID.
pub fn cmd_disconnect(
    settings: &Settings,
    rule_name: &str,
    source: &str,
    destination: Option<&str>,
    relation: Option<&str>,
    layer: &str,
) -> Result<(), RelataError> {
    let layer = RelationType::parse(layer)?;
    let workspace = load_workspace(settings)?;
    let rule = rule(settings, &workspace, rule_name)?;

    match (destination, relation) {
        (_, Some(uid)) => {
            workspace.disconnect_relation(&rule, source, &RelationUid::new(uid), layer)?;
        }
        (Some(destination), None) => workspace.disconnect(&rule, source, destination, layer)?,
        (None, None) => {
            return Err(RelataError::NullArgument(
                "a destination or --relation is required".to_string(),
            ));
        }
    }
    save_workspace(settings, &workspace)?;

    info!(rule = %rule.rule_id(), source, layer = %layer, "disconnected");
    if settings.json {
        print_json(&serde_json::json!({ "disconnected": true, "layer": layer.as_str() }));
    } else {
        println!("Disconnected ({})", layer);
    }
    Ok(())
}

/// List the relations stored on a source.
pub fn cmd_relations(
    settings: &Settings,
    rule_name: &str,
    source: &str,
    layer: &str,
) -> Result<(), RelataError> {
    let layer = RelationType::parse(layer)?;
    let workspace = load_workspace(settings)?;
    let rule = rule(settings, &workspace, rule_name)?;
    let uids: Vec<String> = workspace
        .existing_relations(&rule, source, layer)?
        .into_iter()
        .map(|u| u.0)
        .collect();
    print_names(settings.json, "relations", &uids);
    Ok(())
}

/// Classify the relation between two entities.
pub fn cmd_types(
    settings: &Settings,
    rule_name: &str,
    source: &str,
    destination: &str,
) -> Result<(), RelataError> {
    let workspace = load_workspace(settings)?;
    let rule = rule(settings, &workspace, rule_name)?;
    let types: Vec<String> = workspace
        .relation_types(&rule, source, destination)?
        .into_iter()
        .map(|t| t.as_str().to_string())
        .collect();
    print_names(settings.json, "types", &types);
    Ok(())
}

/// List the sources related to a destination.
pub fn cmd_sources(
    settings: &Settings,
    rule_name: &str,
    destination: &str,
    layer: &str,
) -> Result<(), RelataError> {
    let layer = RelationType::parse(layer)?;
    let workspace = load_workspace(settings)?;
    let rule = rule(settings, &workspace, rule_name)?;
    let names = workspace.sources_of(&rule, destination, layer)?;
    print_names(settings.json, "sources", &names);
    Ok(())
}

/// List the destinations a source is related to.
pub fn cmd_destinations(
    settings: &Settings,
    rule_name: &str,
    source: &str,
    layer: &str,
) -> Result<(), RelataError> {
    let layer = RelationType::parse(layer)?;
    let workspace = load_workspace(settings)?;
    let rule = rule(settings, &workspace, rule_name)?;
    let names = workspace.destinations_of(&rule, source, layer)?;
    print_names(settings.json, "destinations", &names);
    Ok(())
}

// =============================================================================
// STATUS COMMAND
// =============================================================================

/// Show workspace status.
pub fn cmd_status(settings: &Settings) -> Result<(), RelataError> {
    let workspace = load_workspace(settings)?;
    let nodes = workspace.iter().filter(|(_, e)| e.is_node()).count();
    let instances: usize = workspace
        .iter()
        .map(|(_, e)| InstanceIndex::scan(e.provider()).len())
        .sum();
    let backend = match settings.backend {
        Backend::File => "file",
        Backend::Redb => "redb",
    };

    if settings.json {
        print_json(&serde_json::json!({
            "workspace": settings.workspace.to_string_lossy(),
            "backend": backend,
            "entities": workspace.len(),
            "nodes": nodes,
            "relation_instances": instances,
        }));
        return Ok(());
    }

    println!("Relata Workspace Status");
    println!("=======================");
    println!("Workspace: {:?}", settings.workspace);
    println!("Backend:   {}", backend);
    println!();
    println!("Entities:           {}", workspace.len());
    println!("Nodes:              {}", nodes);
    println!("Relation instances: {}", instances);
    Ok(())
}
