//! Integration tests for the relata command line.
//!
//! Commands are parsed with `Cli::try_parse_from`, executed against a
//! workspace in a temporary directory, and the result is checked by loading
//! the stored workspace back.

#![allow(clippy::unwrap_used, clippy::panic)]

use clap::Parser;
use relata::cli::{Cli, Settings, execute, load_workspace, parse_property};
use relata::config::{Backend, Config, UidMode};
use relata_core::{
    RedbStore, RelataError, RelationRule, RelationType, UuidSource, parse_rule,
    workspace_from_bytes,
};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn segmentation() -> RelationRule {
    parse_rule("image:segmentation", Arc::new(UuidSource)).expect("rule")
}

fn run(workspace: &Path, backend: &str, args: &[&str]) -> Result<(), RelataError> {
    let path = workspace.to_string_lossy().to_string();
    let mut argv = vec![
        "relata",
        "--workspace",
        path.as_str(),
        "--backend",
        backend,
        "--uid-source",
        "sequential",
    ];
    argv.extend_from_slice(args);
    let cli = Cli::try_parse_from(argv).expect("parse arguments");
    execute(cli, &Config::default())
}

/// A workspace with a CT image and an unrelated segmentation.
fn seeded(backend: &str) -> (TempDir, std::path::PathBuf) {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("ws.db");
    run(&path, backend, &["init"]).expect("init");
    run(
        &path,
        backend,
        &[
            "add",
            "ct",
            "--uid",
            "ct-1",
            "--kind",
            "image",
            "-p",
            "DICOM.0008.0018=ct-1",
            "-p",
            "DICOM.0008.0016=1.2.840.10008.5.1.4.1.1.2",
        ],
    )
    .expect("add ct");
    run(&path, backend, &["add", "seg", "--uid", "seg-1"]).expect("add seg");
    (dir, path)
}

fn settings(path: &Path, backend: Backend) -> Settings {
    Settings {
        workspace: path.to_path_buf(),
        backend,
        uid_mode: UidMode::Sequential,
        json: false,
    }
}

// =============================================================================
// INIT
// =============================================================================

#[test]
fn init_refuses_existing_workspace_without_force() {
    let (_dir, path) = seeded("file");
    assert!(run(&path, "file", &["init"]).is_err());

    run(&path, "file", &["init", "--force"]).expect("forced init");
    let ws = load_workspace(&settings(&path, Backend::File)).expect("load");
    assert!(ws.is_empty());
}

#[test]
fn add_rejects_malformed_property() {
    let (_dir, path) = seeded("file");
    assert!(run(&path, "file", &["add", "x", "-p", "no-equals-sign"]).is_err());
    assert!(parse_property("no-equals-sign").is_err());
    assert_eq!(
        parse_property("a.b = c=d").expect("parse"),
        ("a.b".to_string(), " c=d".to_string())
    );
}

// =============================================================================
// RELATIONS (FILE BACKEND)
// =============================================================================

#[test]
fn connect_persists_complete_relation_in_snapshot() {
    let (_dir, path) = seeded("file");
    run(&path, "file", &["connect", "-r", "image:segmentation", "seg", "ct"]).expect("connect");

    let bytes = std::fs::read(&path).expect("read snapshot");
    let ws = workspace_from_bytes(&bytes).expect("decode");
    let rule = segmentation();
    let types = ws.relation_types(&rule, "seg", "ct").expect("types");
    assert!(types.contains(&RelationType::Complete));
    assert_eq!(
        ws.relation_uid(&rule, "seg", "ct").expect("uid").as_str(),
        "rel-1"
    );
}

#[test]
fn sequential_uids_resume_after_reload() {
    let (_dir, path) = seeded("file");
    run(
        &path,
        "file",
        &["add", "mr", "--uid", "mr-1", "--kind", "image", "-p", "DICOM.0008.0018=mr-1"],
    )
    .expect("add mr");
    run(&path, "file", &["connect", "-r", "image:segmentation", "seg", "ct"]).expect("first");
    run(&path, "file", &["connect", "-r", "image:segmentation", "seg", "mr"]).expect("second");

    let ws = load_workspace(&settings(&path, Backend::File)).expect("load");
    let rule = segmentation();
    assert_eq!(
        ws.relation_uid(&rule, "seg", "mr").expect("uid").as_str(),
        "rel-2"
    );
}

#[test]
fn disconnect_id_layer_leaves_data_layer() {
    let (_dir, path) = seeded("file");
    run(&path, "file", &["connect", "-r", "image:segmentation", "seg", "ct"]).expect("connect");
    run(
        &path,
        "file",
        &["disconnect", "-r", "image:segmentation", "seg", "ct", "--layer", "id"],
    )
    .expect("disconnect");

    let ws = load_workspace(&settings(&path, Backend::File)).expect("load");
    let rule = segmentation();
    let types = ws.relation_types(&rule, "seg", "ct").expect("types");
    assert!(types.contains(&RelationType::Data));
    assert!(!types.contains(&RelationType::Id));
    assert!(!types.contains(&RelationType::Complete));
}

#[test]
fn disconnect_by_relation_uid() {
    let (_dir, path) = seeded("file");
    run(&path, "file", &["connect", "-r", "image:segmentation", "seg", "ct"]).expect("connect");
    run(
        &path,
        "file",
        &["disconnect", "-r", "image:segmentation", "seg", "--relation", "rel-1"],
    )
    .expect("disconnect");

    let ws = load_workspace(&settings(&path, Backend::File)).expect("load");
    let rule = segmentation();
    assert!(
        ws.existing_relations(&rule, "seg", RelationType::None)
            .expect("relations")
            .is_empty()
    );
}

#[test]
fn disconnect_requires_destination_or_relation() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("ws.db");
    let path = path.to_string_lossy().to_string();
    let parsed = Cli::try_parse_from([
        "relata",
        "-w",
        path.as_str(),
        "disconnect",
        "-r",
        "image:segmentation",
        "seg",
    ]);
    assert!(parsed.is_err());
}

#[test]
fn unknown_entity_and_rule_are_errors() {
    let (_dir, path) = seeded("file");
    assert!(run(&path, "file", &["connect", "-r", "image:segmentation", "seg", "nope"]).is_err());
    assert!(run(&path, "file", &["connect", "-r", "graph:x", "seg", "ct"]).is_err());
    assert!(run(&path, "file", &["connect", "-r", "image:", "seg", "ct"]).is_err());
}

#[test]
fn read_only_commands_succeed() {
    let (_dir, path) = seeded("file");
    run(&path, "file", &["connect", "-r", "id:derived", "seg", "ct"]).expect("connect");
    for args in [
        vec!["relations", "-r", "id:derived", "seg"],
        vec!["types", "-r", "id:derived", "seg", "ct"],
        vec!["sources", "-r", "id:derived", "ct"],
        vec!["destinations", "-r", "id:derived", "seg", "--layer", "id"],
        vec!["show", "seg"],
        vec!["status"],
        vec!["--json", "status"],
    ] {
        run(&path, "file", &args).expect("read-only command");
    }
}

// =============================================================================
// REDB BACKEND
// =============================================================================

#[test]
fn redb_backend_round_trips_relations_and_nodes() {
    let (_dir, path) = seeded("redb");
    run(&path, "redb", &["add", "seg-node", "--wraps", "seg"]).expect("add node");
    run(&path, "redb", &["connect", "-r", "id:derived", "seg-node", "ct"]).expect("connect");

    let ws = RedbStore::open(&path).expect("open").load().expect("load");
    assert_eq!(ws.len(), 3);
    assert_eq!(ws.entity("seg-node").and_then(|e| e.wraps()), Some("seg"));

    let rule = parse_rule("id:derived", Arc::new(UuidSource)).expect("rule");
    assert_eq!(
        ws.sources_of(&rule, "ct", RelationType::Id).expect("sources"),
        vec!["seg-node".to_string()]
    );
}

// =============================================================================
// SETTINGS
// =============================================================================

#[test]
fn flags_override_config_file() {
    let config = Config::from_toml(
        r#"
        workspace = "from-config.db"
        backend = "file"
        uid_source = "sequential"
        "#,
    )
    .expect("config");

    let cli = Cli::try_parse_from(["relata", "status"]).expect("parse");
    let resolved = Settings::resolve(&cli, &config);
    assert_eq!(resolved.workspace, Path::new("from-config.db"));
    assert_eq!(resolved.backend, Backend::File);
    assert_eq!(resolved.uid_mode, UidMode::Sequential);

    let cli = Cli::try_parse_from(["relata", "-w", "flag.db", "-B", "redb", "status"])
        .expect("parse");
    let resolved = Settings::resolve(&cli, &config);
    assert_eq!(resolved.workspace, Path::new("flag.db"));
    assert_eq!(resolved.backend, Backend::Redb);
}
