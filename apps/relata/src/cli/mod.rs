//! # Relata CLI Module
//!
//! ## Available Commands
//!
//! - `init` - Initialize a new workspace
//! - `add` - Add a data entity or a wrapper node
//! - `connect` - Connect a source to a destination
//! - `disconnect` - Remove a relation layer
//! - `relations` - List the relations stored on a source
//! - `types` - Classify the relation between two entities
//! - `sources` / `destinations` - Find related entities
//! - `show` - Show one entity
//! - `status` - Show workspace status
//!
//! Rules are named `image:<purpose>` or `id:<tag>`; an empty suffix selects
//! the abstract rule of that family.

mod commands;

use crate::config::{Backend, Config, DEFAULT_WORKSPACE, UidMode};
use clap::{Parser, Subcommand};
use relata_core::RelataError;
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Relata - property-encoded relation tracking
///
/// Records which entity was derived from which, as plain properties on the
/// derived entity.
#[derive(Parser, Debug)]
#[command(name = "relata")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to the workspace (snapshot file or redb database)
    #[arg(short = 'w', long, global = true, env = "RELATA_WORKSPACE")]
    pub workspace: Option<PathBuf>,

    /// Storage backend
    #[arg(short = 'B', long, global = true, value_enum)]
    pub backend: Option<Backend>,

    /// Relation UID generator
    #[arg(long, global = true, value_enum)]
    pub uid_source: Option<UidMode>,

    /// Path to a TOML config file
    #[arg(short, long, global = true, env = "RELATA_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a new empty workspace
    Init {
        /// Overwrite an existing workspace
        #[arg(short, long)]
        force: bool,
    },

    /// Add a data entity, or a node wrapping one
    Add {
        /// Entity name
        name: String,

        /// Unique id of a data entity
        #[arg(short, long, conflicts_with = "wraps")]
        uid: Option<String>,

        /// Data kind (e.g. "image")
        #[arg(short, long, conflicts_with = "wraps")]
        kind: Option<String>,

        /// Create a node wrapping this data entity
        #[arg(long)]
        wraps: Option<String>,

        /// Property as KEY=VALUE (repeatable)
        #[arg(short, long = "property")]
        properties: Vec<String>,
    },

    /// Connect a source to a destination
    Connect {
        /// Rule (image:<purpose> or id:<tag>)
        #[arg(short, long)]
        rule: String,
        source: String,
        destination: String,
    },

    /// Remove a relation layer
    Disconnect {
        /// Rule (image:<purpose> or id:<tag>)
        #[arg(short, long)]
        rule: String,
        source: String,

        /// Destination entity
        #[arg(required_unless_present = "relation")]
        destination: Option<String>,

        /// Relation UID instead of a destination
        #[arg(long, conflicts_with = "destination")]
        relation: Option<String>,

        /// Layer to remove (data, id, complete)
        #[arg(short, long, default_value = "complete")]
        layer: String,
    },

    /// List the relation UIDs stored on a source
    Relations {
        #[arg(short, long)]
        rule: String,
        source: String,

        /// Layer filter (any, data, id, complete)
        #[arg(short, long, default_value = "any")]
        layer: String,
    },

    /// Classify the relation between two entities
    Types {
        #[arg(short, long)]
        rule: String,
        source: String,
        destination: String,
    },

    /// Entities related to a destination as sources
    Sources {
        #[arg(short, long)]
        rule: String,
        destination: String,
        #[arg(short, long, default_value = "any")]
        layer: String,
    },

    /// Entities a source is related to
    Destinations {
        #[arg(short, long)]
        rule: String,
        source: String,
        #[arg(short, long, default_value = "any")]
        layer: String,
    },

    /// Show one entity and its properties
    Show { name: String },

    /// Show workspace status
    Status,
}

// =============================================================================
// SETTINGS
// =============================================================================

/// Effective settings after merging flags over the config file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub workspace: PathBuf,
    pub backend: Backend,
    pub uid_mode: UidMode,
    pub json: bool,
}

impl Settings {
    #[must_use]
    pub fn resolve(cli: &Cli, config: &Config) -> Self {
        Self {
            workspace: cli
                .workspace
                .clone()
                .or_else(|| config.workspace.clone())
                .unwrap_or_else(|| PathBuf::from(DEFAULT_WORKSPACE)),
            backend: cli.backend.or(config.backend).unwrap_or_default(),
            uid_mode: cli.uid_source.or(config.uid_source).unwrap_or_default(),
            json: cli.json,
        }
    }
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub fn execute(cli: Cli, config: &Config) -> Result<(), RelataError> {
    let settings = Settings::resolve(&cli, config);

    match cli.command {
        Some(Commands::Init { force }) => cmd_init(&settings, force),
        Some(Commands::Add {
            name,
            uid,
            kind,
            wraps,
            properties,
        }) => cmd_add(&settings, &name, uid, kind, wraps.as_deref(), &properties),
        Some(Commands::Connect {
            rule,
            source,
            destination,
        }) => cmd_connect(&settings, &rule, &source, &destination),
        Some(Commands::Disconnect {
            rule,
            source,
            destination,
            relation,
            layer,
        }) => cmd_disconnect(
            &settings,
            &rule,
            &source,
            destination.as_deref(),
            relation.as_deref(),
            &layer,
        ),
        Some(Commands::Relations {
            rule,
            source,
            layer,
        }) => cmd_relations(&settings, &rule, &source, &layer),
        Some(Commands::Types {
            rule,
            source,
            destination,
        }) => cmd_types(&settings, &rule, &source, &destination),
        Some(Commands::Sources {
            rule,
            destination,
            layer,
        }) => cmd_sources(&settings, &rule, &destination, &layer),
        Some(Commands::Destinations {
            rule,
            source,
            layer,
        }) => cmd_destinations(&settings, &rule, &source, &layer),
        Some(Commands::Show { name }) => cmd_show(&settings, &name),
        Some(Commands::Status) | None => cmd_status(&settings),
    }
}
