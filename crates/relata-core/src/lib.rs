//! # relata-core
//!
//! The relation-tracking engine for Relata.
//!
//! Data entities declare directed, purpose-tagged relations to other
//! entities ("this segmentation was computed from that CT image") without a
//! graph store: every relation is encoded as flat key/value properties on
//! its source entity.
//!
//! ## Layers
//!
//! - **ID layer**: explicit `Relations.<id>.relationUID / ruleID /
//!   destinationUID` properties, uniform for every rule ([`rule`]).
//! - **Data layer**: rule-specific content properties ([`rules`]).
//!
//! ## Architectural Constraints
//!
//! - Synchronous: no async, no network, no I/O in the rule layer.
//! - Deterministic enumeration: keys and relation sets are ordered.
//! - Persistence ([`formats`], [`storage`]) operates on whole
//!   [`Workspace`]s and is never touched by the rule engine.

// =============================================================================
// MODULES
// =============================================================================

pub mod formats;
pub mod path;
pub mod predicate;
pub mod primitives;
pub mod property;
pub mod rule;
pub mod rules;
pub mod storage;
pub mod types;
pub mod uid;
pub mod workspace;

// =============================================================================
// RE-EXPORTS: Core Types
// =============================================================================

pub use types::{InstanceId, Property, RelataError, RelationType, RelationUid, RuleId};

// =============================================================================
// RE-EXPORTS: Engine
// =============================================================================

pub use path::{
    KeyPattern, PathSegment, PropertyKeyPath, name_to_path, path_to_match_pattern, path_to_name,
};
pub use predicate::{EntityPredicate, FnPredicate};
pub use property::{
    DataEntity, EntityNode, Identifiable, PropertyMap, PropertyOwner, PropertyProvider,
    as_identifiable, data_kind_of,
};
pub use rule::{DataLayerRule, DataRelation, RelationRule};
pub use rules::{IdRelationRule, SourceImageRule, parse_rule};
pub use uid::{SequentialUidSource, UidSource, UuidSource};

// =============================================================================
// RE-EXPORTS: Persistence
// =============================================================================

pub use formats::{PersistenceHeader, workspace_from_bytes, workspace_to_bytes};
pub use storage::RedbStore;
pub use workspace::{Entity, SerializableWorkspace, Workspace};
