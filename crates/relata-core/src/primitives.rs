//! # Primitives
//!
//! Fixed constants shared by the relation engine, the persistence formats and
//! the command line front end.
//!
//! ## Key Layout
//!
//! Every relation instance lives under `<RELATIONS_ROOT>.<instanceID>`:
//!
//! ```text
//! Relations.3.relationUID     = "5f0c..."
//! Relations.3.ruleID          = "SourceImageRelation segmentation"
//! Relations.3.destinationUID  = "ct-volume-7"
//! Relations.3.<rule key>      = rule specific (e.g. a sequence position)
//! ```

/// Root segment of every ID-layer property.
pub const RELATIONS_ROOT: &str = "Relations";

/// Leaf name holding an instance's relation UID.
pub const RELATION_UID_TAG: &str = "relationUID";

/// Leaf name holding the rule ID that created an instance.
pub const RULE_ID_TAG: &str = "ruleID";

/// Leaf name holding the destination's unique id.
pub const DESTINATION_UID_TAG: &str = "destinationUID";

/// Upper bound on claim retries when allocating an instance ID or sequence
/// position against concurrent writers.
pub const MAX_CLAIM_ATTEMPTS: usize = 1024;

/// Magic bytes for the Relata binary workspace snapshot header.
pub const MAGIC_BYTES: &[u8; 4] = b"RLTA";

/// Current snapshot format version.
///
/// Increment this when making breaking changes to the serialization format.
pub const FORMAT_VERSION: u8 = 1;

// =============================================================================
// INPUT VALIDATION LIMITS
// =============================================================================

/// Maximum length of a property key accepted by the workspace.
pub const MAX_PROPERTY_KEY_LENGTH: usize = 512;

/// Maximum length of a property value accepted by the workspace (64KB).
pub const MAX_PROPERTY_VALUE_LENGTH: usize = 65536;

/// Maximum length of an entity name in a workspace.
pub const MAX_ENTITY_NAME_LENGTH: usize = 256;
