//! # Core Type Definitions
//!
//! This module contains the value types shared by every part of the engine:
//! - Property values (`Property`)
//! - Relation identifiers (`RelationUid`, `InstanceId`, `RuleId`)
//! - Relation classification (`RelationType`)
//! - Error types (`RelataError`)
//!
//! ## Ordering Guarantees
//!
//! All identifier types implement `Ord` so that key sets, instance sets and
//! relation sets can be held in `BTreeMap`/`BTreeSet` and enumerated in a
//! stable order.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// =============================================================================
// PROPERTY VALUE
// =============================================================================

/// The value stored under one property key.
///
/// Relations only ever need textual values (UIDs, rule IDs, decimal indices),
/// so a property is a plain string.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Property(pub String);

impl Property {
    /// Create a new property value.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the value as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// RELATION IDENTIFIERS
// =============================================================================

/// Globally unique token identifying one relation instance.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RelationUid(pub String);

impl RelationUid {
    /// Create a relation UID from any string.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the UID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RelationUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-source slot discriminator scoping the properties of one relation
/// instance. Persisted as the decimal text of a positive integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InstanceId(pub u64);

impl InstanceId {
    /// The first instance ID handed out on an empty source.
    pub const FIRST: Self = Self(1);

    /// Parse the persisted form. Only positive decimal integers without sign
    /// or leading zeros are valid instance IDs.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        if s.is_empty() || s.starts_with('0') || !s.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        s.parse::<u64>().ok().map(Self)
    }

    /// The next instance ID, or `None` on overflow.
    #[must_use]
    pub fn next(self) -> Option<Self> {
        self.0.checked_add(1).map(Self)
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies which concrete rule owns a relation instance.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RuleId(pub String);

impl RuleId {
    /// Create a rule ID from any string.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the rule ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// RELATION TYPE
// =============================================================================

/// How strongly a relation between a source and a destination is evidenced.
///
/// The type is always derived from the stored properties, never stored.
/// The ordering `None < Data < Id < Complete` is used when a layer is passed
/// as a query filter.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub enum RelationType {
    /// No evidence at all. As a query argument: "any layer".
    #[default]
    None,
    /// Only the rule-specific content properties evidence the relation.
    Data,
    /// Only the explicit relationUID/destinationUID properties evidence it.
    Id,
    /// Both layers independently evidence the same relation instance.
    Complete,
}

impl RelationType {
    /// Whether a query for `layer` should touch the data layer.
    #[must_use]
    pub const fn covers_data(self) -> bool {
        matches!(self, Self::Data | Self::Complete)
    }

    /// Whether a query for `layer` should touch the ID layer.
    #[must_use]
    pub const fn covers_id(self) -> bool {
        matches!(self, Self::Id | Self::Complete)
    }

    /// Lower-case name used in CLI arguments and JSON output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Data => "data",
            Self::Id => "id",
            Self::Complete => "complete",
        }
    }

    /// Parse the lower-case name produced by [`RelationType::as_str`].
    pub fn parse(s: &str) -> Result<Self, RelataError> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "any" => Ok(Self::None),
            "data" => Ok(Self::Data),
            "id" => Ok(Self::Id),
            "complete" => Ok(Self::Complete),
            other => Err(RelataError::InvalidArgument(format!(
                "Unknown relation layer '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for RelationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the Relata engine.
///
/// - `NoRelationFound` is routinely recovered by callers.
/// - Ambiguity inside a layer is never an error; it is logged and the first
///   match is used.
/// - Disconnecting an unknown relation is a no-op, not an error.
#[derive(Debug, Error)]
pub enum RelataError {
    /// A required source or destination entity is missing.
    #[error("Missing required entity: {0}")]
    NullArgument(String),

    /// No relation exists between the given entities (or with the given UID).
    #[error("No relation found: {0}")]
    NoRelationFound(String),

    /// A single relation was requested but several exist.
    #[error("Relation is not unique: {count} relations match ({context})")]
    MultipleRelations { count: usize, context: String },

    /// `connect` was called on an abstract rule.
    #[error("Abstract rule '{0}' must not create relations; use a concrete rule")]
    AbstractRuleMisuse(String),

    /// The source is not a candidate for the rule.
    #[error("Invalid source: {0}")]
    InvalidSource(String),

    /// The destination lacks the content the rule's data layer needs.
    #[error("Invalid destination: {0}")]
    InvalidDestination(String),

    /// A property name could not be decoded into a key path.
    #[error("Invalid property path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    /// A rule name such as `image:<purpose>` could not be parsed.
    #[error("Invalid rule: {0}")]
    InvalidRule(String),

    /// A command argument could not be parsed.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// No free instance ID or sequence position could be claimed.
    #[error("Allocation exhausted: {0}")]
    AllocationExhausted(String),

    /// A serialization or deserialization error occurred.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(String),
}

// =============================================================================
// TESTS
// =============================================================================
