//! # Property Providers and Owners
//!
//! The engine never sees concrete entity types. It reads relation evidence
//! through [`PropertyProvider`], writes it through [`PropertyOwner`], and asks
//! for identity through the optional [`Identifiable`] capability.
//!
//! ## Capability Lookup
//!
//! Hosting applications often wrap the actual data in a thin container (a
//! scene node holding an image). Capabilities are therefore looked up in two
//! steps: the entity itself first, then its wrapped data
//! ([`as_identifiable`], [`data_kind_of`]).
//!
//! ## Concurrency
//!
//! Property access is synchronized by the hosting entity. [`PropertyMap`]
//! does so with a `parking_lot::RwLock`, and provides the atomic
//! insert-if-absent that slot allocation relies on.

use crate::Property;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

// =============================================================================
// TRAITS
// =============================================================================

/// Read-only access to an entity's flat property map.
pub trait PropertyProvider: Send + Sync {
    /// Get the property stored under `key`.
    fn property(&self, key: &str) -> Option<Property>;

    /// All property keys, in ascending order.
    fn property_keys(&self) -> Vec<String>;

    /// The entity's own identity capability, if it has one.
    fn identifiable(&self) -> Option<&dyn Identifiable> {
        None
    }

    /// The data wrapped by a thin container entity.
    fn wrapped_data(&self) -> Option<&dyn PropertyProvider> {
        None
    }

    /// Kind of data this entity holds (e.g. `"image"`).
    fn data_kind(&self) -> Option<&str> {
        None
    }
}

/// Read-write access to an entity's flat property map.
pub trait PropertyOwner: PropertyProvider {
    /// Store `value` under `key`, replacing any previous value.
    fn set_property(&self, key: &str, value: Property);

    /// Store `value` under `key` only if the key is absent.
    ///
    /// Must be atomic with respect to other writers of the same entity.
    /// Returns `true` if the value was stored.
    fn insert_property_if_absent(&self, key: &str, value: Property) -> bool;

    /// Remove `key`. Returns `true` if it was present.
    fn remove_property(&self, key: &str) -> bool;
}

/// An entity with a stable unique identifier.
pub trait Identifiable {
    /// The entity's unique id.
    fn uid(&self) -> String;
}

/// Look up the identity capability of an entity, falling back to the data it
/// wraps.
pub fn as_identifiable(entity: &dyn PropertyProvider) -> Option<&dyn Identifiable> {
    entity
        .identifiable()
        .or_else(|| entity.wrapped_data().and_then(|d| d.identifiable()))
}

/// Look up the data kind of an entity, falling back to the data it wraps.
pub fn data_kind_of(entity: &dyn PropertyProvider) -> Option<&str> {
    entity
        .data_kind()
        .or_else(|| entity.wrapped_data().and_then(|d| d.data_kind()))
}

/// Read a property from an entity, falling back to the data it wraps.
pub fn content_property(entity: &dyn PropertyProvider, key: &str) -> Option<Property> {
    entity
        .property(key)
        .or_else(|| entity.wrapped_data().and_then(|d| d.property(key)))
}

// =============================================================================
// PROPERTY MAP
// =============================================================================

/// A thread-safe, ordered property map.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(
    from = "BTreeMap<String, Property>",
    into = "BTreeMap<String, Property>"
)]
pub struct PropertyMap {
    entries: RwLock<BTreeMap<String, Property>>,
}

impl PropertyMap {
    /// Create an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all entries.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, Property> {
        self.entries.read().clone()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the map is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Clone for PropertyMap {
    fn clone(&self) -> Self {
        Self::from(self.snapshot())
    }
}

impl PartialEq for PropertyMap {
    fn eq(&self, other: &Self) -> bool {
        self.snapshot() == other.snapshot()
    }
}

impl From<BTreeMap<String, Property>> for PropertyMap {
    fn from(entries: BTreeMap<String, Property>) -> Self {
        Self {
            entries: RwLock::new(entries),
        }
    }
}

impl From<PropertyMap> for BTreeMap<String, Property> {
    fn from(map: PropertyMap) -> Self {
        map.entries.into_inner()
    }
}

impl PropertyProvider for PropertyMap {
    fn property(&self, key: &str) -> Option<Property> {
        self.entries.read().get(key).cloned()
    }

    fn property_keys(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }
}

impl PropertyOwner for PropertyMap {
    fn set_property(&self, key: &str, value: Property) {
        self.entries.write().insert(key.to_string(), value);
    }

    fn insert_property_if_absent(&self, key: &str, value: Property) -> bool {
        let mut entries = self.entries.write();
        if entries.contains_key(key) {
            return false;
        }
        entries.insert(key.to_string(), value);
        true
    }

    fn remove_property(&self, key: &str) -> bool {
        self.entries.write().remove(key).is_some()
    }
}

// =============================================================================
// DATA ENTITY
// =============================================================================

/// A data object carrying properties, an optional unique id and an optional
/// data kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataEntity {
    uid: Option<String>,
    kind: Option<String>,
    properties: PropertyMap,
}

impl DataEntity {
    /// Create an anonymous entity without a uid or kind.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an identifiable entity.
    #[must_use]
    pub fn with_uid(uid: impl Into<String>) -> Self {
        Self {
            uid: Some(uid.into()),
            ..Self::default()
        }
    }

    /// Create an entity from its parts.
    #[must_use]
    pub fn from_parts(uid: Option<String>, kind: Option<String>, properties: PropertyMap) -> Self {
        Self {
            uid,
            kind,
            properties,
        }
    }

    /// Set the data kind.
    #[must_use]
    pub fn kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    /// Add a property (builder style).
    #[must_use]
    pub fn property_value(self, key: &str, value: impl Into<String>) -> Self {
        self.properties.set_property(key, Property::new(value));
        self
    }

    /// The entity's uid, if any.
    #[must_use]
    pub fn uid_opt(&self) -> Option<&str> {
        self.uid.as_deref()
    }

    /// The entity's property map.
    #[must_use]
    pub fn properties(&self) -> &PropertyMap {
        &self.properties
    }
}

impl Identifiable for DataEntity {
    fn uid(&self) -> String {
        self.uid.clone().unwrap_or_default()
    }
}

impl PropertyProvider for DataEntity {
    fn property(&self, key: &str) -> Option<Property> {
        self.properties.property(key)
    }

    fn property_keys(&self) -> Vec<String> {
        self.properties.property_keys()
    }

    fn identifiable(&self) -> Option<&dyn Identifiable> {
        self.uid.as_ref().map(|_| self as &dyn Identifiable)
    }

    fn data_kind(&self) -> Option<&str> {
        self.kind.as_deref()
    }
}

impl PropertyOwner for DataEntity {
    fn set_property(&self, key: &str, value: Property) {
        self.properties.set_property(key, value);
    }

    fn insert_property_if_absent(&self, key: &str, value: Property) -> bool {
        self.properties.insert_property_if_absent(key, value)
    }

    fn remove_property(&self, key: &str) -> bool {
        self.properties.remove_property(key)
    }
}

// =============================================================================
// ENTITY NODE (thin wrapper)
// =============================================================================

/// A thin container around shared data.
///
/// The node has its own property map (relations written to a node are stored
/// on the node) but no identity of its own; identity and data kind are
/// resolved through the wrapped data.
#[derive(Debug, Clone, Default)]
pub struct EntityNode {
    properties: PropertyMap,
    data: Option<Arc<DataEntity>>,
}

impl EntityNode {
    /// Create a node wrapping `data`.
    #[must_use]
    pub fn new(data: Arc<DataEntity>) -> Self {
        Self {
            properties: PropertyMap::new(),
            data: Some(data),
        }
    }

    /// Create a node without data.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Create a node from its parts.
    #[must_use]
    pub fn from_parts(properties: PropertyMap, data: Option<Arc<DataEntity>>) -> Self {
        Self { properties, data }
    }

    /// The wrapped data, if any.
    #[must_use]
    pub fn data(&self) -> Option<&Arc<DataEntity>> {
        self.data.as_ref()
    }

    /// The node's own property map.
    #[must_use]
    pub fn properties(&self) -> &PropertyMap {
        &self.properties
    }
}

impl PropertyProvider for EntityNode {
    fn property(&self, key: &str) -> Option<Property> {
        self.properties.property(key)
    }

    fn property_keys(&self) -> Vec<String> {
        self.properties.property_keys()
    }

    fn wrapped_data(&self) -> Option<&dyn PropertyProvider> {
        self.data.as_deref().map(|d| d as &dyn PropertyProvider)
    }
}

impl PropertyOwner for EntityNode {
    fn set_property(&self, key: &str, value: Property) {
        self.properties.set_property(key, value);
    }

    fn insert_property_if_absent(&self, key: &str, value: Property) -> bool {
        self.properties.insert_property_if_absent(key, value)
    }

    fn remove_property(&self, key: &str) -> bool {
        self.properties.remove_property(key)
    }
}

// =============================================================================
// TESTS
// =============================================================================
