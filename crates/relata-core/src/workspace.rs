//! # Workspace
//!
//! A named collection of entities plus a facade that runs rule operations by
//! entity name. The facade is where missing entities surface as
//! [`RelataError::NullArgument`]; the rule engine itself only ever sees
//! references.
//!
//! Entities come in two shapes:
//! - `Data`: a [`DataEntity`] with optional uid and kind.
//! - `Node`: a thin [`EntityNode`] wrapping another `Data` entity by name.
//!
//! A node shares its wrapped entity (`Arc`), so properties written to the
//! data entity are visible through every node wrapping it.

use crate::predicate::{EntityPredicate, filter};
use crate::primitives::{
    MAX_ENTITY_NAME_LENGTH, MAX_PROPERTY_KEY_LENGTH, MAX_PROPERTY_VALUE_LENGTH,
};
use crate::property::{
    DataEntity, EntityNode, PropertyMap, PropertyOwner, PropertyProvider, as_identifiable,
    data_kind_of,
};
use crate::rule::RelationRule;
use crate::rule::instance::InstanceIndex;
use crate::{Property, RelataError, RelationType, RelationUid};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

// =============================================================================
// ENTITY
// =============================================================================

/// One entity held by a [`Workspace`].
#[derive(Debug, Clone)]
pub enum Entity {
    Data(Arc<DataEntity>),
    Node {
        /// Name of the wrapped data entity.
        wraps: Option<String>,
        node: Arc<EntityNode>,
    },
}

impl Entity {
    /// Read-write view used as a relation source.
    #[must_use]
    pub fn owner(&self) -> &dyn PropertyOwner {
        match self {
            Self::Data(data) => data.as_ref(),
            Self::Node { node, .. } => node.as_ref(),
        }
    }

    /// Read-only view used as a relation destination.
    #[must_use]
    pub fn provider(&self) -> &dyn PropertyProvider {
        self.owner()
    }

    /// Shared handle for predicates that outlive the borrow.
    #[must_use]
    pub fn shared(&self) -> Arc<dyn PropertyProvider> {
        match self {
            Self::Data(data) => Arc::clone(data) as Arc<dyn PropertyProvider>,
            Self::Node { node, .. } => Arc::clone(node) as Arc<dyn PropertyProvider>,
        }
    }

    /// The resolved uid (own, or the wrapped data's).
    #[must_use]
    pub fn uid(&self) -> Option<String> {
        as_identifiable(self.provider()).map(|i| i.uid())
    }

    /// The resolved data kind.
    #[must_use]
    pub fn kind(&self) -> Option<&str> {
        data_kind_of(self.provider())
    }

    /// Name of the wrapped data entity, for nodes.
    #[must_use]
    pub fn wraps(&self) -> Option<&str> {
        match self {
            Self::Data(_) => None,
            Self::Node { wraps, .. } => wraps.as_deref(),
        }
    }

    /// Whether this is a thin wrapper node.
    #[must_use]
    pub const fn is_node(&self) -> bool {
        matches!(self, Self::Node { .. })
    }
}

// =============================================================================
// WORKSPACE
// =============================================================================

/// Named entities and name-based relation operations.
#[derive(Debug, Clone, Default)]
pub struct Workspace {
    entities: BTreeMap<String, Entity>,
}

fn validate_name(name: &str) -> Result<(), RelataError> {
    if name.is_empty() {
        return Err(RelataError::InvalidArgument(
            "entity name must not be empty".to_string(),
        ));
    }
    if name.len() > MAX_ENTITY_NAME_LENGTH {
        return Err(RelataError::InvalidArgument(format!(
            "entity name exceeds {} bytes",
            MAX_ENTITY_NAME_LENGTH
        )));
    }
    Ok(())
}

fn validate_property(key: &str, value: &str) -> Result<(), RelataError> {
    if key.is_empty() || key.len() > MAX_PROPERTY_KEY_LENGTH {
        return Err(RelataError::InvalidArgument(format!(
            "property key must be 1..={} bytes",
            MAX_PROPERTY_KEY_LENGTH
        )));
    }
    if value.len() > MAX_PROPERTY_VALUE_LENGTH {
        return Err(RelataError::InvalidArgument(format!(
            "property value exceeds {} bytes",
            MAX_PROPERTY_VALUE_LENGTH
        )));
    }
    Ok(())
}

impl Workspace {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Whether the workspace holds no entities.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Entity names in ascending order.
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.entities.keys().map(String::as_str)
    }

    /// All entities in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Entity)> + '_ {
        self.entities.iter().map(|(n, e)| (n.as_str(), e))
    }

    /// Look up an entity.
    #[must_use]
    pub fn entity(&self, name: &str) -> Option<&Entity> {
        self.entities.get(name)
    }

    /// Look up an entity that must exist.
    pub fn resolve(&self, name: &str) -> Result<&Entity, RelataError> {
        self.entities
            .get(name)
            .ok_or_else(|| RelataError::NullArgument(format!("no entity named '{}'", name)))
    }

    fn ensure_free(&self, name: &str) -> Result<(), RelataError> {
        validate_name(name)?;
        if self.entities.contains_key(name) {
            return Err(RelataError::InvalidArgument(format!(
                "entity '{}' already exists",
                name
            )));
        }
        Ok(())
    }

    /// Add a data entity.
    pub fn add_data(&mut self, name: &str, data: DataEntity) -> Result<(), RelataError> {
        self.ensure_free(name)?;
        for (key, value) in data.properties().snapshot() {
            validate_property(&key, value.as_str())?;
        }
        self.entities
            .insert(name.to_string(), Entity::Data(Arc::new(data)));
        Ok(())
    }

    /// Add a thin node wrapping the data entity `wraps`.
    pub fn add_node(&mut self, name: &str, wraps: Option<&str>) -> Result<(), RelataError> {
        self.ensure_free(name)?;
        let node = match wraps {
            Some(target) => match self.resolve(target)? {
                Entity::Data(data) => EntityNode::new(Arc::clone(data)),
                Entity::Node { .. } => {
                    return Err(RelataError::InvalidArgument(format!(
                        "'{}' is a node; nodes can only wrap data entities",
                        target
                    )));
                }
            },
            None => EntityNode::empty(),
        };
        self.entities.insert(
            name.to_string(),
            Entity::Node {
                wraps: wraps.map(str::to_string),
                node: Arc::new(node),
            },
        );
        Ok(())
    }

    /// Set a property on an entity.
    pub fn set_property(&self, name: &str, key: &str, value: &str) -> Result<(), RelataError> {
        validate_property(key, value)?;
        self.resolve(name)?
            .owner()
            .set_property(key, Property::new(value));
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Relation facade
    // -------------------------------------------------------------------------

    pub fn connect(
        &self,
        rule: &RelationRule,
        source: &str,
        destination: &str,
    ) -> Result<RelationUid, RelataError> {
        let source = self.resolve(source)?;
        let destination = self.resolve(destination)?;
        rule.connect(source.owner(), destination.provider())
    }

    pub fn disconnect(
        &self,
        rule: &RelationRule,
        source: &str,
        destination: &str,
        layer: RelationType,
    ) -> Result<(), RelataError> {
        let source = self.resolve(source)?;
        let destination = self.resolve(destination)?;
        rule.disconnect(source.owner(), destination.provider(), layer)
    }

    pub fn disconnect_relation(
        &self,
        rule: &RelationRule,
        source: &str,
        relation_uid: &RelationUid,
        layer: RelationType,
    ) -> Result<(), RelataError> {
        rule.disconnect_relation(self.resolve(source)?.owner(), relation_uid, layer)
    }

    pub fn relation_types(
        &self,
        rule: &RelationRule,
        source: &str,
        destination: &str,
    ) -> Result<BTreeSet<RelationType>, RelataError> {
        rule.relation_types(
            self.resolve(source)?.provider(),
            self.resolve(destination)?.provider(),
        )
    }

    pub fn relation_uid(
        &self,
        rule: &RelationRule,
        source: &str,
        destination: &str,
    ) -> Result<RelationUid, RelataError> {
        rule.relation_uid(
            self.resolve(source)?.provider(),
            self.resolve(destination)?.provider(),
        )
    }

    pub fn existing_relations(
        &self,
        rule: &RelationRule,
        source: &str,
        layer: RelationType,
    ) -> Result<Vec<RelationUid>, RelataError> {
        rule.existing_relations(self.resolve(source)?.provider(), layer)
    }

    /// Names of the entities satisfying `predicate`.
    pub fn select(&self, predicate: &dyn EntityPredicate) -> Vec<String> {
        filter(self.iter(), predicate, |(_, e)| e.provider())
            .into_iter()
            .map(|(name, _)| name.to_string())
            .collect()
    }

    /// Names of the entities related to `destination` as sources.
    pub fn sources_of(
        &self,
        rule: &RelationRule,
        destination: &str,
        layer: RelationType,
    ) -> Result<Vec<String>, RelataError> {
        let detector = rule.sources_detector(self.resolve(destination)?.shared(), layer);
        Ok(self.select(&detector))
    }

    /// Names of the entities `source` is related to as destinations.
    pub fn destinations_of(
        &self,
        rule: &RelationRule,
        source: &str,
        layer: RelationType,
    ) -> Result<Vec<String>, RelataError> {
        let detector = rule.destinations_detector(self.resolve(source)?.shared(), layer);
        Ok(self.select(&detector))
    }

    /// Highest `n` among relation UIDs of the form `<prefix>-<n>`.
    ///
    /// Used to resume a sequential UID source after reopening a workspace.
    #[must_use]
    pub fn highest_sequential_uid(&self, prefix: &str) -> u64 {
        let lead = format!("{}-", prefix);
        self.entities
            .values()
            .flat_map(|e| {
                InstanceIndex::scan(e.provider())
                    .iter()
                    .filter_map(|(_, r)| r.relation_uid.clone())
                    .collect::<Vec<_>>()
            })
            .filter_map(|uid| uid.as_str().strip_prefix(&lead)?.parse::<u64>().ok())
            .max()
            .unwrap_or(0)
    }
}

// =============================================================================
// SERIALIZABLE FORM
// =============================================================================

/// Shape of a persisted entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityShape {
    Data {
        uid: Option<String>,
        kind: Option<String>,
    },
    Node {
        wraps: Option<String>,
    },
}

/// One persisted entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub name: String,
    pub shape: EntityShape,
    pub properties: BTreeMap<String, Property>,
}

/// Serializable form of a [`Workspace`]. Records are in name order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializableWorkspace {
    pub entities: Vec<EntityRecord>,
}

impl From<&Workspace> for SerializableWorkspace {
    fn from(workspace: &Workspace) -> Self {
        let entities = workspace
            .iter()
            .map(|(name, entity)| {
                let (shape, properties) = match entity {
                    Entity::Data(data) => (
                        EntityShape::Data {
                            uid: data.uid_opt().map(str::to_string),
                            kind: data.data_kind().map(str::to_string),
                        },
                        data.properties().snapshot(),
                    ),
                    Entity::Node { wraps, node } => (
                        EntityShape::Node {
                            wraps: wraps.clone(),
                        },
                        node.properties().snapshot(),
                    ),
                };
                EntityRecord {
                    name: name.to_string(),
                    shape,
                    properties,
                }
            })
            .collect();
        Self { entities }
    }
}

impl TryFrom<SerializableWorkspace> for Workspace {
    type Error = RelataError;

    fn try_from(sw: SerializableWorkspace) -> Result<Self, Self::Error> {
        let mut workspace = Workspace::new();
        let mut nodes = Vec::new();

        for record in sw.entities {
            match record.shape {
                EntityShape::Data { uid, kind } => {
                    let data =
                        DataEntity::from_parts(uid, kind, PropertyMap::from(record.properties));
                    workspace.add_data(&record.name, data)?;
                }
                EntityShape::Node { wraps } => nodes.push((record.name, wraps, record.properties)),
            }
        }

        // Nodes last: their wrapped data must already be present.
        for (name, wraps, properties) in nodes {
            workspace
                .add_node(&name, wraps.as_deref())
                .map_err(|e| {
                    RelataError::SerializationError(format!("node '{}': {}", name, e))
                })?;
            let entity = workspace.resolve(&name)?;
            for (key, value) in properties {
                validate_property(&key, value.as_str())?;
                entity.owner().set_property(&key, value);
            }
        }

        Ok(workspace)
    }
}

// =============================================================================
// TESTS
// =============================================================================
