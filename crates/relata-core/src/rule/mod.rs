//! # Relation Rule Engine
//!
//! A [`RelationRule`] answers every relation question for one rule (or, for
//! an abstract rule, one family of sibling rules) by reading the flat
//! properties of a source entity.
//!
//! Evidence for a relation comes from two independent layers:
//!
//! - **ID layer**: explicit `Relations.<id>.relationUID / ruleID /
//!   destinationUID` properties, handled uniformly here.
//! - **Data layer**: rule-specific content properties, handled by the
//!   concrete rule through the [`DataLayerRule`] trait.
//!
//! A relation evidenced by both layers for the same relation UID is
//! [`RelationType::Complete`].
//!
//! ## State Machine (per source/destination pair)
//!
//! ```text
//! None ──► Implicit data ──connect──► Connected (data) ──► Connected (ID) ──► Complete
//!   ▲                                                                          │
//!   └──────────────────────────── disconnect(Complete) ────────────────────────┘
//! ```
//!
//! `disconnect(ID)` and `disconnect(Data)` strip a single layer and leave the
//! other one in place if it is still derivable.

mod detectors;
pub mod instance;

use crate::primitives::{DESTINATION_UID_TAG, RELATION_UID_TAG, RULE_ID_TAG};
use crate::property::{PropertyOwner, PropertyProvider, as_identifiable};
use crate::uid::{UidSource, UuidSource};
use crate::{InstanceId, Property, RelataError, RelationType, RelationUid, RuleId};
use instance::{InstanceIndex, claim_instance, instance_key, remove_instance};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

// =============================================================================
// DATA LAYER CONTRACT
// =============================================================================

/// One relation evidenced by a rule's data layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataRelation {
    /// The relation UID: the UID of the instance pointing at the data, or a
    /// UID derived from the data itself if no instance does.
    pub relation_uid: RelationUid,
    /// The concrete rule the data belongs to.
    pub rule_id: RuleId,
    /// The instance pointing at the data, if any.
    pub instance: Option<InstanceId>,
}

/// Identity and data-layer semantics of a concrete (or abstract) rule.
///
/// Implementors only describe their own content properties; ID-layer
/// bookkeeping, layer classification and connect/disconnect orchestration
/// are done by [`RelationRule`].
pub trait DataLayerRule: Send + Sync + fmt::Debug {
    /// ID written into `Relations.<id>.ruleID`.
    fn rule_id(&self) -> RuleId;

    /// Human readable rule name.
    fn display_name(&self) -> String;

    /// Role of the source in this relation.
    fn source_role_name(&self) -> String;

    /// Role of the destination in this relation.
    fn destination_role_name(&self) -> String;

    /// Whether the rule only detects relations of sibling rules.
    fn is_abstract(&self) -> bool;

    /// Whether instances written by `rule_id` belong to this rule.
    fn is_supported_rule_id(&self, rule_id: &str) -> bool {
        rule_id == self.rule_id().as_str()
    }

    /// Whether `entity` may act as a source.
    fn is_source_candidate(&self, _entity: &dyn PropertyProvider) -> bool {
        true
    }

    /// Whether `entity` may act as a destination.
    fn is_destination_candidate(&self, _entity: &dyn PropertyProvider) -> bool {
        true
    }

    /// Whether the data layer alone can recognise `destination` again.
    ///
    /// Rules without data-layer content never can.
    fn identifies_destination(&self, _destination: &dyn PropertyProvider) -> bool {
        false
    }

    /// Relations evidenced by the data layer of `source`, restricted to
    /// `destination` if given.
    fn data_relations(
        &self,
        source: &dyn PropertyProvider,
        destination: Option<&dyn PropertyProvider>,
        instances: &InstanceIndex,
    ) -> Result<Vec<DataRelation>, RelataError>;

    /// Write the data-layer evidence for `destination` and attach it to
    /// `instance`. Must be idempotent.
    fn connect_data_layer(
        &self,
        source: &dyn PropertyOwner,
        destination: &dyn PropertyProvider,
        instance: InstanceId,
    ) -> Result<(), RelataError>;

    /// Remove the data-layer evidence of `relation_uid`. Unknown relations
    /// are ignored.
    fn disconnect_data_layer(
        &self,
        source: &dyn PropertyOwner,
        relation_uid: &RelationUid,
        instances: &InstanceIndex,
    ) -> Result<(), RelataError>;
}

// =============================================================================
// RELATION RULE
// =============================================================================

/// The relation engine for one rule.
///
/// Cheap to clone; clones share the rule definition and UID source.
#[derive(Debug, Clone)]
pub struct RelationRule {
    rule: Arc<dyn DataLayerRule>,
    uids: Arc<dyn UidSource>,
}

impl RelationRule {
    /// Create an engine generating random relation UIDs.
    pub fn new(rule: impl DataLayerRule + 'static) -> Self {
        Self::with_uid_source(rule, Arc::new(UuidSource))
    }

    /// Create an engine with an injected UID source.
    pub fn with_uid_source(rule: impl DataLayerRule + 'static, uids: Arc<dyn UidSource>) -> Self {
        Self {
            rule: Arc::new(rule),
            uids,
        }
    }

    /// Create an engine from an already shared rule definition.
    #[must_use]
    pub fn from_shared(rule: Arc<dyn DataLayerRule>, uids: Arc<dyn UidSource>) -> Self {
        Self { rule, uids }
    }

    // -------------------------------------------------------------------------
    // Classification
    // -------------------------------------------------------------------------

    /// The rule ID.
    pub fn rule_id(&self) -> RuleId {
        self.rule.rule_id()
    }

    /// Human readable rule name.
    pub fn display_name(&self) -> String {
        self.rule.display_name()
    }

    /// Role of the source.
    pub fn source_role_name(&self) -> String {
        self.rule.source_role_name()
    }

    /// Role of the destination.
    pub fn destination_role_name(&self) -> String {
        self.rule.destination_role_name()
    }

    /// Whether the rule is abstract.
    pub fn is_abstract(&self) -> bool {
        self.rule.is_abstract()
    }

    /// Whether instances written by `rule_id` belong to this rule.
    pub fn is_supported_rule_id(&self, rule_id: &str) -> bool {
        self.rule.is_supported_rule_id(rule_id)
    }

    /// Whether `entity` may act as a source. A missing entity never can.
    pub fn is_source_candidate(&self, entity: Option<&dyn PropertyProvider>) -> bool {
        entity.is_some_and(|e| self.rule.is_source_candidate(e))
    }

    /// Whether `entity` may act as a destination. A missing entity never can.
    pub fn is_destination_candidate(&self, entity: Option<&dyn PropertyProvider>) -> bool {
        entity.is_some_and(|e| self.rule.is_destination_candidate(e))
    }

    /// Whether `entity` is the source of at least one relation of this rule.
    pub fn is_source(&self, entity: &dyn PropertyProvider) -> Result<bool, RelataError> {
        Ok(!self.existing_relations(entity, RelationType::None)?.is_empty())
    }

    // -------------------------------------------------------------------------
    // Layer evaluation
    // -------------------------------------------------------------------------

    /// ID-layer instances of this rule pointing at `destination`.
    fn id_layer_instances(
        &self,
        index: &InstanceIndex,
        destination: &dyn PropertyProvider,
    ) -> Vec<InstanceId> {
        let Some(identity) = as_identifiable(destination) else {
            return Vec::new();
        };
        let uid = identity.uid();
        index
            .with_rule(|r| self.rule.is_supported_rule_id(r))
            .filter(|(_, record)| record.destination_uid.as_deref() == Some(uid.as_str()))
            .map(|(id, _)| id)
            .collect()
    }

    /// ID-layer relation UIDs of this rule, restricted to `destination` if
    /// given.
    fn id_layer_relations(
        &self,
        index: &InstanceIndex,
        destination: Option<&dyn PropertyProvider>,
    ) -> BTreeSet<RelationUid> {
        match destination {
            Some(destination) => self
                .id_layer_instances(index, destination)
                .into_iter()
                .filter_map(|id| index.get(id).and_then(|r| r.relation_uid.clone()))
                .collect(),
            None => index
                .with_rule(|r| self.rule.is_supported_rule_id(r))
                .filter_map(|(_, r)| r.relation_uid.clone())
                .collect(),
        }
    }

    /// Data-layer relations of this rule.
    fn data_layer_relations(
        &self,
        source: &dyn PropertyProvider,
        destination: Option<&dyn PropertyProvider>,
        index: &InstanceIndex,
    ) -> Result<Vec<DataRelation>, RelataError> {
        Ok(self
            .rule
            .data_relations(source, destination, index)?
            .into_iter()
            .filter(|r| self.rule.is_supported_rule_id(r.rule_id.as_str()))
            .collect())
    }

    fn existing_relations_in(
        &self,
        source: &dyn PropertyProvider,
        index: &InstanceIndex,
        layer: RelationType,
    ) -> Result<BTreeSet<RelationUid>, RelataError> {
        let id_layer = self.id_layer_relations(index, None);
        if layer == RelationType::Id {
            return Ok(id_layer);
        }

        let data_layer: BTreeSet<RelationUid> = self
            .data_layer_relations(source, None, index)?
            .into_iter()
            .map(|r| r.relation_uid)
            .collect();

        Ok(match layer {
            RelationType::Data => data_layer,
            RelationType::Complete => id_layer.intersection(&data_layer).cloned().collect(),
            RelationType::None | RelationType::Id => id_layer.union(&data_layer).cloned().collect(),
        })
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    /// Classify the relation between `source` and `destination`.
    ///
    /// Returns a subset of `{Data, Id, Complete}`; an empty set means no
    /// relation. If the data layer reports several candidates, only the first
    /// is used.
    pub fn relation_types(
        &self,
        source: &dyn PropertyProvider,
        destination: &dyn PropertyProvider,
    ) -> Result<BTreeSet<RelationType>, RelataError> {
        let index = InstanceIndex::scan(source);
        let id_layer = self.id_layer_relations(&index, Some(destination));
        let data_layer = self.data_layer_relations(source, Some(destination), &index)?;

        if data_layer.len() > 1 {
            warn!(
                rule = %self.rule.rule_id(),
                candidates = data_layer.len(),
                used = %data_layer[0].relation_uid,
                "relation on data layer is ambiguous; first relation is used"
            );
        }

        let mut types = BTreeSet::new();
        let mut complete_uid = None;
        if let Some(first) = data_layer.first() {
            if id_layer.contains(&first.relation_uid) {
                types.insert(RelationType::Complete);
                complete_uid = Some(&first.relation_uid);
            } else {
                types.insert(RelationType::Data);
            }
        }
        if id_layer.iter().any(|uid| Some(uid) != complete_uid) {
            types.insert(RelationType::Id);
        }
        Ok(types)
    }

    /// Whether a relation of at least the required strength exists.
    ///
    /// `RelationType::None` accepts any relation. `Data` and `Id` are also
    /// satisfied by `Complete`.
    pub fn has_relation(
        &self,
        source: &dyn PropertyProvider,
        destination: &dyn PropertyProvider,
        required: RelationType,
    ) -> Result<bool, RelataError> {
        let types = self.relation_types(source, destination)?;
        Ok(match required {
            RelationType::None => !types.is_empty(),
            RelationType::Complete => types.contains(&RelationType::Complete),
            layer => types.contains(&layer) || types.contains(&RelationType::Complete),
        })
    }

    /// UIDs of all relations of this rule stored on `source`.
    ///
    /// `None` returns the union of both layers, `Complete` the relations
    /// evidenced by both, `Id`/`Data` a single layer. Sorted.
    pub fn existing_relations(
        &self,
        source: &dyn PropertyProvider,
        layer: RelationType,
    ) -> Result<Vec<RelationUid>, RelataError> {
        let index = InstanceIndex::scan(source);
        Ok(self
            .existing_relations_in(source, &index, layer)?
            .into_iter()
            .collect())
    }

    /// UIDs of all relations of this rule between the two entities.
    pub fn relation_uids(
        &self,
        source: &dyn PropertyProvider,
        destination: &dyn PropertyProvider,
    ) -> Result<Vec<RelationUid>, RelataError> {
        let index = InstanceIndex::scan(source);
        let mut uids = self.id_layer_relations(&index, Some(destination));
        uids.extend(
            self.data_layer_relations(source, Some(destination), &index)?
                .into_iter()
                .map(|r| r.relation_uid),
        );
        Ok(uids.into_iter().collect())
    }

    /// The single relation UID between the two entities.
    pub fn relation_uid(
        &self,
        source: &dyn PropertyProvider,
        destination: &dyn PropertyProvider,
    ) -> Result<RelationUid, RelataError> {
        let mut uids = self.relation_uids(source, destination)?;
        match uids.len() {
            0 => Err(RelataError::NoRelationFound(format!(
                "no '{}' relation between source and destination",
                self.rule.rule_id()
            ))),
            1 => Ok(uids.remove(0)),
            count => Err(RelataError::MultipleRelations {
                count,
                context: format!("rule '{}'", self.rule.rule_id()),
            }),
        }
    }

    // -------------------------------------------------------------------------
    // Mutation
    // -------------------------------------------------------------------------

    /// Connect `source` to `destination` and return the relation UID.
    ///
    /// Reuses the pair's ID-layer instance, else the instance attached to its
    /// data-layer evidence, else allocates a new instance. Calling it again
    /// on the same pair returns the same UID.
    ///
    /// Fails before writing anything if either entity is not a candidate of
    /// the rule, or if the destination could not be found again afterwards
    /// (no uid and no content the data layer can match).
    ///
    /// The property writes are not transactional: a failure part way leaves
    /// the already written properties in place.
    pub fn connect(
        &self,
        source: &dyn PropertyOwner,
        destination: &dyn PropertyProvider,
    ) -> Result<RelationUid, RelataError> {
        if self.rule.is_abstract() {
            return Err(RelataError::AbstractRuleMisuse(
                self.rule.rule_id().to_string(),
            ));
        }
        if !self.rule.is_source_candidate(source) {
            return Err(RelataError::InvalidSource(format!(
                "entity is not a {} for rule '{}'",
                self.rule.source_role_name(),
                self.rule.rule_id()
            )));
        }
        if !self.rule.is_destination_candidate(destination) {
            return Err(RelataError::InvalidDestination(format!(
                "entity is not a {} for rule '{}'",
                self.rule.destination_role_name(),
                self.rule.rule_id()
            )));
        }
        if as_identifiable(destination).is_none()
            && !self.rule.identifies_destination(destination)
        {
            return Err(RelataError::InvalidDestination(format!(
                "destination has no uid and no content rule '{}' can match",
                self.rule.rule_id()
            )));
        }

        let index = InstanceIndex::scan(source);
        let id_instances = self.id_layer_instances(&index, destination);
        if id_instances.len() > 1 {
            warn!(
                rule = %self.rule.rule_id(),
                instances = id_instances.len(),
                "relation on ID layer is ambiguous; first instance is used"
            );
        }

        let data_layer = self.data_layer_relations(source, Some(destination), &index)?;
        if data_layer.len() > 1 {
            warn!(
                rule = %self.rule.rule_id(),
                candidates = data_layer.len(),
                used = %data_layer[0].relation_uid,
                "relation on data layer is ambiguous; first relation is used"
            );
        }

        let has_id_layer = !id_instances.is_empty();
        let existing = id_instances
            .first()
            .copied()
            .or_else(|| data_layer.first().and_then(|r| r.instance));

        let (instance, relation_uid) = match existing {
            Some(instance) => {
                let stored = index.get(instance).and_then(|r| r.relation_uid.clone());
                let uid = match stored {
                    Some(uid) => uid,
                    None => {
                        let uid = self.uids.next_uid();
                        source.set_property(
                            &instance_key(instance, RELATION_UID_TAG)?,
                            Property::new(uid.as_str()),
                        );
                        uid
                    }
                };
                (instance, uid)
            }
            None => {
                let uid = self.uids.next_uid();
                (claim_instance(source, &uid)?, uid)
            }
        };

        source.set_property(
            &instance_key(instance, RULE_ID_TAG)?,
            Property::new(self.rule.rule_id().as_str()),
        );

        if !has_id_layer {
            if let Some(identity) = as_identifiable(destination) {
                source.set_property(
                    &instance_key(instance, DESTINATION_UID_TAG)?,
                    Property::new(identity.uid()),
                );
            }
        }

        self.rule
            .connect_data_layer(source, destination, instance)?;

        debug!(
            rule = %self.rule.rule_id(),
            instance = %instance,
            relation_uid = %relation_uid,
            "connected"
        );
        Ok(relation_uid)
    }

    /// Remove the given layer of every relation between the two entities.
    ///
    /// `RelationType::None` is treated as `Complete`.
    pub fn disconnect(
        &self,
        source: &dyn PropertyOwner,
        destination: &dyn PropertyProvider,
        layer: RelationType,
    ) -> Result<(), RelataError> {
        for uid in self.relation_uids(source, destination)? {
            self.disconnect_relation(source, &uid, layer)?;
        }
        Ok(())
    }

    /// Remove the given layer of the relation `relation_uid`.
    ///
    /// Relations unknown to this rule are left untouched.
    /// `RelationType::None` is treated as `Complete`.
    pub fn disconnect_relation(
        &self,
        source: &dyn PropertyOwner,
        relation_uid: &RelationUid,
        layer: RelationType,
    ) -> Result<(), RelataError> {
        let layer = match layer {
            RelationType::None => RelationType::Complete,
            other => other,
        };

        let index = InstanceIndex::scan(source);
        let known = self.existing_relations_in(source, &index, RelationType::None)?;
        if !known.contains(relation_uid) {
            debug!(
                rule = %self.rule.rule_id(),
                relation_uid = %relation_uid,
                "relation unknown to rule; nothing to disconnect"
            );
            return Ok(());
        }

        if layer.covers_data() {
            self.rule
                .disconnect_data_layer(source, relation_uid, &index)?;
        }
        if layer.covers_id() {
            if let Some(instance) = index.by_relation_uid(relation_uid) {
                remove_instance(source, instance);
            }
        }

        debug!(
            rule = %self.rule.rule_id(),
            relation_uid = %relation_uid,
            layer = %layer,
            "disconnected"
        );
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
