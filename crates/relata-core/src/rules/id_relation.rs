//! # ID Relation
//!
//! A relation carried by the ID layer alone. The data layer is empty, so
//! these relations are never `Data` or `Complete`.

use crate::property::{PropertyOwner, PropertyProvider};
use crate::rule::instance::InstanceIndex;
use crate::rule::{DataLayerRule, DataRelation};
use crate::{InstanceId, RelataError, RelationUid, RuleId};

/// Prefix of every ID relation rule ID.
pub const RULE_ID_PREFIX: &str = "IDRelation_";

/// Plain ID-layer relation, qualified by a tag.
///
/// An empty tag yields the abstract rule covering every tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdRelationRule {
    tag: String,
}

impl IdRelationRule {
    /// Rule for one tag (e.g. `"reference"`).
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self { tag: tag.into() }
    }

    /// The abstract rule covering every tag.
    #[must_use]
    pub fn abstract_rule() -> Self {
        Self::new("")
    }

    /// The tag; empty for the abstract rule.
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }
}

impl DataLayerRule for IdRelationRule {
    fn rule_id(&self) -> RuleId {
        RuleId(format!("{}{}", RULE_ID_PREFIX, self.tag))
    }

    fn display_name(&self) -> String {
        if self.tag.is_empty() {
            "ID relation".to_string()
        } else {
            format!("ID relation ({})", self.tag)
        }
    }

    fn source_role_name(&self) -> String {
        "source".to_string()
    }

    fn destination_role_name(&self) -> String {
        "destination".to_string()
    }

    fn is_abstract(&self) -> bool {
        self.tag.is_empty()
    }

    fn is_supported_rule_id(&self, rule_id: &str) -> bool {
        rule_id
            .strip_prefix(RULE_ID_PREFIX)
            .is_some_and(|tag| !tag.is_empty() && (self.tag.is_empty() || self.tag == tag))
    }

    fn data_relations(
        &self,
        _source: &dyn PropertyProvider,
        _destination: Option<&dyn PropertyProvider>,
        _instances: &InstanceIndex,
    ) -> Result<Vec<DataRelation>, RelataError> {
        Ok(Vec::new())
    }

    fn connect_data_layer(
        &self,
        _source: &dyn PropertyOwner,
        _destination: &dyn PropertyProvider,
        _instance: InstanceId,
    ) -> Result<(), RelataError> {
        Ok(())
    }

    fn disconnect_data_layer(
        &self,
        _source: &dyn PropertyOwner,
        _relation_uid: &RelationUid,
        _instances: &InstanceIndex,
    ) -> Result<(), RelataError> {
        Ok(())
    }
}
