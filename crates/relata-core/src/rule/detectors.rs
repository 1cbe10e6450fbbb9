//! Predicate factories: rule queries wrapped as [`EntityPredicate`]s.
//!
//! Query errors inside a predicate are logged and count as "no match".

use super::RelationRule;
use crate::predicate::{EntityPredicate, FnPredicate};
use crate::property::PropertyProvider;
use crate::{RelataError, RelationType, RelationUid};
use std::sync::Arc;
use tracing::warn;

fn settle(rule: &RelationRule, what: &str, result: Result<bool, RelataError>) -> bool {
    result.unwrap_or_else(|e| {
        warn!(rule = %rule.rule_id(), check = what, error = %e, "relation check failed");
        false
    })
}

impl RelationRule {
    /// Matches entities that may act as a source of this rule.
    pub fn source_candidate_indicator(&self) -> impl EntityPredicate + 'static {
        let rule = self.clone();
        FnPredicate::new(
            format!("source candidate of '{}'", self.rule_id()),
            move |e| rule.is_source_candidate(e),
        )
    }

    /// Matches entities that may act as a destination of this rule.
    pub fn destination_candidate_indicator(&self) -> impl EntityPredicate + 'static {
        let rule = self.clone();
        FnPredicate::new(
            format!("destination candidate of '{}'", self.rule_id()),
            move |e| rule.is_destination_candidate(e),
        )
    }

    /// Matches entities that are the source of any relation of this rule.
    pub fn connected_sources_detector(&self) -> impl EntityPredicate + 'static {
        let rule = self.clone();
        FnPredicate::new(
            format!("connected source of '{}'", self.rule_id()),
            move |e| e.is_some_and(|e| settle(&rule, "is_source", rule.is_source(e))),
        )
    }

    /// Matches sources related to `destination` with at least `layer`.
    pub fn sources_detector(
        &self,
        destination: Arc<dyn PropertyProvider>,
        layer: RelationType,
    ) -> impl EntityPredicate + 'static {
        let rule = self.clone();
        FnPredicate::new(
            format!("source of '{}' ({})", self.rule_id(), layer),
            move |e| {
                e.is_some_and(|source| {
                    settle(
                        &rule,
                        "sources",
                        rule.has_relation(source, destination.as_ref(), layer),
                    )
                })
            },
        )
    }

    /// Matches destinations `source` is related to with at least `layer`.
    pub fn destinations_detector(
        &self,
        source: Arc<dyn PropertyProvider>,
        layer: RelationType,
    ) -> impl EntityPredicate + 'static {
        let rule = self.clone();
        FnPredicate::new(
            format!("destination of '{}' ({})", self.rule_id(), layer),
            move |e| {
                e.is_some_and(|destination| {
                    settle(
                        &rule,
                        "destinations",
                        rule.has_relation(source.as_ref(), destination, layer),
                    )
                })
            },
        )
    }

    /// Matches the destination of the relation `relation_uid` stored on
    /// `source`.
    ///
    /// Fails with [`RelataError::NoRelationFound`] if `source` holds no such
    /// relation.
    pub fn destination_detector(
        &self,
        source: Arc<dyn PropertyProvider>,
        relation_uid: RelationUid,
    ) -> Result<impl EntityPredicate + 'static, RelataError> {
        if !self
            .existing_relations(source.as_ref(), RelationType::None)?
            .contains(&relation_uid)
        {
            return Err(RelataError::NoRelationFound(format!(
                "relation '{}' is not stored on the source for rule '{}'",
                relation_uid,
                self.rule_id()
            )));
        }

        let rule = self.clone();
        Ok(FnPredicate::new(
            format!("destination of relation '{}'", relation_uid),
            move |e| {
                e.is_some_and(|destination| {
                    settle(
                        &rule,
                        "destination",
                        rule.relation_uids(source.as_ref(), destination)
                            .map(|uids| uids.contains(&relation_uid)),
                    )
                })
            },
        ))
    }
}
