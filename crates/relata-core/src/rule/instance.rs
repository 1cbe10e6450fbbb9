//! # Relation Instances (ID layer)
//!
//! Every relation instance owns the properties under
//! `Relations.<instanceID>` on its source. This module enumerates those
//! instances, builds their keys, allocates new instance IDs and removes
//! instances.
//!
//! ## Allocation
//!
//! A new instance ID is `max(existing) + 1`, taken from a snapshot of the
//! source's keys and then claimed by inserting the instance's relationUID
//! property with [`PropertyOwner::insert_property_if_absent`]. A lost claim
//! means another writer took that ID; the snapshot is retaken and the next ID
//! tried. Sources never share a lock.

use crate::path::{
    KeyPattern, PathSegment, PropertyKeyPath, name_to_path, path_to_match_pattern, path_to_name,
};
use crate::primitives::{
    DESTINATION_UID_TAG, MAX_CLAIM_ATTEMPTS, RELATION_UID_TAG, RELATIONS_ROOT, RULE_ID_TAG,
};
use crate::property::{PropertyOwner, PropertyProvider};
use crate::{InstanceId, Property, RelataError, RelationUid, RuleId};
use std::collections::BTreeMap;
use tracing::{debug, trace, warn};

// =============================================================================
// KEYS
// =============================================================================

/// Path of an instance's root: `Relations.<id>`.
#[must_use]
pub fn instance_root(id: InstanceId) -> PropertyKeyPath {
    PropertyKeyPath::new()
        .name(RELATIONS_ROOT)
        .name(id.to_string())
}

/// Flat name of an instance property: `Relations.<id>.<leaf>`.
pub fn instance_key(id: InstanceId, leaf: &str) -> Result<String, RelataError> {
    path_to_name(&instance_root(id).name(leaf))
}

/// Pattern matching every key of every instance, capturing the instance ID.
fn any_instance_pattern() -> KeyPattern {
    path_to_match_pattern(&PropertyKeyPath::new().name(RELATIONS_ROOT).any_name())
}

// =============================================================================
// INSTANCE INDEX
// =============================================================================

/// The ID-layer properties of one instance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstanceRecord {
    /// `Relations.<id>.relationUID`
    pub relation_uid: Option<RelationUid>,
    /// `Relations.<id>.ruleID`
    pub rule_id: Option<RuleId>,
    /// `Relations.<id>.destinationUID`
    pub destination_uid: Option<String>,
    /// Every property key under the instance root.
    pub keys: Vec<String>,
}

/// Snapshot of all relation instances stored on one source.
#[derive(Debug, Clone, Default)]
pub struct InstanceIndex {
    instances: BTreeMap<InstanceId, InstanceRecord>,
}

impl InstanceIndex {
    /// Enumerate the instances of `source`.
    ///
    /// Keys under the root whose instance segment is not a positive decimal
    /// integer are ignored.
    pub fn scan(source: &dyn PropertyProvider) -> Self {
        let pattern = any_instance_pattern();
        let mut instances: BTreeMap<InstanceId, InstanceRecord> = BTreeMap::new();

        for key in source.property_keys() {
            let Ok(path) = name_to_path(&key) else {
                continue;
            };
            let Some(captures) = pattern.prefix_captures(&path) else {
                continue;
            };
            let Some(id) = captures
                .first()
                .and_then(|c| c.as_name())
                .and_then(InstanceId::parse)
            else {
                continue;
            };

            let record = instances.entry(id).or_default();
            if let [_, _, PathSegment::Name(leaf)] = path.segments() {
                let value = source.property(&key);
                match leaf.as_str() {
                    RELATION_UID_TAG => {
                        record.relation_uid = value.map(|v| RelationUid(v.0));
                    }
                    RULE_ID_TAG => record.rule_id = value.map(|v| RuleId(v.0)),
                    DESTINATION_UID_TAG => record.destination_uid = value.map(|v| v.0),
                    _ => {}
                }
            }
            record.keys.push(key);
        }

        Self { instances }
    }

    /// Look up one instance.
    #[must_use]
    pub fn get(&self, id: InstanceId) -> Option<&InstanceRecord> {
        self.instances.get(&id)
    }

    /// All instances in ascending ID order.
    pub fn iter(&self) -> impl Iterator<Item = (InstanceId, &InstanceRecord)> + '_ {
        self.instances.iter().map(|(id, r)| (*id, r))
    }

    /// Number of instances.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    /// Whether the source holds no instances.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Highest instance ID in use.
    #[must_use]
    pub fn max_id(&self) -> Option<InstanceId> {
        self.instances.keys().next_back().copied()
    }

    /// The instance holding `uid`.
    ///
    /// Relation UIDs are unique per source; if a corrupted source holds
    /// duplicates the lowest instance wins and a warning is logged.
    #[must_use]
    pub fn by_relation_uid(&self, uid: &RelationUid) -> Option<InstanceId> {
        let mut matches = self
            .instances
            .iter()
            .filter(|(_, r)| r.relation_uid.as_ref() == Some(uid))
            .map(|(id, _)| *id);
        let first = matches.next();
        if let Some(other) = matches.next() {
            warn!(
                relation_uid = %uid,
                first = %first.map(|i| i.to_string()).unwrap_or_default(),
                other = %other,
                "relation UID is stored by more than one instance"
            );
        }
        first
    }

    /// Instances carrying a relationUID whose ruleID satisfies `supported`.
    pub fn with_rule<'a>(
        &'a self,
        supported: impl Fn(&str) -> bool + 'a,
    ) -> impl Iterator<Item = (InstanceId, &'a InstanceRecord)> + 'a {
        self.iter().filter(move |(_, r)| {
            r.relation_uid.is_some() && r.rule_id.as_ref().is_some_and(|id| supported(id.as_str()))
        })
    }
}

// =============================================================================
// ALLOCATION & REMOVAL
// =============================================================================

/// Allocate a fresh instance on `source` and store `uid` as its relationUID.
pub fn claim_instance(
    source: &dyn PropertyOwner,
    uid: &RelationUid,
) -> Result<InstanceId, RelataError> {
    for _ in 0..MAX_CLAIM_ATTEMPTS {
        let next = match InstanceIndex::scan(source).max_id() {
            Some(max) => max.next().ok_or_else(|| {
                RelataError::AllocationExhausted("instance IDs exhausted".to_string())
            })?,
            None => InstanceId::FIRST,
        };

        let key = instance_key(next, RELATION_UID_TAG)?;
        if source.insert_property_if_absent(&key, Property::new(uid.as_str())) {
            debug!(instance = %next, relation_uid = %uid, "allocated relation instance");
            return Ok(next);
        }
        trace!(instance = %next, "instance claim lost, retrying");
    }
    Err(RelataError::AllocationExhausted(format!(
        "no instance ID could be claimed after {} attempts",
        MAX_CLAIM_ATTEMPTS
    )))
}

/// Remove every property under `Relations.<id>`. Returns the number removed.
pub fn remove_instance(source: &dyn PropertyOwner, id: InstanceId) -> usize {
    let pattern = path_to_match_pattern(&instance_root(id));
    let mut removed = 0;
    for key in source.property_keys() {
        if pattern.prefix_captures_name(&key).is_some() && source.remove_property(&key) {
            removed += 1;
        }
    }
    debug!(instance = %id, removed, "removed relation instance");
    removed
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::PropertyMap;

    fn set(map: &PropertyMap, key: &str, value: &str) {
        map.set_property(key, Property::new(value));
    }

    #[test]
    fn instance_key_layout() {
        assert_eq!(
            instance_key(InstanceId(3), RELATION_UID_TAG).expect("key"),
            "Relations.3.relationUID"
        );
    }

    #[test]
    fn scan_empty_source() {
        let map = PropertyMap::new();
        let index = InstanceIndex::scan(&map);
        assert!(index.is_empty());
        assert_eq!(index.max_id(), None);
    }

    #[test]
    fn scan_collects_instance_fields() {
        let map = PropertyMap::new();
        set(&map, "Relations.1.relationUID", "u1");
        set(&map, "Relations.1.ruleID", "X");
        set(&map, "Relations.1.destinationUID", "d1");
        set(&map, "Relations.4.relationUID", "u4");
        set(&map, "Relations.4.custom", "7");
        set(&map, "Relations.x.relationUID", "ignored");
        set(&map, "Relations.0.relationUID", "ignored");
        set(&map, "Other.1.relationUID", "ignored");

        let index = InstanceIndex::scan(&map);
        assert_eq!(index.len(), 2);
        assert_eq!(index.max_id(), Some(InstanceId(4)));

        let first = index.get(InstanceId(1)).expect("instance 1");
        assert_eq!(first.relation_uid, Some(RelationUid::new("u1")));
        assert_eq!(first.rule_id, Some(RuleId::new("X")));
        assert_eq!(first.destination_uid.as_deref(), Some("d1"));

        let fourth = index.get(InstanceId(4)).expect("instance 4");
        assert_eq!(fourth.keys.len(), 2);
        assert_eq!(fourth.rule_id, None);

        assert_eq!(index.by_relation_uid(&RelationUid::new("u4")), Some(InstanceId(4)));
        assert_eq!(index.by_relation_uid(&RelationUid::new("nope")), None);
    }

    #[test]
    fn with_rule_filters_on_rule_and_uid() {
        let map = PropertyMap::new();
        set(&map, "Relations.1.relationUID", "u1");
        set(&map, "Relations.1.ruleID", "A");
        set(&map, "Relations.2.relationUID", "u2");
        set(&map, "Relations.2.ruleID", "B");
        set(&map, "Relations.3.ruleID", "A");

        let index = InstanceIndex::scan(&map);
        let ids: Vec<_> = index.with_rule(|r| r == "A").map(|(id, _)| id).collect();
        assert_eq!(ids, vec![InstanceId(1)]);
    }

    #[test]
    fn claim_allocates_past_highest_instance() {
        let map = PropertyMap::new();
        set(&map, "Relations.5.relationUID", "u5");
        set(&map, "Relations.2.relationUID", "u2");

        let id = claim_instance(&map, &RelationUid::new("fresh")).expect("claim");
        assert_eq!(id, InstanceId(6));
        assert_eq!(
            map.property("Relations.6.relationUID"),
            Some(Property::new("fresh"))
        );
    }

    #[test]
    fn claim_on_empty_source_starts_at_one() {
        let map = PropertyMap::new();
        let id = claim_instance(&map, &RelationUid::new("a")).expect("claim");
        assert_eq!(id, InstanceId::FIRST);
    }

    #[test]
    fn remove_instance_only_touches_its_prefix() {
        let map = PropertyMap::new();
        set(&map, "Relations.1.relationUID", "u1");
        set(&map, "Relations.1.ruleID", "A");
        set(&map, "Relations.10.relationUID", "u10");
        set(&map, "Unrelated", "x");

        assert_eq!(remove_instance(&map, InstanceId(1)), 2);
        assert_eq!(map.property_keys(), vec!["Relations.10.relationUID", "Unrelated"]);
    }
}
