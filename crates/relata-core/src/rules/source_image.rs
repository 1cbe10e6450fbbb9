//! # Source Image Relation
//!
//! Relates a derived image (segmentation, registration result, ...) to the
//! image it was computed from, the way DICOM records it: a numbered
//! *source image sequence* on the derived image.
//!
//! ## Data Layer Layout
//!
//! ```text
//! DICOM.0008.2112.[k].0008.1155                     referenced instance UID
//! DICOM.0008.2112.[k].0008.1150                     referenced class UID
//! DICOM.0008.2112.[k].0040.A170.[0].0008.0100       purpose (code value)
//! DICOM.0008.2112.[k].0040.A170.[0].0008.0102       coding scheme
//! DICOM.0008.2112.[k].0040.A170.[0].0008.0104       code meaning
//! Relations.<id>.SourceImageSequenceItem            k (ID-layer pointer)
//! ```
//!
//! Positions `k` are zero based and contiguous. Removing an entry shifts all
//! higher entries down by one and rewrites the pointers of every instance
//! that referenced a shifted position.

use crate::path::{
    Capture, PathSegment, PropertyKeyPath, name_to_path, path_to_match_pattern, path_to_name,
};
use crate::primitives::MAX_CLAIM_ATTEMPTS;
use crate::property::{PropertyOwner, PropertyProvider, content_property, data_kind_of};
use crate::rule::instance::{InstanceIndex, instance_key};
use crate::rule::{DataLayerRule, DataRelation};
use crate::{InstanceId, Property, RelataError, RelationUid, RuleId};
use std::collections::BTreeMap;
use tracing::{debug, trace};

/// Prefix of every source image rule ID.
pub const RULE_ID_PREFIX: &str = "SourceImageRelation ";

/// Leaf under `Relations.<id>` pointing into the source image sequence.
pub const SEQUENCE_POINTER_TAG: &str = "SourceImageSequenceItem";

/// Data kind accepted as destination.
pub const IMAGE_KIND: &str = "image";

/// SOP instance UID of a destination image.
pub const INSTANCE_UID_KEY: &str = "DICOM.0008.0018";

/// SOP class UID of a destination image.
pub const CLASS_UID_KEY: &str = "DICOM.0008.0016";

/// Coding scheme designator written with every purpose code.
pub const PURPOSE_CODING_SCHEME: &str = "RELATA";

const SEQUENCE_POSITION: usize = 2;

fn sequence_path() -> PropertyKeyPath {
    PropertyKeyPath::new()
        .name("DICOM")
        .name("0008")
        .any_selection("2112")
}

fn entry_path(position: usize) -> PropertyKeyPath {
    PropertyKeyPath::new()
        .name("DICOM")
        .name("0008")
        .selection("2112", position)
}

fn instance_uid_key(position: usize) -> Result<String, RelataError> {
    path_to_name(&entry_path(position).name("0008").name("1155"))
}

fn class_uid_key(position: usize) -> Result<String, RelataError> {
    path_to_name(&entry_path(position).name("0008").name("1150"))
}

fn purpose_code_key(position: usize, leaf: &str) -> Result<String, RelataError> {
    path_to_name(
        &entry_path(position)
            .name("0040")
            .selection("A170", 0)
            .name("0008")
            .name(leaf),
    )
}

/// Flat key of the sequence pointer of instance `id`.
pub fn pointer_key(id: InstanceId) -> Result<String, RelataError> {
    instance_key(id, SEQUENCE_POINTER_TAG)
}

// =============================================================================
// SEQUENCE SNAPSHOT
// =============================================================================

/// One entry of the source image sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SequenceEntry {
    pub position: usize,
    pub instance_uid: Option<String>,
    pub class_uid: Option<String>,
    pub purpose: Option<String>,
    /// Every property key stored under the entry.
    pub keys: Vec<String>,
}

/// Read the source image sequence of `source`, ordered by position.
pub fn read_sequence(source: &dyn PropertyProvider) -> BTreeMap<usize, SequenceEntry> {
    let pattern = path_to_match_pattern(&sequence_path());
    let mut entries: BTreeMap<usize, SequenceEntry> = BTreeMap::new();

    for key in source.property_keys() {
        let Ok(path) = name_to_path(&key) else {
            continue;
        };
        let Some(position) = pattern
            .prefix_captures(&path)
            .and_then(|c| c.first().and_then(Capture::as_index))
        else {
            continue;
        };

        let entry = entries.entry(position).or_insert_with(|| SequenceEntry {
            position,
            ..SequenceEntry::default()
        });
        let value = || source.property(&key).map(|p| p.0);
        match &path.segments()[SEQUENCE_POSITION + 1..] {
            [PathSegment::Name(g), PathSegment::Name(e)] if g == "0008" && e == "1155" => {
                entry.instance_uid = value();
            }
            [PathSegment::Name(g), PathSegment::Name(e)] if g == "0008" && e == "1150" => {
                entry.class_uid = value();
            }
            [
                PathSegment::Name(g),
                PathSegment::Selection { name, index: 0 },
                PathSegment::Name(cg),
                PathSegment::Name(ce),
            ] if g == "0040" && name == "A170" && cg == "0008" && ce == "0100" => {
                entry.purpose = value();
            }
            _ => {}
        }
        entry.keys.push(key);
    }

    entries
}

/// Sequence positions referenced by ID-layer pointers, per instance.
fn read_pointers(source: &dyn PropertyProvider, index: &InstanceIndex) -> Vec<(InstanceId, usize)> {
    index
        .iter()
        .filter_map(|(id, _)| {
            let key = pointer_key(id).ok()?;
            let position = source.property(&key)?.0.parse::<usize>().ok()?;
            Some((id, position))
        })
        .collect()
}

// =============================================================================
// RULE
// =============================================================================

/// Relation from a derived image to the image it was computed from,
/// qualified by a purpose.
///
/// An empty purpose yields the abstract rule, which detects relations of
/// every purpose but cannot create any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceImageRule {
    purpose: String,
}

impl SourceImageRule {
    /// Rule for one purpose (e.g. `"segmentation"`).
    #[must_use]
    pub fn new(purpose: impl Into<String>) -> Self {
        Self {
            purpose: purpose.into(),
        }
    }

    /// The abstract rule covering every purpose.
    #[must_use]
    pub fn abstract_rule() -> Self {
        Self::new("")
    }

    /// The purpose tag; empty for the abstract rule.
    #[must_use]
    pub fn purpose(&self) -> &str {
        &self.purpose
    }

    fn covers_purpose(&self, purpose: &str) -> bool {
        !purpose.is_empty() && (self.purpose.is_empty() || self.purpose == purpose)
    }

    /// Data relations together with their sequence position.
    fn located_relations(
        &self,
        source: &dyn PropertyProvider,
        destination: Option<&dyn PropertyProvider>,
        instances: &InstanceIndex,
    ) -> Vec<(usize, DataRelation)> {
        let wanted_uid = match destination {
            Some(d) => match content_property(d, INSTANCE_UID_KEY) {
                Some(uid) => Some(uid.0),
                None => return Vec::new(),
            },
            None => None,
        };

        let pointers = read_pointers(source, instances);
        let mut relations = Vec::new();

        for entry in read_sequence(source).into_values() {
            let (Some(purpose), Some(instance_uid)) = (&entry.purpose, &entry.instance_uid) else {
                continue;
            };
            if !self.covers_purpose(purpose) {
                continue;
            }
            if wanted_uid.as_ref().is_some_and(|w| w != instance_uid) {
                continue;
            }

            let rule_id = RuleId(format!("{}{}", RULE_ID_PREFIX, purpose));
            let instance = pointers
                .iter()
                .filter(|(_, position)| *position == entry.position)
                .map(|(id, _)| *id)
                .find(|id| {
                    instances
                        .get(*id)
                        .is_some_and(|r| r.rule_id.as_ref().is_none_or(|r| *r == rule_id))
                });
            let relation_uid = instance
                .and_then(|id| instances.get(id))
                .and_then(|r| r.relation_uid.clone())
                .unwrap_or_else(|| implicit_uid(purpose, instance_uid));

            relations.push((
                entry.position,
                DataRelation {
                    relation_uid,
                    rule_id,
                    instance,
                },
            ));
        }

        relations
    }

    /// Claim the next free sequence position by writing its instance UID.
    fn claim_position(
        &self,
        source: &dyn PropertyOwner,
        instance_uid: &str,
    ) -> Result<usize, RelataError> {
        for _ in 0..MAX_CLAIM_ATTEMPTS {
            let next = match read_sequence(source).keys().next_back() {
                Some(max) => max.checked_add(1).ok_or_else(|| {
                    RelataError::AllocationExhausted("sequence positions exhausted".to_string())
                })?,
                None => 0,
            };
            if source.insert_property_if_absent(&instance_uid_key(next)?, Property::new(instance_uid))
            {
                debug!(position = next, instance_uid, "allocated source image sequence item");
                return Ok(next);
            }
            trace!(position = next, "sequence claim lost, retrying");
        }
        Err(RelataError::AllocationExhausted(format!(
            "no sequence position could be claimed after {} attempts",
            MAX_CLAIM_ATTEMPTS
        )))
    }
}

/// Relation UID reported for sequence entries no instance points at.
///
/// Derived from the entry content so it stays stable across queries.
pub fn implicit_uid(purpose: &str, instance_uid: &str) -> RelationUid {
    RelationUid(format!("implicit:{}:{}", purpose, instance_uid))
}

fn move_key(source: &dyn PropertyOwner, key: &str, to: usize) -> Result<(), RelataError> {
    let moved = name_to_path(key)?
        .with_selection_index(SEQUENCE_POSITION, to)
        .ok_or_else(|| RelataError::InvalidPath {
            path: key.to_string(),
            reason: "not a sequence item key".to_string(),
        })?;
    if let Some(value) = source.property(key) {
        source.set_property(&path_to_name(&moved)?, value);
    }
    source.remove_property(key);
    Ok(())
}

impl DataLayerRule for SourceImageRule {
    fn rule_id(&self) -> RuleId {
        RuleId(format!("{}{}", RULE_ID_PREFIX, self.purpose))
    }

    fn display_name(&self) -> String {
        if self.purpose.is_empty() {
            "Source image relation".to_string()
        } else {
            format!("Source image relation ({})", self.purpose)
        }
    }

    fn source_role_name(&self) -> String {
        "derived image".to_string()
    }

    fn destination_role_name(&self) -> String {
        "source image".to_string()
    }

    fn is_abstract(&self) -> bool {
        self.purpose.is_empty()
    }

    fn is_supported_rule_id(&self, rule_id: &str) -> bool {
        rule_id
            .strip_prefix(RULE_ID_PREFIX)
            .is_some_and(|purpose| self.covers_purpose(purpose))
    }

    fn is_destination_candidate(&self, entity: &dyn PropertyProvider) -> bool {
        data_kind_of(entity) == Some(IMAGE_KIND)
    }

    fn identifies_destination(&self, destination: &dyn PropertyProvider) -> bool {
        content_property(destination, INSTANCE_UID_KEY).is_some()
    }

    fn data_relations(
        &self,
        source: &dyn PropertyProvider,
        destination: Option<&dyn PropertyProvider>,
        instances: &InstanceIndex,
    ) -> Result<Vec<DataRelation>, RelataError> {
        Ok(self
            .located_relations(source, destination, instances)
            .into_iter()
            .map(|(_, r)| r)
            .collect())
    }

    fn connect_data_layer(
        &self,
        source: &dyn PropertyOwner,
        destination: &dyn PropertyProvider,
        instance: InstanceId,
    ) -> Result<(), RelataError> {
        if self.is_abstract() {
            return Err(RelataError::AbstractRuleMisuse(self.rule_id().to_string()));
        }
        let instance_uid = content_property(destination, INSTANCE_UID_KEY)
            .ok_or_else(|| {
                RelataError::InvalidDestination(format!(
                    "destination has no instance UID ({})",
                    INSTANCE_UID_KEY
                ))
            })?
            .0;

        let existing = read_sequence(source).into_values().find(|e| {
            e.instance_uid.as_deref() == Some(instance_uid.as_str())
                && e.purpose.as_deref() == Some(self.purpose.as_str())
        });
        let position = match existing {
            Some(entry) => entry.position,
            None => self.claim_position(source, &instance_uid)?,
        };

        if let Some(class_uid) = content_property(destination, CLASS_UID_KEY) {
            source.set_property(&class_uid_key(position)?, class_uid);
        }
        source.set_property(
            &purpose_code_key(position, "0100")?,
            Property::new(self.purpose.as_str()),
        );
        source.set_property(
            &purpose_code_key(position, "0102")?,
            Property::new(PURPOSE_CODING_SCHEME),
        );
        source.set_property(
            &purpose_code_key(position, "0104")?,
            Property::new(self.purpose.as_str()),
        );
        source.set_property(&pointer_key(instance)?, Property::new(position.to_string()));
        Ok(())
    }

    fn disconnect_data_layer(
        &self,
        source: &dyn PropertyOwner,
        relation_uid: &RelationUid,
        instances: &InstanceIndex,
    ) -> Result<(), RelataError> {
        let Some(removed) = self
            .located_relations(source, None, instances)
            .into_iter()
            .find(|(_, r)| r.relation_uid == *relation_uid)
            .map(|(position, _)| position)
        else {
            return Ok(());
        };

        let sequence = read_sequence(source);
        if let Some(entry) = sequence.get(&removed) {
            for key in &entry.keys {
                source.remove_property(key);
            }
        }

        // Ascending order: slot `position - 1` is always free when moved into.
        let mut shifted = 0usize;
        for (position, entry) in sequence.range(removed.saturating_add(1)..) {
            for key in &entry.keys {
                move_key(source, key, position - 1)?;
            }
            shifted += 1;
        }

        for (id, position) in read_pointers(source, instances) {
            let key = pointer_key(id)?;
            if position == removed {
                source.remove_property(&key);
            } else if position > removed {
                source.set_property(&key, Property::new((position - 1).to_string()));
            }
        }

        debug!(
            position = removed,
            shifted,
            relation_uid = %relation_uid,
            "removed source image sequence item"
        );
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::{DataEntity, PropertyMap};

    fn image(uid: &str) -> DataEntity {
        DataEntity::with_uid(uid)
            .kind(IMAGE_KIND)
            .property_value(INSTANCE_UID_KEY, uid)
            .property_value(CLASS_UID_KEY, "1.2.840.10008.5.1.4.1.1.2")
    }

    #[test]
    fn rule_ids_and_support() {
        let seg = SourceImageRule::new("segmentation");
        assert_eq!(seg.rule_id().as_str(), "SourceImageRelation segmentation");
        assert!(!seg.is_abstract());
        assert!(seg.is_supported_rule_id("SourceImageRelation segmentation"));
        assert!(!seg.is_supported_rule_id("SourceImageRelation registration"));

        let any = SourceImageRule::abstract_rule();
        assert!(any.is_abstract());
        assert!(any.is_supported_rule_id("SourceImageRelation registration"));
        assert!(!any.is_supported_rule_id("SourceImageRelation "));
        assert!(!any.is_supported_rule_id("IDRelation_x"));
    }

    #[test]
    fn destination_candidate_is_kind_based() {
        let rule = SourceImageRule::new("p");
        assert!(rule.is_destination_candidate(&image("a")));
        assert!(!rule.is_destination_candidate(&DataEntity::with_uid("b").kind("mesh")));
    }

    #[test]
    fn connect_writes_entry_and_pointer() {
        let rule = SourceImageRule::new("segmentation");
        let source = PropertyMap::new();
        rule.connect_data_layer(&source, &image("img-1"), InstanceId(1))
            .expect("connect");

        assert_eq!(
            source.property("DICOM.0008.2112.[0].0008.1155"),
            Some(Property::new("img-1"))
        );
        assert_eq!(
            source.property("DICOM.0008.2112.[0].0040.A170.[0].0008.0100"),
            Some(Property::new("segmentation"))
        );
        assert_eq!(
            source.property("Relations.1.SourceImageSequenceItem"),
            Some(Property::new("0"))
        );
    }

    #[test]
    fn connect_reuses_matching_entry() {
        let rule = SourceImageRule::new("segmentation");
        let source = PropertyMap::new();
        let dest = image("img-1");
        rule.connect_data_layer(&source, &dest, InstanceId(1)).expect("first");
        rule.connect_data_layer(&source, &dest, InstanceId(1)).expect("second");
        assert_eq!(read_sequence(&source).len(), 1);
    }

    #[test]
    fn connect_rejects_destination_without_instance_uid() {
        let rule = SourceImageRule::new("segmentation");
        let source = PropertyMap::new();
        let err = rule
            .connect_data_layer(&source, &DataEntity::with_uid("x"), InstanceId(1))
            .expect_err("no instance uid");
        assert!(matches!(err, RelataError::InvalidDestination(_)));
        assert!(source.is_empty());
    }

    #[test]
    fn unpointed_entries_report_implicit_uid() {
        let rule = SourceImageRule::new("segmentation");
        let source = PropertyMap::new();
        rule.connect_data_layer(&source, &image("img-1"), InstanceId(1))
            .expect("connect");
        source.remove_property("Relations.1.SourceImageSequenceItem");

        let relations = rule
            .data_relations(&source, None, &InstanceIndex::scan(&source))
            .expect("relations");
        assert_eq!(relations.len(), 1);
        assert_eq!(relations[0].relation_uid, implicit_uid("segmentation", "img-1"));
        assert_eq!(relations[0].instance, None);
    }

    #[test]
    fn disconnect_shifts_higher_entries_and_pointers() {
        let rule = SourceImageRule::new("segmentation");
        let source = PropertyMap::new();
        for (n, uid) in ["a", "b", "c"].into_iter().enumerate() {
            let id = InstanceId(n as u64 + 1);
            source.set_property(
                &instance_key(id, crate::primitives::RELATION_UID_TAG).expect("key"),
                Property::new(format!("u-{}", uid)),
            );
            rule.connect_data_layer(&source, &image(uid), id).expect("connect");
        }

        let index = InstanceIndex::scan(&source);
        rule.disconnect_data_layer(&source, &RelationUid::new("u-a"), &index)
            .expect("disconnect");

        let sequence = read_sequence(&source);
        assert_eq!(sequence.keys().copied().collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(sequence[&0].instance_uid.as_deref(), Some("b"));
        assert_eq!(sequence[&1].instance_uid.as_deref(), Some("c"));
        assert_eq!(source.property("Relations.1.SourceImageSequenceItem"), None);
        assert_eq!(
            source.property("Relations.2.SourceImageSequenceItem"),
            Some(Property::new("0"))
        );
        assert_eq!(
            source.property("Relations.3.SourceImageSequenceItem"),
            Some(Property::new("1"))
        );
    }

    #[test]
    fn disconnect_unknown_uid_is_noop() {
        let rule = SourceImageRule::new("segmentation");
        let source = PropertyMap::new();
        rule.connect_data_layer(&source, &image("a"), InstanceId(1))
            .expect("connect");
        let before = source.snapshot();
        rule.disconnect_data_layer(&source, &RelationUid::new("nope"), &InstanceIndex::scan(&source))
            .expect("noop");
        assert_eq!(source.snapshot(), before);
    }
}
