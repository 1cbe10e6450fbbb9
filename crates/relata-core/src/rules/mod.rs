//! Concrete relation rules and the textual rule names used by front ends
//! (`image:<purpose>`, `id:<tag>`).

mod id_relation;
mod source_image;

pub use id_relation::IdRelationRule;
pub use source_image::{
    CLASS_UID_KEY, IMAGE_KIND, INSTANCE_UID_KEY, SequenceEntry, SourceImageRule, implicit_uid,
    pointer_key, read_sequence,
};

use crate::RelataError;
use crate::rule::RelationRule;
use crate::uid::UidSource;
use std::sync::Arc;

/// Build a rule from its textual form.
///
/// `image:<purpose>` selects [`SourceImageRule`], `id:<tag>` selects
/// [`IdRelationRule`]; an empty suffix selects the abstract rule.
pub fn parse_rule(name: &str, uids: Arc<dyn UidSource>) -> Result<RelationRule, RelataError> {
    let (family, qualifier) = name
        .split_once(':')
        .ok_or_else(|| RelataError::InvalidRule(format!("'{}' is not <family>:<qualifier>", name)))?;
    let qualifier = qualifier.trim();
    match family.trim() {
        "image" => Ok(RelationRule::with_uid_source(SourceImageRule::new(qualifier), uids)),
        "id" => Ok(RelationRule::with_uid_source(IdRelationRule::new(qualifier), uids)),
        other => Err(RelataError::InvalidRule(format!(
            "unknown rule family '{}' (expected 'image' or 'id')",
            other
        ))),
    }
}
