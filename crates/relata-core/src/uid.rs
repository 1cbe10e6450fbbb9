//! # Relation UID Sources
//!
//! Relation UIDs are produced by an injected [`UidSource`] so that tests and
//! reproducible pipelines can swap the random generator for a deterministic
//! one.

use crate::RelationUid;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Generator of globally unique relation tokens.
pub trait UidSource: Send + Sync + fmt::Debug {
    /// Produce a fresh UID. Must not repeat within the lifetime of the source.
    fn next_uid(&self) -> RelationUid;
}

/// Random version 4 UUIDs.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidSource;

impl UidSource for UuidSource {
    fn next_uid(&self) -> RelationUid {
        RelationUid(uuid::Uuid::new_v4().to_string())
    }
}

/// Deterministic `<prefix>-<n>` tokens, counting from 1.
#[derive(Debug)]
pub struct SequentialUidSource {
    prefix: String,
    counter: AtomicU64,
}

impl SequentialUidSource {
    /// Create a source producing `<prefix>-1`, `<prefix>-2`, ...
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            counter: AtomicU64::new(0),
        }
    }

    /// Continue counting after `last` (used when reopening a workspace).
    #[must_use]
    pub fn starting_after(prefix: impl Into<String>, last: u64) -> Self {
        Self {
            prefix: prefix.into(),
            counter: AtomicU64::new(last),
        }
    }
}

impl UidSource for SequentialUidSource {
    fn next_uid(&self) -> RelationUid {
        let n = self.counter.fetch_add(1, Ordering::Relaxed).saturating_add(1);
        RelationUid(format!("{}-{}", self.prefix, n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn sequential_source_counts_from_one() {
        let source = SequentialUidSource::new("rel");
        assert_eq!(source.next_uid().as_str(), "rel-1");
        assert_eq!(source.next_uid().as_str(), "rel-2");
    }

    #[test]
    fn sequential_source_resumes() {
        let source = SequentialUidSource::starting_after("rel", 41);
        assert_eq!(source.next_uid().as_str(), "rel-42");
    }

    #[test]
    fn uuid_source_does_not_repeat() {
        let source = UuidSource;
        let uids: BTreeSet<_> = (0..100).map(|_| source.next_uid()).collect();
        assert_eq!(uids.len(), 100);
    }
}
