//! # Concurrent Allocation Tests
//!
//! Instance IDs and sequence positions are claimed with an atomic
//! insert-if-absent, so concurrent connects against one source never hand
//! out the same slot twice.

use relata_core::rule::instance::{InstanceIndex, claim_instance};
use relata_core::rules::{INSTANCE_UID_KEY, read_sequence};
use relata_core::{
    DataEntity, PropertyMap, RelationRule, RelationType, RelationUid, SourceImageRule, UuidSource,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::thread;

const THREADS: usize = 8;

#[test]
fn concurrent_claims_are_unique() {
    let source = PropertyMap::new();
    let per_thread = 50;

    let claimed: Vec<u64> = thread::scope(|scope| {
        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let source = &source;
                scope.spawn(move || {
                    (0..per_thread)
                        .map(|n| {
                            claim_instance(source, &RelationUid::new(format!("{}-{}", t, n)))
                                .expect("claim")
                                .0
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|h| h.join().expect("thread"))
            .collect()
    });

    let unique: BTreeSet<u64> = claimed.iter().copied().collect();
    assert_eq!(unique.len(), THREADS * per_thread);
    assert_eq!(InstanceIndex::scan(&source).len(), THREADS * per_thread);
}

#[test]
fn concurrent_connects_to_distinct_destinations() {
    let rule = RelationRule::with_uid_source(
        SourceImageRule::new("segmentation"),
        Arc::new(UuidSource),
    );
    let source = PropertyMap::new();
    let images: Vec<DataEntity> = (0..THREADS)
        .map(|n| {
            let uid = format!("img-{}", n);
            DataEntity::with_uid(uid.as_str())
                .kind("image")
                .property_value(INSTANCE_UID_KEY, uid.as_str())
        })
        .collect();

    thread::scope(|scope| {
        for img in &images {
            let rule = &rule;
            let source = &source;
            scope.spawn(move || rule.connect(source, img).expect("connect"));
        }
    });

    let positions: Vec<usize> = read_sequence(&source).keys().copied().collect();
    assert_eq!(positions, (0..THREADS).collect::<Vec<_>>());
    assert_eq!(
        rule.existing_relations(&source, RelationType::Complete)
            .expect("complete")
            .len(),
        THREADS
    );
    for img in &images {
        assert!(
            rule.has_relation(&source, img, RelationType::Complete)
                .expect("has")
        );
    }
}
