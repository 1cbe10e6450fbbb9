//! # Relation Benchmarks
//!
//! Performance benchmarks for relata-core relation operations.
//!
//! Run with: `cargo bench -p relata-core`

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use relata_core::rules::INSTANCE_UID_KEY;
use relata_core::{
    DataEntity, PropertyMap, RelationRule, RelationType, SequentialUidSource, SourceImageRule,
};
use std::hint::black_box;
use std::sync::Arc;

fn image(n: usize) -> DataEntity {
    let uid = format!("img-{}", n);
    DataEntity::with_uid(uid.as_str())
        .kind("image")
        .property_value(INSTANCE_UID_KEY, uid.as_str())
}

fn rule() -> RelationRule {
    RelationRule::with_uid_source(
        SourceImageRule::new("segmentation"),
        Arc::new(SequentialUidSource::new("bench")),
    )
}

/// A source connected to `size` images.
fn connected_source(rule: &RelationRule, images: &[DataEntity]) -> PropertyMap {
    let source = PropertyMap::new();
    for img in images {
        let _ = rule.connect(&source, img);
    }
    source
}

// =============================================================================
// BENCHMARKS
// =============================================================================

fn bench_connect(c: &mut Criterion) {
    let mut group = c.benchmark_group("connect");

    for size in [10, 50, 200].iter() {
        let images: Vec<DataEntity> = (0..*size).map(image).collect();
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                let rule = rule();
                black_box(connected_source(&rule, &images))
            });
        });
    }

    group.finish();
}

fn bench_relation_types(c: &mut Criterion) {
    let mut group = c.benchmark_group("relation_types");

    for size in [10, 50, 200].iter() {
        let rule = rule();
        let images: Vec<DataEntity> = (0..*size).map(image).collect();
        let source = connected_source(&rule, &images);
        let last = &images[images.len() - 1];

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| black_box(rule.relation_types(&source, last)));
        });
    }

    group.finish();
}

fn bench_disconnect_first(c: &mut Criterion) {
    let mut group = c.benchmark_group("disconnect_first");

    for size in [10, 50, 200].iter() {
        let rule = rule();
        let images: Vec<DataEntity> = (0..*size).map(image).collect();
        let template = connected_source(&rule, &images);

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                let source = template.clone();
                let _ = rule.disconnect(&source, &images[0], RelationType::Complete);
                black_box(source)
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_connect,
    bench_relation_types,
    bench_disconnect_first
);
criterion_main!(benches);
