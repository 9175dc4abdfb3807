//! Benchmarks for failure-domain aggregation
//!
//! Run with: cargo bench --package epochlog-metadata --bench failure_domain

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use epochlog_core::{DomainScope, NodeId, ReplicationProperty, ShardId, StorageSet};
use epochlog_metadata::{ClusterNodes, FailureDomainAggregator, MissingNodePolicy, NodeAttributes};

/// Cluster of `size` nodes spread over 4 regions, 3 rows and 5 racks
fn generate_cluster(size: u16) -> ClusterNodes {
    (0..size)
        .map(|i| {
            let location = format!("rg{}.dc0.cl0.ro{}.rk{}", i % 4, i % 3, i % 5)
                .parse()
                .unwrap();
            (i, NodeAttributes::storage(1, Some(location)))
        })
        .collect()
}

fn generate_storage_set(size: u16) -> StorageSet {
    (0..size).map(|i| ShardId::new(NodeId::new(i, 1), 0)).collect()
}

fn replication() -> ReplicationProperty {
    ReplicationProperty::from_pairs([
        (DomainScope::Region, 3),
        (DomainScope::Rack, 3),
        (DomainScope::Node, 3),
    ])
}

/// Benchmark building the domain tree
fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("failure_domain_build");

    for size in [16u16, 128, 1024] {
        let nodes = generate_cluster(size);
        let set = generate_storage_set(size);
        let replication = replication();

        group.bench_with_input(BenchmarkId::new("build", size), &set, |b, set| {
            b.iter(|| {
                FailureDomainAggregator::<bool>::build(
                    black_box(set),
                    &nodes,
                    &replication,
                    MissingNodePolicy::Reject,
                )
                .unwrap()
            })
        });
    }

    group.finish();
}

/// Benchmark toggling one shard and re-checking replication
fn bench_toggle_and_check(c: &mut Criterion) {
    let mut group = c.benchmark_group("failure_domain_toggle");

    for size in [16u16, 128, 1024] {
        let nodes = generate_cluster(size);
        let set = generate_storage_set(size);
        let mut agg =
            FailureDomainAggregator::build(&set, &nodes, &replication(), MissingNodePolicy::Reject)
                .unwrap();
        for shard in &set {
            agg.set_shard_attribute(shard, true).unwrap();
        }

        group.bench_function(BenchmarkId::new("toggle", size), |b| {
            let mut counter = 0u16;
            b.iter(|| {
                let shard = ShardId::new(NodeId::new(counter % size, 1), 0);
                counter = counter.wrapping_add(1);
                agg.set_shard_attribute(&shard, false).unwrap();
                let ok = agg.can_replicate(black_box(&true));
                agg.set_shard_attribute(&shard, true).unwrap();
                ok
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_build, bench_toggle_and_check);
criterion_main!(benches);
