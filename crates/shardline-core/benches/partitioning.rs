/// Throughput benchmarks for routing, partitioning and in-memory runs
///
/// Run with: cargo bench --bench partitioning
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;

use shardline_core::{
    partitioner::partition, CompositeKey, CoordinatorConfig, KeyHasher, MemorySink,
    ParallelShardCoordinator, ShardRouter,
};

fn user_keys(count: u64) -> Vec<(u64, String)> {
    (0..count).map(|id| (id, format!("User{}", id))).collect()
}

fn user_key((id, name): &(u64, String)) -> CompositeKey {
    CompositeKey::new([id.to_string(), name.clone()])
}

fn bench_hash(c: &mut Criterion) {
    let mut group = c.benchmark_group("hash");

    group.bench_function("composite_key", |b| {
        b.iter(|| KeyHasher::hash(black_box(&["123456", "User123456"])))
    });

    group.finish();
}

fn bench_partition(c: &mut Criterion) {
    let mut group = c.benchmark_group("partition");
    let router = ShardRouter::hash_modulo(2).unwrap();

    for size in [1_000u64, 10_000, 100_000].iter() {
        let records = user_keys(*size);
        group.throughput(Throughput::Elements(*size));

        group.bench_with_input(BenchmarkId::from_parameter(size), &records, |b, records| {
            b.iter(|| partition(black_box(records.clone()), user_key, &router).unwrap())
        });
    }

    group.finish();
}

fn bench_memory_run(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    let mut group = c.benchmark_group("memory_run");
    group.sample_size(20);
    group.measurement_time(Duration::from_secs(10));

    let router = ShardRouter::hash_modulo(2).unwrap();
    let records = user_keys(100_000);
    group.throughput(Throughput::Elements(records.len() as u64));
    let records = &records;

    group.bench_function("100k_chunk_50", |b| {
        b.to_async(&rt).iter(|| async move {
            let jobs = partition(records.clone(), user_key, &router)
                .unwrap()
                .into_jobs(50)
                .unwrap();
            let sink = Arc::new(MemorySink::<(u64, String)>::new());
            ParallelShardCoordinator::new(sink, CoordinatorConfig::new(2).unwrap())
                .run(jobs)
                .await
        })
    });

    group.finish();
}

criterion_group!(benches, bench_hash, bench_partition, bench_memory_run);
criterion_main!(benches);
