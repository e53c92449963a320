//! Benchmarks for the series admission hot path

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rmx_cardinality::{series_hash, CardinalityOptimizer};
use rmx_config::CardinalityConfig;

fn labels(i: usize) -> [(&'static str, String); 3] {
    [
        ("node", format!("node{:04}", i % 1000)),
        ("partition", format!("p{}", i % 8)),
        ("state", ["idle", "alloc", "mixed", "down"][i % 4].to_string()),
    ]
}

fn bench_series_hash(c: &mut Criterion) {
    let set = labels(42);
    c.bench_function("series_hash", |b| {
        b.iter(|| series_hash(black_box("rmx_node_cpus"), black_box(set.clone())))
    });
}

fn bench_should_collect(c: &mut Criterion) {
    let mut group = c.benchmark_group("should_collect_metric");

    for max_series in [1_000usize, 100_000] {
        let config = CardinalityConfig {
            max_series,
            warn_limit: max_series,
            ..CardinalityConfig::default()
        };
        let optimizer = CardinalityOptimizer::with_seed("bench", &config, 1).unwrap();
        for i in 0..1000 {
            optimizer.should_collect_metric("rmx_node_cpus", labels(i));
        }

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(
            BenchmarkId::new("known_series", max_series),
            &optimizer,
            |b, optimizer| {
                let mut i = 0;
                b.iter(|| {
                    i += 1;
                    optimizer.should_collect_metric("rmx_node_cpus", labels(i % 1000))
                })
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_series_hash, bench_should_collect);
criterion_main!(benches);
