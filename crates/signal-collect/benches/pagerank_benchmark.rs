//! Benchmarks for PageRank execution.
//!
//! Runs a ring with chords in both execution modes over several worker
//! counts. Graph construction is included in each iteration.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tokio::runtime::Runtime;

use signal_collect::{ExecutionConfig, ExecutionMode, Graph, PageRankVertex};

/// Ring of `n` pages where every page also links three pages ahead
fn ring_graph(n: i64) -> Graph<f64, f64> {
    let mut graph = Graph::new();
    for id in 0..n {
        graph.add_vertex(PageRankVertex::new(id)).unwrap();
    }
    for id in 0..n {
        graph.add_edge(PageRankVertex::link(id, (id + 1) % n)).unwrap();
        graph.add_edge(PageRankVertex::link(id, (id + 3) % n)).unwrap();
    }
    graph
}

fn bench_pagerank(c: &mut Criterion) {
    let runtime = Runtime::new().unwrap();
    let n = 2_000;

    let mut group = c.benchmark_group("pagerank_ring");
    group.sample_size(10);
    group.throughput(Throughput::Elements(n as u64));

    for mode in [ExecutionMode::Synchronous, ExecutionMode::Asynchronous] {
        for workers in [1, 2, 4] {
            let config = ExecutionConfig::new()
                .with_mode(mode)
                .with_worker_count(workers)
                .with_convergence_threshold(1e-4);

            group.bench_with_input(
                BenchmarkId::new(mode.to_string(), workers),
                &config,
                |bencher, config| {
                    bencher.to_async(&runtime).iter(|| async {
                        let mut graph = ring_graph(n);
                        let stats = graph.execute(config.clone()).await.unwrap();
                        black_box(stats.signals_sent)
                    })
                },
            );
        }
    }

    group.finish();
}

criterion_group!(benches, bench_pagerank);
criterion_main!(benches);
