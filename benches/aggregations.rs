//! Aggregation benchmarks
//!
//! Measures report generation on synthetic runs of growing size, and the
//! comparison of several reports.
//!
//! Run with: cargo bench --bench aggregations

use chrono::{Duration, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use e2ebench::aggregate::{aggregate, LatencyStats};
use e2ebench::compare::compare;
use e2ebench::run::{Run, RunMetadata};
use e2ebench::sample::{MetricValue, Sample, Stage, STAGE_TIME};
use rand::Rng;

const SMALL_SIZE: usize = 1_000;
const MEDIUM_SIZE: usize = 100_000;

/// Synthetic run: accuracy curve, per-sample latency and predictions.
fn synthetic_run(run_id: &str, n: usize) -> Run {
    let mut rng = rand::thread_rng();
    let start = Utc::now();
    let mut samples = Vec::with_capacity(3 * n + 1);

    for i in 0..n {
        let ts = start + Duration::milliseconds(i as i64);
        let progress = i as f64 / n as f64;
        samples.push(Sample::new(Stage::Validate, "accuracy", progress, ts));
        samples.push(Sample::new(Stage::Infer, "latency", rng.gen_range(0.001..0.05), ts));
        let truth = rng.gen_range(0..10);
        let predicted = if rng.gen_bool(0.9) { truth } else { rng.gen_range(0..10) };
        samples.push(Sample::new(
            Stage::Infer,
            "prediction",
            MetricValue::Prediction { truth, predicted },
            ts,
        ));
    }
    samples.push(Sample::new(Stage::Infer, STAGE_TIME, n as f64 / 1000.0, start));

    Run::from_samples(
        RunMetadata::builder(run_id).tool("bench").pipeline("synthetic").started_at(start).build(),
        samples,
    )
}

/// Benchmark full run aggregation
fn bench_aggregate(c: &mut Criterion) {
    let mut group = c.benchmark_group("aggregate_run");

    for size in [SMALL_SIZE, MEDIUM_SIZE] {
        let run = synthetic_run("bench", size);
        group.bench_with_input(BenchmarkId::new("aggregate", size), &run, |b, run| {
            b.iter(|| aggregate(black_box(run)));
        });
    }

    group.finish();
}

/// Benchmark latency percentiles alone (dominated by the sort)
fn bench_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("latency_percentiles");
    let mut rng = rand::thread_rng();

    for size in [SMALL_SIZE, MEDIUM_SIZE] {
        let latencies: Vec<f64> = (0..size).map(|_| rng.gen_range(0.0..1.0)).collect();
        group.bench_with_input(BenchmarkId::new("nearest_rank", size), &latencies, |b, data| {
            b.iter(|| LatencyStats::compute(black_box(data), None));
        });
    }

    group.finish();
}

/// Benchmark comparing several aggregated runs
fn bench_compare(c: &mut Criterion) {
    let reports: Vec<_> = (0..8)
        .map(|i| aggregate(&synthetic_run(&format!("run-{i}"), SMALL_SIZE)))
        .collect();

    c.bench_function("compare_8_runs", |b| {
        b.iter(|| compare(black_box(&reports)));
    });
}

criterion_group!(benches, bench_aggregate, bench_latency, bench_compare);
criterion_main!(benches);
