//! Segmentation and deviation benchmarks
//!
//! Synthetic concatenated time series: `runs` random walks of `len` points
//! each, appended in file order the way the simulator writes them.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use moran_validate::deviation::sup_deviation;
use moran_validate::ode::{horizon, solve};
use moran_validate::trajectory::{segment, TimePoint};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Create a concatenated series of `runs` runs with `len` points each
#[allow(clippy::cast_precision_loss)]
fn synthetic_series(runs: usize, len: usize) -> Vec<TimePoint> {
    let mut rng = StdRng::seed_from_u64(42);
    let mut out = Vec::with_capacity(runs * len);
    for _ in 0..runs {
        let mut x: f64 = 0.5;
        for i in 0..len {
            x = (x + rng.gen_range(-0.01..0.01)).clamp(0.0, 1.0);
            out.push(TimePoint::new(i as f64 * 0.01, x));
        }
    }
    out
}

/// Benchmark the single-pass segmenter
fn bench_segment(c: &mut Criterion) {
    let mut group = c.benchmark_group("segment");

    for runs in [10usize, 100, 1000] {
        let series = synthetic_series(runs, 700);
        group.bench_with_input(BenchmarkId::from_parameter(runs), &series, |b, series| {
            b.iter(|| {
                let segmentation = segment(black_box(series.iter().copied()));
                black_box(segmentation);
            });
        });
    }

    group.finish();
}

/// Benchmark supremum deviation of every run against the reference
fn bench_sup_deviation(c: &mut Criterion) {
    let reference = solve(1.05, horizon(1000), 0.5).unwrap();
    let runs = segment(synthetic_series(100, 700));

    c.bench_function("sup_deviation_100_runs", |b| {
        b.iter(|| {
            let sups: Vec<f64> = runs
                .iter()
                .map(|run| sup_deviation(run, black_box(&reference)).unwrap())
                .collect();
            black_box(sups);
        });
    });
}

criterion_group!(benches, bench_segment, bench_sup_deviation);
criterion_main!(benches);
