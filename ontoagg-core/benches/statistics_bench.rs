//! Benchmarks for the statistics engines
//!
//! Run with: cargo bench --bench statistics_bench

use chrono::{DateTime, Duration};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ontoagg_core::aggregation::{continuous, discrete, filter_carry_over};
use ontoagg_core::model::{ContinuousSummary, DiscreteChange};
use ontoagg_core::{AggregationWindow, Literal, Period};
use rand::{rngs::StdRng, Rng, SeedableRng};

const CELSIUS: &str = "http://www.openbase.org/bco/ontology#Celsius";

fn window() -> AggregationWindow {
    let boundary = DateTime::from_timestamp_millis(1_710_115_200_000)
        .unwrap()
        .fixed_offset();
    AggregationWindow::ending_at(Period::Day, boundary)
}

fn discrete_changes(count: usize, window: &AggregationWindow) -> Vec<DiscreteChange> {
    let mut rng = StdRng::seed_from_u64(1);
    let step = window.duration_millis() / count as i64;
    (0..count)
        .map(|i| DiscreteChange {
            timestamp: window.from + Duration::milliseconds(step * i as i64),
            value: if rng.gen_bool(0.5) { "ON" } else { "OFF" }.to_string(),
        })
        .collect()
}

fn bench_discrete(c: &mut Criterion) {
    let window = window();
    let mut group = c.benchmark_group("discrete_changes");

    for size in [100, 1_000, 10_000].iter() {
        let records = discrete_changes(*size, &window);
        group.bench_with_input(BenchmarkId::from_parameter(size), &records, |b, records| {
            b.iter(|| {
                let kept = filter_carry_over(records.clone(), window.from_millis());
                black_box(discrete::aggregate_changes(&kept, &window, 1.0).unwrap())
            });
        });
    }

    group.finish();
}

fn bench_continuous(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(2);
    let mut group = c.benchmark_group("continuous_values");

    for size in [100, 1_000, 10_000].iter() {
        let values: Vec<Literal> = (0..*size)
            .map(|_| Literal::new(format!("{:.2}", rng.gen_range(15.0..25.0)), CELSIUS))
            .collect();
        group.bench_with_input(BenchmarkId::from_parameter(size), &values, |b, values| {
            b.iter(|| black_box(continuous::aggregate_values(values, 1.0).unwrap()));
        });
    }

    group.finish();
}

fn bench_pooling(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(3);
    let summaries: Vec<ContinuousSummary> = (0..364)
        .map(|day| {
            let mean = rng.gen_range(15.0..25.0);
            let variance = rng.gen_range(0.0..4.0);
            ContinuousSummary {
                window_start: day * 86_400_000,
                mean,
                variance,
                standard_deviation: f64::sqrt(variance),
                time_weighting: 1.0,
                quantity: rng.gen_range(1..200),
                value: Literal::new(format!("{:?}", mean), CELSIUS),
            }
        })
        .collect();

    c.bench_function("pool_year_of_days", |b| {
        b.iter(|| black_box(continuous::aggregate_summaries(&summaries, 1.0).unwrap()));
    });
}

criterion_group!(benches, bench_discrete, bench_continuous, bench_pooling);
criterion_main!(benches);
