//! Benchmarks for sample ingestion throughput

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use tally::{CounterReconciler, COUNTER_MODULUS};

fn generate_samples(count: usize, start: u64) -> Vec<u64> {
    (0..count as u64)
        .map(|i| (start + i * 3 + (i % 5)) % COUNTER_MODULUS)
        .collect()
}

fn fresh_reconciler() -> CounterReconciler {
    let mut r = CounterReconciler::new(1000).unwrap();
    r.restore_snapshot(None);
    r
}

fn bench_accepted(c: &mut Criterion) {
    let mut group = c.benchmark_group("ingest");

    let samples = generate_samples(1000, 0);
    group.throughput(Throughput::Elements(1000));

    group.bench_function("accept_1000_samples", |b| {
        b.iter(|| {
            let mut r = fresh_reconciler();
            for s in &samples {
                black_box(r.ingest_raw_sample(*s));
            }
            black_box(r.drain_effects());
        })
    });

    // Reference sits just below the wrap point
    let wrapping = generate_samples(1000, COUNTER_MODULUS - 1500);
    group.bench_function("accept_1000_samples_across_wrap", |b| {
        b.iter(|| {
            let mut r = fresh_reconciler();
            for s in &wrapping {
                black_box(r.ingest_raw_sample(*s));
            }
            black_box(r.drain_effects());
        })
    });

    group.finish();
}

fn bench_rejected(c: &mut Criterion) {
    let mut group = c.benchmark_group("reject");
    group.throughput(Throughput::Elements(1000));

    group.bench_function("reject_1000_jumps", |b| {
        b.iter(|| {
            let mut r = fresh_reconciler();
            r.ingest_raw_sample(0);
            for i in 0..1000u64 {
                black_box(r.ingest_raw_sample(10_000 + i));
            }
        })
    });

    group.finish();
}

criterion_group!(benches, bench_accepted, bench_rejected);
criterion_main!(benches);
