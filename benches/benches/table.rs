// Copyright 2025 the Chartwell Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use criterion::{BatchSize, BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use chartwell_data::{
    AggregationType, DateTimeInterval, FieldKey, IntervalUnit, RemoveFromStart, RowValues, Table,
    TableMainStorage, TableStorage,
};

#[derive(Clone)]
struct Lcg(u64);

impl Lcg {
    fn new(seed: u64) -> Self {
        Self(seed)
    }

    fn next_u32(&mut self) -> u32 {
        // Numerical Recipes LCG parameters.
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1);
        (self.0 >> 32) as u32
    }

    fn next_f64(&mut self) -> f64 {
        f64::from(self.next_u32()) / f64::from(u32::MAX)
    }
}

/// `n` one-second candles with a random walk close.
fn candles(n: u32, first_key: f64, rng: &mut Lcg) -> Vec<RowValues> {
    let mut close = 100.0;
    (0..n)
        .map(|i| {
            close += rng.next_f64() - 0.5;
            RowValues::array([first_key + f64::from(i) * 1000.0, close, close + 1.0, close - 1.0])
        })
        .collect()
}

fn filled_table(n: u32, seed: u64) -> Table {
    let mut rng = Lcg::new(seed);
    let mut table = Table::default();
    table.register_field(FieldKey::Index(1), AggregationType::Last, None);
    table.register_field(FieldKey::Index(2), AggregationType::Max, None);
    table.register_field(FieldKey::Index(3), AggregationType::Min, None);
    table.add_data(candles(n, 0.0, &mut rng), RemoveFromStart::Keep);
    table
}

fn bench_commit(c: &mut Criterion) {
    let mut group = c.benchmark_group("chartwell_table_commit");
    group.sample_size(50);

    for &n in &[1_000_u32, 100_000] {
        group.bench_with_input(BenchmarkId::new("append_right", n), &n, |b, &n| {
            let mut rng = Lcg::new(0xC0FF_EE00_0000_0001);
            b.iter_batched(
                || {
                    let mut storage = TableMainStorage::default();
                    storage.add_data(candles(n, 0.0, &mut rng), RemoveFromStart::Keep);
                    let tail = candles(100, f64::from(n) * 1000.0, &mut rng);
                    (storage, tail)
                },
                |(mut storage, tail)| {
                    storage.add_data(tail, RemoveFromStart::Keep);
                    black_box(storage);
                },
                BatchSize::LargeInput,
            );
        });

        group.bench_with_input(BenchmarkId::new("insert_middle", n), &n, |b, &n| {
            let mut rng = Lcg::new(0xC0FF_EE00_0000_0002);
            b.iter_batched(
                || {
                    let mut storage = TableMainStorage::default();
                    storage.add_data(candles(n, 0.0, &mut rng), RemoveFromStart::Keep);
                    let middle = candles(100, f64::from(n) * 500.0 + 1.0, &mut rng);
                    (storage, middle)
                },
                |(mut storage, middle)| {
                    storage.add_data(middle, RemoveFromStart::Keep);
                    black_box(storage);
                },
                BatchSize::LargeInput,
            );
        });

        group.bench_with_input(BenchmarkId::new("sliding_window", n), &n, |b, &n| {
            let mut rng = Lcg::new(0xC0FF_EE00_0000_0003);
            b.iter_batched(
                || {
                    let mut storage = TableMainStorage::default();
                    storage.add_data(candles(n, 0.0, &mut rng), RemoveFromStart::Keep);
                    let tail = candles(10, f64::from(n) * 1000.0, &mut rng);
                    (storage, tail)
                },
                |(mut storage, tail)| {
                    storage.add_data(tail, RemoveFromStart::Added);
                    black_box(storage);
                },
                BatchSize::LargeInput,
            );
        });
    }

    group.finish();
}

fn bench_select(c: &mut Criterion) {
    let mut group = c.benchmark_group("chartwell_table_select");

    for &n in &[10_000_u32, 1_000_000] {
        let mut table = filled_table(n, 0xC0FF_EE00_0000_0010);
        let span = f64::from(n) * 1000.0;

        group.bench_with_input(BenchmarkId::new("uncached_window", n), &n, |b, _| {
            let storage = table.storage(None);
            let mut i = 0_u32;
            b.iter(|| {
                // Distinct windows so the selection cache never hits.
                i = i.wrapping_add(1);
                let start = f64::from(i % 97) / 97.0 * span * 0.9;
                let selection = storage.select(start, start + span * 0.05);
                black_box(selection.max(&FieldKey::Index(2)));
            });
        });

        group.bench_with_input(BenchmarkId::new("cached_window", n), &n, |b, _| {
            let storage = table.storage(None);
            b.iter(|| {
                let selection = storage.select(span * 0.25, span * 0.75);
                black_box(selection.min(&FieldKey::Index(3)));
            });
        });
    }

    group.finish();
}

fn bench_aggregate(c: &mut Criterion) {
    let mut group = c.benchmark_group("chartwell_table_aggregate");
    group.sample_size(30);
    let minutes = DateTimeInterval::new(IntervalUnit::Minute, 1);

    for &n in &[10_000_u32, 200_000] {
        group.bench_with_input(BenchmarkId::new("full_build", n), &n, |b, &n| {
            b.iter_batched(
                || filled_table(n, 0xC0FF_EE00_0000_0020),
                |mut table| {
                    black_box(table.storage(Some(&minutes)).rows_count());
                },
                BatchSize::LargeInput,
            );
        });

        group.bench_with_input(BenchmarkId::new("repair_after_append", n), &n, |b, &n| {
            let mut rng = Lcg::new(0xC0FF_EE00_0000_0021);
            b.iter_batched(
                || {
                    let mut table = filled_table(n, 0xC0FF_EE00_0000_0022);
                    table.storage(Some(&minutes));
                    table.add_data(
                        candles(30, f64::from(n) * 1000.0, &mut rng),
                        RemoveFromStart::Added,
                    );
                    table
                },
                |mut table| {
                    black_box(table.storage(Some(&minutes)).rows_count());
                },
                BatchSize::LargeInput,
            );
        });
    }

    group.finish();
}

criterion_group!(benches, bench_commit, bench_select, bench_aggregate);
criterion_main!(benches);
