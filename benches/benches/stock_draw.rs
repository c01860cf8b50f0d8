// Copyright 2025 the Chartwell Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use chartwell_data::{DateTimeInterval, FieldKey, IntervalUnit, RemoveFromStart, RowValues};
use chartwell_stock::StockChart;
use criterion::{BatchSize, BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use kurbo::Rect;

const BOUNDS: Rect = Rect::new(0.0, 0.0, 1200.0, 800.0);

fn chart(n: u32) -> StockChart {
    let mut chart = StockChart::default();
    let price = chart.add_plot(3.0);
    let volume = chart.add_plot(1.0);
    chart.add_series(price, FieldKey::Index(1)).unwrap();
    chart.add_series(price, FieldKey::Index(2)).unwrap();
    chart.add_series(volume, FieldKey::Index(3)).unwrap();
    chart.table_mut().add_data(
        (0..n).map(|i| {
            let k = f64::from(i);
            RowValues::array([k * 1000.0, 100.0 + (k * 0.01).sin(), 101.0, f64::from(i % 17)])
        }),
        RemoveFromStart::Keep,
    );
    let span = f64::from(n) * 1000.0;
    chart.set_visible_range(span * 0.8..span);
    chart.draw(BOUNDS);
    chart
}

fn bench_draw(c: &mut Criterion) {
    let mut group = c.benchmark_group("chartwell_stock_draw");
    group.sample_size(30);

    for &n in &[10_000_u32, 200_000] {
        group.bench_with_input(BenchmarkId::new("idle", n), &n, |b, &n| {
            let mut chart = chart(n);
            b.iter(|| black_box(chart.draw(BOUNDS)));
        });

        group.bench_with_input(BenchmarkId::new("resize", n), &n, |b, &n| {
            let mut chart = chart(n);
            let mut wide = false;
            b.iter(|| {
                wide = !wide;
                let width = if wide { 1300.0 } else { 1200.0 };
                black_box(chart.draw(Rect::new(0.0, 0.0, width, 800.0)))
            });
        });

        group.bench_with_input(BenchmarkId::new("live_append", n), &n, |b, &n| {
            b.iter_batched(
                || chart(n),
                |mut chart| {
                    let key = f64::from(n) * 1000.0;
                    chart
                        .table_mut()
                        .add_data([RowValues::array([key, 100.0, 101.0, 3.0])], RemoveFromStart::Added);
                    black_box(chart.draw(BOUNDS));
                },
                BatchSize::LargeInput,
            );
        });

        group.bench_with_input(BenchmarkId::new("grouped_minutes", n), &n, |b, &n| {
            b.iter_batched(
                || chart(n),
                |mut chart| {
                    chart.set_grouping(Some(Box::new(DateTimeInterval::new(IntervalUnit::Minute, 1))));
                    black_box(chart.draw(BOUNDS));
                },
                BatchSize::LargeInput,
            );
        });
    }

    group.finish();
}

criterion_group!(benches, bench_draw);
criterion_main!(benches);
