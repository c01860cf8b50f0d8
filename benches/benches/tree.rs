// Copyright 2025 the Chartwell Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use chartwell_data::{Fields, ID_FIELD, PARENT_FIELD, TreeData, TreeModel, Value};
use criterion::{BatchSize, BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

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

    fn gen_range_u32(&mut self, upper_exclusive: u32) -> u32 {
        if upper_exclusive == 0 {
            return 0;
        }
        self.next_u32() % upper_exclusive
    }
}

/// Flat rows of a random forest: each row's parent is an earlier row.
fn task_rows(n: u32, seed: u64) -> Vec<Fields> {
    let mut rng = Lcg::new(seed);
    (0..n)
        .map(|i| {
            let mut pairs = vec![
                (ID_FIELD, Value::from(format!("t{i}"))),
                ("progress", Value::from(f64::from(rng.gen_range_u32(101)))),
            ];
            if i > 0 && rng.gen_range_u32(8) != 0 {
                let parent = rng.gen_range_u32(i);
                pairs.push((PARENT_FIELD, Value::from(format!("t{parent}"))));
            }
            TreeData::new(pairs).fields
        })
        .collect()
}

fn loaded(n: u32) -> TreeModel {
    let mut tree = TreeModel::new();
    tree.add_data_as_table(task_rows(n, 0x7EE5_0000_0000_0001));
    tree
}

fn bench_tree(c: &mut Criterion) {
    let mut group = c.benchmark_group("chartwell_tree");
    group.sample_size(30);

    for &n in &[1_000_u32, 50_000] {
        group.bench_with_input(BenchmarkId::new("load_as_table", n), &n, |b, &n| {
            b.iter_batched(
                || task_rows(n, 0x7EE5_0000_0000_0002),
                |rows| {
                    let mut tree = TreeModel::new();
                    tree.add_data_as_table(rows);
                    black_box(tree.len());
                },
                BatchSize::LargeInput,
            );
        });

        group.bench_with_input(BenchmarkId::new("traverse_cold", n), &n, |b, &n| {
            b.iter_batched(
                || loaded(n),
                |tree| {
                    black_box(tree.traverse().len());
                },
                BatchSize::LargeInput,
            );
        });

        let needle = Value::from(50.0);
        group.bench_with_input(BenchmarkId::new("search_scan", n), &n, |b, &n| {
            let tree = loaded(n);
            b.iter(|| black_box(tree.search("progress", &needle).len()));
        });

        group.bench_with_input(BenchmarkId::new("search_indexed", n), &n, |b, &n| {
            let mut tree = loaded(n);
            tree.create_index_on("progress", false);
            b.iter(|| black_box(tree.search("progress", &needle).len()));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_tree);
criterion_main!(benches);
