/*
 * SPDX-FileCopyrightText: 2023 Inria
 * SPDX-FileCopyrightText: 2023 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use dsi_progress_logger::no_logging;
use recsplit::mph::{RecSplit, RecSplitBuilder};
use std::hint::black_box;

const N: usize = 1_000_000;

fn build(n: usize, bucket_size: usize, leaf_size: usize) -> RecSplit {
    let dir = tempfile::TempDir::new().unwrap();
    let mut builder = RecSplitBuilder::new(n, bucket_size, dir.path()).leaf_size(leaf_size);
    for i in 0..n as u64 {
        builder.add_key(&i).unwrap();
    }
    builder.build(no_logging![]).unwrap();
    builder.into_func().unwrap()
}

fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("recsplit_build");
    group.sample_size(10);
    for (bucket_size, leaf_size) in [(100, 5), (100, 8), (2000, 8)] {
        group.bench_function(
            BenchmarkId::from_parameter(format!("b={bucket_size},l={leaf_size}")),
            |b| b.iter(|| black_box(build(N / 10, bucket_size, leaf_size))),
        );
    }
    group.finish();
}

fn bench_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("recsplit_get");
    for (bucket_size, leaf_size) in [(100, 5), (100, 8), (2000, 8)] {
        let func = build(N, bucket_size, leaf_size);
        let mut key = 0_u64;
        group.bench_function(
            BenchmarkId::from_parameter(format!("b={bucket_size},l={leaf_size}")),
            |b| {
                b.iter(|| {
                    key = (key + 0x9E37_79B9) % N as u64;
                    black_box(func.get(&key))
                })
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_build, bench_get);
criterion_main!(benches);
