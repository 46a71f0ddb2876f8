// Copyright 2025 Paratask Contributors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::thread;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use paratask::RangeManager;

fn single_threaded_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("range_manager_single_thread");
    for &len in &[1_000i64, 100_000, 1_000_000] {
        group.bench_with_input(BenchmarkId::from_parameter(len), &len, |b, &len| {
            b.iter(|| {
                let manager = RangeManager::new(0, len, 1, 4);
                let mut worker = manager.new_worker();
                let mut total = 0i64;
                while let Some((from, to)) = worker.find_new_work() {
                    total += to - from;
                }
                total
            });
        });
    }
    group.finish();
}

fn concurrent_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("range_manager_concurrent");
    for &workers in &[2usize, 4, 8] {
        group.bench_with_input(BenchmarkId::from_parameter(workers), &workers, |b, &workers| {
            b.iter(|| {
                let manager = RangeManager::new(0, 1_000_000, 1, workers);
                thread::scope(|scope| {
                    for _ in 0..workers {
                        scope.spawn(|| {
                            let mut worker = manager.new_worker();
                            let mut total = 0i64;
                            while let Some((from, to)) = worker.find_new_work() {
                                total += to - from;
                            }
                            total
                        });
                    }
                });
            });
        });
    }
    group.finish();
}

criterion_group!(benches, single_threaded_drain, concurrent_drain);
criterion_main!(benches);
