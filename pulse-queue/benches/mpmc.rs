//! Benchmarks for MPMC ring performance.
//!
//! Compares pulse-queue against crossbeam-queue's ArrayQueue, and the padded
//! ticket layout against the packed antipattern.

use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use crossbeam_queue::ArrayQueue;
use pulse_queue::mpmc::{MpmcRing, Packed};
use std::sync::Arc;
use std::thread;

#[allow(dead_code)]
#[derive(Debug, Clone, Copy)]
struct Wide([u64; 128]); // 1024 bytes

// ============================================================================
// Single-threaded latency benchmarks
// ============================================================================

fn bench_single_thread(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_thread");

    group.bench_function("pulse_mpmc/u64", |b| {
        let ring = MpmcRing::<u64>::with_capacity(1024).unwrap();
        b.iter(|| {
            ring.try_push(black_box(42)).unwrap();
            black_box(ring.try_pop().unwrap())
        });
    });

    group.bench_function("pulse_mpmc_packed/u64", |b| {
        let ring = MpmcRing::<u64, Packed>::with_capacity(1024).unwrap();
        b.iter(|| {
            ring.try_push(black_box(42)).unwrap();
            black_box(ring.try_pop().unwrap())
        });
    });

    group.bench_function("crossbeam_array/u64", |b| {
        let q = ArrayQueue::<u64>::new(1024);
        b.iter(|| {
            q.push(black_box(42)).unwrap();
            black_box(q.pop().unwrap())
        });
    });

    group.bench_function("pulse_mpmc/1kb", |b| {
        let ring = MpmcRing::<Wide>::with_capacity(1024).unwrap();
        let msg = Wide([0; 128]);
        b.iter(|| {
            ring.try_push(black_box(msg)).unwrap();
            black_box(ring.try_pop().unwrap())
        });
    });

    group.bench_function("crossbeam_array/1kb", |b| {
        let q = ArrayQueue::<Wide>::new(1024);
        let msg = Wide([0; 128]);
        b.iter(|| {
            q.push(black_box(msg)).unwrap();
            black_box(q.pop().unwrap())
        });
    });

    group.finish();
}

// ============================================================================
// Contended throughput benchmarks
// ============================================================================

fn run_contended(ring: Arc<MpmcRing<u64>>, producers: u64, consumers: u64, count: u64) {
    let mut handles = Vec::new();

    for id in 0..producers {
        let ring = Arc::clone(&ring);
        handles.push(thread::spawn(move || {
            let mut i = id;
            while i < count {
                while ring.try_push(i).is_err() {
                    std::hint::spin_loop();
                }
                i += producers;
            }
        }));
    }

    for _ in 0..consumers {
        let ring = Arc::clone(&ring);
        let quota = count / consumers;
        handles.push(thread::spawn(move || {
            let mut received = 0;
            while received < quota {
                if ring.try_pop().is_some() {
                    received += 1;
                } else {
                    std::hint::spin_loop();
                }
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }
}

fn bench_contended_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("contended_throughput");
    group.sample_size(10);

    const COUNT: u64 = 100_000;
    group.throughput(Throughput::Elements(COUNT));

    for (producers, consumers) in [(1, 1), (2, 2), (4, 4)] {
        group.bench_function(format!("pulse_mpmc/{producers}p{consumers}c"), |b| {
            b.iter(|| {
                let ring = Arc::new(MpmcRing::<u64>::with_capacity(1024).unwrap());
                run_contended(ring, producers, consumers, COUNT);
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_single_thread, bench_contended_throughput);
criterion_main!(benches);
