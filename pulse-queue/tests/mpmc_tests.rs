//! Cross-thread integration tests for the MPMC ring.
//!
//! Single-threaded semantics are covered by the unit tests in `src/mpmc.rs`;
//! these tests exercise publication ordering, conservation and uniqueness
//! under real thread interleavings.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use pulse_queue::mpmc::{MpmcRing, Packed};

const N: u64 = 2_500_000;
const CAPACITY: usize = 64;

/// Burn cadence for the backpressure tests.
const SLOW_EVERY: u64 = 1024;

fn burn_cycles() {
    for i in 0..500 {
        std::hint::black_box(i);
    }
}

/// SPSC: the consumer observes exactly the produced sequence, in order.
#[test]
fn spsc_conservation() {
    let ring = Arc::new(MpmcRing::<u64>::with_capacity(CAPACITY).unwrap());

    let producer = {
        let ring = Arc::clone(&ring);
        thread::spawn(move || {
            for i in 0..N {
                while ring.try_push(i).is_err() {
                    std::hint::spin_loop();
                }
            }
        })
    };

    let consumer = {
        let ring = Arc::clone(&ring);
        thread::spawn(move || {
            for expected in 0..N {
                loop {
                    if let Some(v) = ring.try_pop() {
                        assert_eq!(v, expected);
                        break;
                    }
                    std::hint::spin_loop();
                }
            }
        })
    };

    producer.join().unwrap();
    consumer.join().unwrap();

    assert!(ring.is_empty());
}

/// Backpressure with a periodically stalled producer.
#[test]
fn spsc_consumer_faster() {
    let ring = Arc::new(MpmcRing::<u64>::with_capacity(CAPACITY).unwrap());

    let producer = {
        let ring = Arc::clone(&ring);
        thread::spawn(move || {
            for i in 0..N {
                if i % SLOW_EVERY == 0 {
                    burn_cycles();
                }
                while ring.try_push(i).is_err() {
                    std::hint::spin_loop();
                }
            }
        })
    };

    let consumer = {
        let ring = Arc::clone(&ring);
        thread::spawn(move || {
            for expected in 0..N {
                loop {
                    if let Some(v) = ring.try_pop() {
                        assert_eq!(v, expected);
                        break;
                    }
                    std::hint::spin_loop();
                }
            }
        })
    };

    producer.join().unwrap();
    consumer.join().unwrap();

    assert!(ring.is_empty());
}

/// Backpressure with a periodically stalled consumer.
#[test]
fn spsc_producer_faster() {
    let ring = Arc::new(MpmcRing::<u64>::with_capacity(CAPACITY).unwrap());

    let producer = {
        let ring = Arc::clone(&ring);
        thread::spawn(move || {
            for i in 0..N {
                while ring.try_push(i).is_err() {
                    std::hint::spin_loop();
                }
            }
        })
    };

    let consumer = {
        let ring = Arc::clone(&ring);
        thread::spawn(move || {
            for expected in 0..N {
                if expected % SLOW_EVERY == 0 {
                    burn_cycles();
                }
                loop {
                    if let Some(v) = ring.try_pop() {
                        assert_eq!(v, expected);
                        break;
                    }
                    std::hint::spin_loop();
                }
            }
        })
    };

    producer.join().unwrap();
    consumer.join().unwrap();

    assert!(ring.is_empty());
}

/// Move-only payloads transfer ownership across the ring intact.
#[test]
fn spsc_move_only() {
    let ring = Arc::new(MpmcRing::<Box<u64>>::with_capacity(CAPACITY).unwrap());

    let producer = {
        let ring = Arc::clone(&ring);
        thread::spawn(move || {
            for i in 0..N {
                let mut boxed = Box::new(i);
                loop {
                    match ring.try_push(boxed) {
                        Ok(()) => break,
                        Err(full) => {
                            boxed = full.into_inner();
                            std::hint::spin_loop();
                        }
                    }
                }
            }
        })
    };

    let consumer = {
        let ring = Arc::clone(&ring);
        thread::spawn(move || {
            for expected in 0..N {
                loop {
                    if let Some(v) = ring.try_pop() {
                        assert_eq!(*v, expected);
                        break;
                    }
                    std::hint::spin_loop();
                }
            }
        })
    };

    producer.join().unwrap();
    consumer.join().unwrap();

    assert!(ring.is_empty());
}

/// MPMC: with unique inputs, every value is consumed exactly once.
#[test]
fn mpmc_uniqueness() {
    const PRODUCERS: u64 = 4;
    const CONSUMERS: u64 = 4;

    let ring = Arc::new(MpmcRing::<u64>::with_capacity(1024).unwrap());
    let popped = Arc::new(AtomicU64::new(0));
    let mut handles = Vec::new();

    // Values 0..N distributed round-robin among producers.
    for id in 0..PRODUCERS {
        let ring = Arc::clone(&ring);
        handles.push(thread::spawn(move || {
            let mut i = id;
            while i < N {
                while ring.try_push(i).is_err() {
                    std::hint::spin_loop();
                }
                i += PRODUCERS;
            }
            Vec::new()
        }));
    }

    for _ in 0..CONSUMERS {
        let ring = Arc::clone(&ring);
        let popped = Arc::clone(&popped);
        handles.push(thread::spawn(move || {
            let mut seen = Vec::new();
            while popped.load(Ordering::Relaxed) < N {
                if let Some(v) = ring.try_pop() {
                    popped.fetch_add(1, Ordering::Relaxed);
                    seen.push(v);
                } else {
                    std::hint::spin_loop();
                }
            }
            seen
        }));
    }

    let mut all: Vec<u64> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();
    all.sort_unstable();

    assert_eq!(all.len() as u64, N);
    for (i, v) in all.iter().enumerate() {
        assert_eq!(*v, i as u64, "value consumed zero or multiple times");
    }
    assert!(ring.is_empty());
}

/// Blocking push/pop under full MPMC contention.
#[test]
fn mpmc_blocking_conservation() {
    const PRODUCERS: u64 = 4;
    const CONSUMERS: u64 = 4;
    const PER_CONSUMER: u64 = N / CONSUMERS;

    let ring = Arc::new(MpmcRing::<u64>::with_capacity(256).unwrap());
    let mut handles = Vec::new();

    for id in 0..PRODUCERS {
        let ring = Arc::clone(&ring);
        handles.push(thread::spawn(move || {
            let mut i = id;
            while i < N {
                ring.push(i);
                i += PRODUCERS;
            }
            0
        }));
    }

    for _ in 0..CONSUMERS {
        let ring = Arc::clone(&ring);
        handles.push(thread::spawn(move || {
            let mut sum = 0u64;
            for _ in 0..PER_CONSUMER {
                sum = sum.wrapping_add(ring.pop());
            }
            sum
        }));
    }

    let total: u64 = handles.into_iter().map(|h| h.join().unwrap()).sum();

    // Conservation: the popped values sum to 0 + 1 + ... + N-1.
    assert_eq!(total, N * (N - 1) / 2);
    assert!(ring.is_empty());
}

/// The packed layout carries the same semantics under contention.
#[test]
fn mpmc_packed_layout_conservation() {
    const PRODUCERS: u64 = 2;
    const CONSUMERS: u64 = 2;
    const COUNT: u64 = 500_000;
    const PER_CONSUMER: u64 = COUNT / CONSUMERS;

    let ring = Arc::new(MpmcRing::<u64, Packed>::with_capacity(256).unwrap());
    let mut handles = Vec::new();

    for id in 0..PRODUCERS {
        let ring = Arc::clone(&ring);
        handles.push(thread::spawn(move || {
            let mut i = id;
            while i < COUNT {
                ring.push(i);
                i += PRODUCERS;
            }
            0
        }));
    }

    for _ in 0..CONSUMERS {
        let ring = Arc::clone(&ring);
        handles.push(thread::spawn(move || {
            let mut sum = 0u64;
            for _ in 0..PER_CONSUMER {
                sum = sum.wrapping_add(ring.pop());
            }
            sum
        }));
    }

    let total: u64 = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(total, COUNT * (COUNT - 1) / 2);
    assert!(ring.is_empty());
}
