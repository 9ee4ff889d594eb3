//! The measurement rig.
//!
//! One [`Harness::run`] drives a single ring: it calibrates the cycle
//! counter, spawns the configured producers and consumers, holds them in a
//! warmup phase, opens the measurement window by flipping a shared flag,
//! stops them with a second flag, and merges every worker's tallies into
//! one [`Results`] record.
//!
//! The payload type and ticket layout are resolved once per run, so each
//! worker loop is fully monomorphic, with no branching on configuration inside
//! the measured path beyond the blocking/non-blocking choice.

use std::fmt;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Instant;

use pulse_queue::mpmc::{MpmcRing, Packed, Padded, TicketLayout};

use crate::affinity;
use crate::config::{Config, ConfigError};
use crate::payload::{Large, Payload};
use crate::report::Results;
use crate::stats::OpStats;
use crate::tsc;

/// Upper bound on the pause count of the failure backoff.
const MAX_BACKOFF: u64 = 256;

/// A fatal error that prevented the run from producing results.
#[derive(Debug)]
pub enum HarnessError {
    /// The configuration failed validation.
    Config(ConfigError),
    /// A worker could not be bound to its CPU.
    Pin {
        /// The logical CPU the worker asked for.
        core: usize,
        /// The underlying platform error.
        source: io::Error,
    },
}

impl fmt::Display for HarnessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(err) => write!(f, "invalid configuration: {err}"),
            Self::Pin { core, source } => {
                write!(f, "failed to pin a worker to core {core}: {source}")
            }
        }
    }
}

impl std::error::Error for HarnessError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(err) => Some(err),
            Self::Pin { source, .. } => Some(source),
        }
    }
}

impl From<ConfigError> for HarnessError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err)
    }
}

/// Owns a validated configuration and runs benchmarks against it.
#[derive(Debug, Clone)]
pub struct Harness {
    config: Config,
}

/// The per-worker slice of the configuration, copied into each thread.
#[derive(Debug, Clone, Copy)]
struct WorkerCtx {
    blocking: bool,
    /// `Some(core)` when pinning is on.
    pin: Option<usize>,
    ns_per_cycle: f64,
    bucket_width_ns: u64,
    max_buckets: usize,
}

impl Harness {
    /// Validates the configuration and wraps it.
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// The configuration this harness runs with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Executes one benchmark run and returns the merged results.
    ///
    /// The payload shape and ticket layout are fixed here from the two
    /// configuration booleans; everything downstream is monomorphic.
    pub fn run(&self) -> Result<Results, HarnessError> {
        match (self.config.large_payload, self.config.move_only_payload) {
            (false, false) => self.run_with_payload::<u64>(),
            (true, false) => self.run_with_payload::<Large>(),
            (false, true) => self.run_with_payload::<Box<u64>>(),
            (true, true) => self.run_with_payload::<Box<Large>>(),
        }
    }

    fn run_with_payload<T: Payload>(&self) -> Result<Results, HarnessError> {
        if self.config.padding {
            self.run_typed::<T, Padded>()
        } else {
            self.run_typed::<T, Packed>()
        }
    }

    fn run_typed<T: Payload, L: TicketLayout + 'static>(&self) -> Result<Results, HarnessError> {
        let config = &self.config;

        let ns_per_cycle = tsc::nanos_per_cycle();
        let ring = Arc::new(
            MpmcRing::<T, L>::with_capacity(config.capacity)
                .map_err(|err| ConfigError::Capacity(err.capacity()))?,
        );
        let collecting = Arc::new(AtomicBool::new(false));
        let done = Arc::new(AtomicBool::new(false));
        let cores = affinity::num_cpus();

        let worker_ctx = |core: usize| WorkerCtx {
            blocking: config.blocking,
            pin: config.pinning.then_some(core % cores),
            ns_per_cycle,
            bucket_width_ns: config.bucket_width_ns,
            max_buckets: config.max_buckets,
        };

        let producer_handles: Vec<_> = (0..config.producers)
            .map(|id| {
                let ctx = worker_ctx(id);
                let ring = Arc::clone(&ring);
                let collecting = Arc::clone(&collecting);
                let done = Arc::clone(&done);
                let stride = config.producers as u64;
                thread::spawn(move || {
                    producer_loop(ctx, id as u64, stride, ring, collecting, done)
                })
            })
            .collect();

        let consumer_handles: Vec<_> = (0..config.consumers)
            .map(|id| {
                let ctx = worker_ctx(id + config.producers);
                let ring = Arc::clone(&ring);
                let collecting = Arc::clone(&collecting);
                let done = Arc::clone(&done);
                thread::spawn(move || consumer_loop(ctx, ring, collecting, done))
            })
            .collect();

        // Warmup, then open the measurement window.
        thread::sleep(config.warmup);
        let measurement_start = Instant::now();
        collecting.store(true, Ordering::Relaxed);

        thread::sleep(config.duration - config.warmup);
        done.store(true, Ordering::Relaxed);

        let mut push = OpStats::new(config.bucket_width_ns, config.max_buckets);
        let mut pop = OpStats::new(config.bucket_width_ns, config.max_buckets);
        let mut worker_error: Option<HarnessError> = None;

        // A producer can be parked inside push() on a full ring if a
        // consumer exited early; drain on its behalf until every producer
        // has returned.
        if config.blocking {
            while producer_handles.iter().any(|h| !h.is_finished()) {
                let _ = ring.try_pop();
                std::hint::spin_loop();
            }
        }

        for handle in producer_handles {
            match handle.join().expect("producer thread panicked") {
                Ok(stats) => push.merge(&stats),
                Err(err) => {
                    worker_error.get_or_insert(err);
                }
            }
        }

        // Producers are gone. A consumer can still be parked inside pop()
        // on a ticket no producer will ever publish; feed sentinels until
        // every consumer has exited. Leftovers are destroyed with the ring.
        if config.blocking {
            while consumer_handles.iter().any(|h| !h.is_finished()) {
                let _ = ring.try_push(T::from_seed(0));
                std::hint::spin_loop();
            }
        }

        for handle in consumer_handles {
            match handle.join().expect("consumer thread panicked") {
                Ok(stats) => pop.merge(&stats),
                Err(err) => {
                    worker_error.get_or_insert(err);
                }
            }
        }

        let wall_time = measurement_start.elapsed();

        if let Some(err) = worker_error {
            return Err(err);
        }

        let push_latency = push.summarize();
        let pop_latency = pop.summarize();

        Ok(Results {
            config: config.clone(),
            wall_time,
            push,
            pop,
            push_latency,
            pop_latency,
        })
    }
}

fn producer_loop<T: Payload, L: TicketLayout>(
    ctx: WorkerCtx,
    first: u64,
    stride: u64,
    ring: Arc<MpmcRing<T, L>>,
    collecting: Arc<AtomicBool>,
    done: Arc<AtomicBool>,
) -> Result<OpStats, HarnessError> {
    if let Some(core) = ctx.pin {
        affinity::pin_current_thread(core)
            .map_err(|source| HarnessError::Pin { core, source })?;
    }

    let mut stats = OpStats::new(ctx.bucket_width_ns, ctx.max_buckets);
    // Seeds are unique across producers: id, id + stride, id + 2*stride, ...
    let mut seed = first;
    let mut backoff = 1;

    // Warmup: drive the ring to steady state, record nothing.
    while !collecting.load(Ordering::Relaxed) {
        if try_produce(&ring, ctx.blocking, seed) {
            seed = seed.wrapping_add(stride);
            backoff = 1;
        } else {
            spin_backoff(&mut backoff);
        }
    }

    while !done.load(Ordering::Relaxed) {
        let t0 = tsc::read();
        let pushed = try_produce(&ring, ctx.blocking, seed);
        let t1 = tsc::read();

        if pushed {
            seed = seed.wrapping_add(stride);
            stats.record_ok(tsc::cycles_to_ns(t1.wrapping_sub(t0), ctx.ns_per_cycle));
            backoff = 1;
        } else {
            stats.record_failure();
            spin_backoff(&mut backoff);
        }
    }

    Ok(stats)
}

fn consumer_loop<T: Payload, L: TicketLayout>(
    ctx: WorkerCtx,
    ring: Arc<MpmcRing<T, L>>,
    collecting: Arc<AtomicBool>,
    done: Arc<AtomicBool>,
) -> Result<OpStats, HarnessError> {
    if let Some(core) = ctx.pin {
        affinity::pin_current_thread(core)
            .map_err(|source| HarnessError::Pin { core, source })?;
    }

    let mut stats = OpStats::new(ctx.bucket_width_ns, ctx.max_buckets);
    let mut backoff = 1;

    while !collecting.load(Ordering::Relaxed) {
        if try_consume(&ring, ctx.blocking) {
            backoff = 1;
        } else {
            spin_backoff(&mut backoff);
        }
    }

    while !done.load(Ordering::Relaxed) {
        let t0 = tsc::read();
        let popped = try_consume(&ring, ctx.blocking);
        let t1 = tsc::read();

        if popped {
            stats.record_ok(tsc::cycles_to_ns(t1.wrapping_sub(t0), ctx.ns_per_cycle));
            backoff = 1;
        } else {
            stats.record_failure();
            spin_backoff(&mut backoff);
        }
    }

    Ok(stats)
}

/// One push in the configured mode. Blocking mode cannot fail.
#[inline]
fn try_produce<T: Payload, L: TicketLayout>(
    ring: &MpmcRing<T, L>,
    blocking: bool,
    seed: u64,
) -> bool {
    if blocking {
        ring.push(T::from_seed(seed));
        true
    } else {
        ring.try_push(T::from_seed(seed)).is_ok()
    }
}

/// One pop in the configured mode; the value is consumed and dropped.
#[inline]
fn try_consume<T: Payload, L: TicketLayout>(ring: &MpmcRing<T, L>, blocking: bool) -> bool {
    if blocking {
        std::hint::black_box(ring.pop());
        true
    } else {
        match ring.try_pop() {
            Some(value) => {
                std::hint::black_box(value);
                true
            }
            None => false,
        }
    }
}

/// Exponential failure backoff: pause `min(2^(k-1), 256)` times on the
/// k-th consecutive failure.
#[inline]
fn spin_backoff(pauses: &mut u64) {
    for _ in 0..*pauses {
        std::hint::spin_loop();
    }
    *pauses = (*pauses * 2).min(MAX_BACKOFF);
}
