//! Measurement harness for the pulse MPMC ring.
//!
//! One harness run drives a single ring with a configured number of pinned
//! producer and consumer threads, samples per-operation latency with the
//! CPU cycle counter, merges per-thread histograms into percentile
//! summaries, and appends one record to an append-only CSV log.
//!
//! The run has three phases controlled by two shared flags:
//!
//! 1. **Warmup**: workers drive the ring but record nothing, until the
//!    harness sets `collecting`.
//! 2. **Measurement**: every operation updates exact min/max; one in every
//!    [`stats::SAMPLE_RATE`] contributes to the histogram with that weight.
//! 3. **Shutdown**: the harness sets `done`; workers exit between
//!    operations and return their local tallies.

#![warn(missing_docs, missing_debug_implementations)]

pub mod affinity;
pub mod config;
pub mod harness;
pub mod payload;
pub mod report;
pub mod stats;
pub mod tsc;
