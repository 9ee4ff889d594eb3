//! Lock-free bounded queues for latency-critical applications.
//!
//! `pulse-queue` provides a fixed-capacity MPMC (multi-producer,
//! multi-consumer) ring buffer built on per-slot sequence numbers and
//! monotonically increasing claim tickets.
//!
//! # Quick Start
//!
//! ```
//! use pulse_queue::mpmc::MpmcRing;
//!
//! let ring = MpmcRing::<u64>::with_capacity(1024).unwrap();
//!
//! ring.try_push(42).unwrap();
//! assert_eq!(ring.try_pop(), Some(42));
//! ```
//!
//! # Progress guarantees
//!
//! The ring is lock-free, not wait-free: the system as a whole always makes
//! progress, but an individual operation can be delayed indefinitely by
//! other threads. The blocking `push`/`pop` variants spin on one slot's
//! sequence word; the non-blocking `try_push`/`try_pop` variants report
//! full/empty instead of waiting.

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs, missing_debug_implementations)]

use core::fmt;

pub mod mpmc;

/// Error returned when pushing to a full queue.
///
/// Contains the value that could not be pushed, returning ownership to the
/// caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Full<T>(pub T);

impl<T> Full<T> {
    /// Returns the value that could not be pushed.
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> fmt::Display for Full<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "queue is full")
    }
}

impl<T: fmt::Debug> std::error::Error for Full<T> {}

/// Error returned when constructing a ring with an unusable capacity.
///
/// Capacities must be powers of two and at least 2. Contains the rejected
/// value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapacityError(pub usize);

impl CapacityError {
    /// Returns the capacity that was rejected.
    pub fn capacity(&self) -> usize {
        self.0
    }
}

impl fmt::Display for CapacityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "capacity must be a power of two >= 2, got {}", self.0)
    }
}

impl std::error::Error for CapacityError {}
