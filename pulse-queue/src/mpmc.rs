//! Multi-producer multi-consumer (MPMC) bounded ring buffer.
//!
//! Any number of threads may push and pop concurrently through a shared
//! reference. Coordination uses per-slot sequence numbers plus two
//! monotonically increasing 64-bit claim tickets, so threads reason about a
//! slot locally: one relaxed load of the shared ticket and one acquire load
//! of the slot's own cache line.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::thread;
//!
//! use pulse_queue::mpmc::MpmcRing;
//!
//! let ring = Arc::new(MpmcRing::<u64>::with_capacity(1024).unwrap());
//!
//! let producer = {
//!     let ring = Arc::clone(&ring);
//!     thread::spawn(move || {
//!         for i in 0..100 {
//!             while ring.try_push(i).is_err() {
//!                 std::hint::spin_loop();
//!             }
//!         }
//!     })
//! };
//!
//! let mut received = 0;
//! while received < 100 {
//!     if ring.try_pop().is_some() {
//!         received += 1;
//!     }
//! }
//!
//! producer.join().unwrap();
//! ```
//!
//! # Slot states
//!
//! The sequence number encodes the slot's state relative to a ticket `t`
//! with `t % capacity == slot index`:
//!
//! - `sequence == t`: empty, waiting for producer `t`
//! - `sequence == t + 1`: full, waiting for consumer `t`
//! - `sequence == t + capacity`: recycled, writable next lap
//!
//! The release store that publishes a sequence value and the acquire load
//! that observes it form the happens-before edge covering the element's
//! construction and destruction.
//!
//! # Blocking vs non-blocking
//!
//! `try_push`/`try_pop` claim tickets with compare-and-swap and report
//! full/empty immediately. `push`/`pop` claim unconditionally with
//! fetch-add, which is cheaper under contention but cannot fail: a thread
//! that claims a ticket must complete it, or the slot stalls forever.

use std::cell::UnsafeCell;
use std::fmt;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_utils::CachePadded;

use crate::{CapacityError, Full};

/// A slot in the sequenced ring buffer.
#[repr(C)]
struct Slot<T> {
    sequence: AtomicU64,
    data: UnsafeCell<MaybeUninit<T>>,
}

impl<T> Slot<T> {
    fn new(sequence: u64) -> Self {
        Self {
            sequence: AtomicU64::new(sequence),
            data: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }
}

mod sealed {
    pub trait Sealed {}
}

/// Placement of the head and tail tickets, chosen at compile time.
///
/// This is a sealed trait with exactly two implementors: [`Padded`] and
/// [`Packed`]. It exists so a benchmark can monomorphise over both layouts
/// and measure the cost of false sharing without a branch in the hot path.
pub trait TicketLayout: sealed::Sealed {
    /// Storage for the two claim tickets.
    #[doc(hidden)]
    type Tickets: Tickets;
}

#[doc(hidden)]
pub trait Tickets: Send + Sync {
    fn new() -> Self;
    fn head(&self) -> &AtomicU64;
    fn tail(&self) -> &AtomicU64;
}

/// Head and tail tickets on separate cache lines (the default).
///
/// Producers contend on `head` and consumers on `tail`; padding keeps the
/// two groups from invalidating each other's cache line.
#[derive(Debug)]
pub enum Padded {}

/// Head and tail tickets packed into adjacent words.
///
/// This is the false-sharing antipattern, kept as a benchmark control. Use
/// [`Padded`] for real workloads.
#[derive(Debug)]
pub enum Packed {}

impl sealed::Sealed for Padded {}
impl sealed::Sealed for Packed {}

impl TicketLayout for Padded {
    type Tickets = PaddedTickets;
}

impl TicketLayout for Packed {
    type Tickets = PackedTickets;
}

#[doc(hidden)]
#[derive(Debug)]
pub struct PaddedTickets {
    head: CachePadded<AtomicU64>,
    tail: CachePadded<AtomicU64>,
}

impl Tickets for PaddedTickets {
    fn new() -> Self {
        Self {
            head: CachePadded::new(AtomicU64::new(0)),
            tail: CachePadded::new(AtomicU64::new(0)),
        }
    }

    #[inline]
    fn head(&self) -> &AtomicU64 {
        &self.head
    }

    #[inline]
    fn tail(&self) -> &AtomicU64 {
        &self.tail
    }
}

#[doc(hidden)]
#[derive(Debug)]
pub struct PackedTickets {
    head: AtomicU64,
    tail: AtomicU64,
}

impl Tickets for PackedTickets {
    fn new() -> Self {
        Self {
            head: AtomicU64::new(0),
            tail: AtomicU64::new(0),
        }
    }

    #[inline]
    fn head(&self) -> &AtomicU64 {
        &self.head
    }

    #[inline]
    fn tail(&self) -> &AtomicU64 {
        &self.tail
    }
}

/// Lock-free bounded MPMC ring buffer.
///
/// The capacity is fixed at construction and must be a power of two of at
/// least 2. Elements occupy raw slot storage: a successful push runs exactly
/// one move into the slot, a successful pop exactly one move out. Failed
/// non-blocking operations touch no element state. No operation allocates.
///
/// The `L` parameter selects the ticket layout; see [`TicketLayout`].
#[repr(C)]
pub struct MpmcRing<T, L: TicketLayout = Padded> {
    // Claim tickets first so CachePadded keeps them off the header's line.
    tickets: L::Tickets,
    buffer: Box<[Slot<T>]>,
    mask: u64,
}

// Safety: slot access is coordinated by the sequence protocol; the ring may
// be shared freely once T can move between threads.
unsafe impl<T: Send, L: TicketLayout> Send for MpmcRing<T, L> {}
unsafe impl<T: Send, L: TicketLayout> Sync for MpmcRing<T, L> {}

impl<T, L: TicketLayout> MpmcRing<T, L> {
    /// Creates a ring with the given capacity.
    ///
    /// # Errors
    ///
    /// Returns [`CapacityError`] if `capacity` is below 2 or not a power of
    /// two. The capacity is never rounded: callers choosing a benchmark size
    /// should not have it silently changed underneath them.
    ///
    /// # Example
    ///
    /// ```
    /// use pulse_queue::mpmc::MpmcRing;
    ///
    /// assert!(MpmcRing::<u64>::with_capacity(64).is_ok());
    /// assert!(MpmcRing::<u64>::with_capacity(48).is_err());
    /// assert!(MpmcRing::<u64>::with_capacity(1).is_err());
    /// ```
    pub fn with_capacity(capacity: usize) -> Result<Self, CapacityError> {
        if capacity < 2 || !capacity.is_power_of_two() {
            return Err(CapacityError(capacity));
        }

        // Slot i starts at sequence i: empty, waiting for producer ticket i.
        let buffer: Box<[Slot<T>]> = (0..capacity as u64).map(Slot::new).collect();

        Ok(Self {
            tickets: L::Tickets::new(),
            buffer,
            mask: capacity as u64 - 1,
        })
    }

    /// Attempts to push a value without blocking.
    ///
    /// Returns `Err(Full(value))` if the ring is full, handing the value
    /// back to the caller.
    ///
    /// # Example
    ///
    /// ```
    /// use pulse_queue::mpmc::MpmcRing;
    ///
    /// let ring = MpmcRing::<u32>::with_capacity(2).unwrap();
    ///
    /// assert!(ring.try_push(1).is_ok());
    /// assert!(ring.try_push(2).is_ok());
    ///
    /// // Ring is now full; ownership comes back in the error.
    /// let err = ring.try_push(3).unwrap_err();
    /// assert_eq!(err.into_inner(), 3);
    /// ```
    #[inline]
    pub fn try_push(&self, value: T) -> Result<(), Full<T>> {
        let head = self.tickets.head();
        loop {
            let ticket = head.load(Ordering::Relaxed);
            let slot = self.slot(ticket);
            let seq = slot.sequence.load(Ordering::Acquire);
            let diff = seq.wrapping_sub(ticket) as i64;

            if diff < 0 {
                // Slot still holds the previous generation: ring is full.
                return Err(Full(value));
            }
            if diff == 0
                && head
                    .compare_exchange_weak(
                        ticket,
                        ticket.wrapping_add(1),
                        Ordering::Relaxed,
                        Ordering::Relaxed,
                    )
                    .is_ok()
            {
                unsafe { (*slot.data.get()).write(value) };
                slot.sequence
                    .store(ticket.wrapping_add(1), Ordering::Release);
                return Ok(());
            }
            // diff > 0 (another producer advanced) or lost the claim: retry.
        }
    }

    /// Pushes a value, spinning until a slot is available.
    ///
    /// Claims a ticket unconditionally with fetch-add, then waits for the
    /// slot to be writable. Cheaper than [`try_push`](Self::try_push) under
    /// contention, but cannot report a full ring; on a full ring it waits
    /// for a consumer.
    #[inline]
    pub fn push(&self, value: T) {
        let ticket = self.tickets.head().fetch_add(1, Ordering::Relaxed);
        let slot = self.slot(ticket);

        while slot.sequence.load(Ordering::Acquire) != ticket {
            std::hint::spin_loop();
        }

        unsafe { (*slot.data.get()).write(value) };
        slot.sequence
            .store(ticket.wrapping_add(1), Ordering::Release);
    }

    /// Attempts to pop a value without blocking.
    ///
    /// Returns `None` if the ring is empty.
    ///
    /// # Example
    ///
    /// ```
    /// use pulse_queue::mpmc::MpmcRing;
    ///
    /// let ring = MpmcRing::<u32>::with_capacity(8).unwrap();
    ///
    /// assert_eq!(ring.try_pop(), None);
    ///
    /// ring.try_push(42).unwrap();
    /// assert_eq!(ring.try_pop(), Some(42));
    /// ```
    #[inline]
    pub fn try_pop(&self) -> Option<T> {
        let tail = self.tickets.tail();
        loop {
            let ticket = tail.load(Ordering::Relaxed);
            let slot = self.slot(ticket);
            let seq = slot.sequence.load(Ordering::Acquire);
            let diff = seq.wrapping_sub(ticket.wrapping_add(1)) as i64;

            if diff < 0 {
                // No producer has published this ticket yet: ring is empty.
                return None;
            }
            if diff == 0
                && tail
                    .compare_exchange_weak(
                        ticket,
                        ticket.wrapping_add(1),
                        Ordering::Relaxed,
                        Ordering::Relaxed,
                    )
                    .is_ok()
            {
                let value = unsafe { (*slot.data.get()).assume_init_read() };
                slot.sequence
                    .store(ticket.wrapping_add(self.capacity() as u64), Ordering::Release);
                return Some(value);
            }
            // diff > 0 (another consumer advanced) or lost the claim: retry.
        }
    }

    /// Pops a value, spinning until one is available.
    ///
    /// Claims a ticket unconditionally with fetch-add, then waits for a
    /// producer to publish it. Cannot report an empty ring.
    #[inline]
    pub fn pop(&self) -> T {
        let ticket = self.tickets.tail().fetch_add(1, Ordering::Relaxed);
        let slot = self.slot(ticket);

        while slot.sequence.load(Ordering::Acquire) != ticket.wrapping_add(1) {
            std::hint::spin_loop();
        }

        let value = unsafe { (*slot.data.get()).assume_init_read() };
        slot.sequence
            .store(ticket.wrapping_add(self.capacity() as u64), Ordering::Release);
        value
    }

    /// Returns the fixed capacity of the ring.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Returns the number of elements currently in the ring, clamped to
    /// `[0, capacity]`.
    ///
    /// Advisory: uses relaxed loads of both tickets and is exact only when
    /// the ring is quiescent. Blocking claims in flight can make the raw
    /// ticket difference exceed the capacity (or underflow); the clamp keeps
    /// the answer in range but callers must not rely on it for correctness.
    #[inline]
    pub fn len(&self) -> usize {
        let head = self.tickets.head().load(Ordering::Relaxed);
        let tail = self.tickets.tail().load(Ordering::Relaxed);
        head.wrapping_sub(tail).min(self.capacity() as u64) as usize
    }

    /// Returns `true` if the ring appears empty. Advisory, like
    /// [`len`](Self::len).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if the ring appears full. Advisory, like
    /// [`len`](Self::len).
    #[inline]
    pub fn is_full(&self) -> bool {
        self.len() == self.capacity()
    }

    /// Maps a ticket to its slot in `[0, capacity)`.
    #[inline]
    fn slot(&self, ticket: u64) -> &Slot<T> {
        // The mask keeps the index in bounds by construction.
        unsafe { self.buffer.get_unchecked((ticket & self.mask) as usize) }
    }
}

impl<T, L: TicketLayout> Drop for MpmcRing<T, L> {
    fn drop(&mut self) {
        if !std::mem::needs_drop::<T>() {
            return;
        }

        // Exclusive access: walk [tail, head) and drop the slots whose
        // sequence still marks them full. A ticket claimed by a blocking
        // caller that never completed is skipped.
        let head = self.tickets.head().load(Ordering::Relaxed);
        let mut ticket = self.tickets.tail().load(Ordering::Relaxed);

        while ticket != head {
            let slot = self.slot(ticket);
            if slot.sequence.load(Ordering::Relaxed) == ticket.wrapping_add(1) {
                unsafe { (*slot.data.get()).assume_init_drop() };
            }
            ticket = ticket.wrapping_add(1);
        }
    }
}

impl<T, L: TicketLayout> fmt::Debug for MpmcRing<T, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MpmcRing")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}
