//! Run configuration and validation.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Everything that shapes one benchmark run.
///
/// A `Config` is validated once, before any thread is spawned; the harness
/// treats it as immutable afterwards and snapshots it into the results.
#[derive(Debug, Clone)]
pub struct Config {
    /// Number of producer threads (>= 1).
    pub producers: usize,
    /// Number of consumer threads (>= 1).
    pub consumers: usize,
    /// Ring capacity in elements; power of two, >= 2.
    pub capacity: usize,
    /// Blocking push/pop (fetch-add tickets) vs non-blocking (CAS tickets).
    pub blocking: bool,
    /// Total wall time of the run, warmup included.
    pub duration: Duration,
    /// Initial window during which nothing is recorded. Must be shorter
    /// than `duration`.
    pub warmup: Duration,
    /// Width of one latency histogram bucket, in nanoseconds (> 0).
    pub bucket_width_ns: u64,
    /// Number of histogram buckets (> 0); samples beyond the last bucket
    /// land in the overflow counter.
    pub max_buckets: usize,
    /// Bind each worker to a fixed logical CPU.
    pub pinning: bool,
    /// Keep the head and tail tickets on separate cache lines. Off is the
    /// measured false-sharing antipattern.
    pub padding: bool,
    /// Drive 1024-byte elements instead of 8-byte ones.
    pub large_payload: bool,
    /// Wrap the element in a uniquely-owned heap allocation.
    pub move_only_payload: bool,
    /// Output CSV path; parent directories are created if missing.
    pub csv_path: PathBuf,
    /// Free-form string recorded verbatim in the output.
    pub notes: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            producers: 1,
            consumers: 1,
            capacity: 65_536,
            blocking: true,
            duration: Duration::from_millis(17_500),
            warmup: Duration::from_millis(2_500),
            bucket_width_ns: 5,
            max_buckets: 4_096,
            pinning: true,
            padding: true,
            large_payload: false,
            move_only_payload: false,
            csv_path: PathBuf::from("results/raw/results.csv"),
            notes: String::new(),
        }
    }
}

impl Config {
    /// Checks every precondition the harness relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.producers == 0 {
            return Err(ConfigError::NoProducers);
        }
        if self.consumers == 0 {
            return Err(ConfigError::NoConsumers);
        }
        if self.capacity < 2 || !self.capacity.is_power_of_two() {
            return Err(ConfigError::Capacity(self.capacity));
        }
        if self.duration <= self.warmup {
            return Err(ConfigError::WarmupExceedsDuration);
        }
        if self.bucket_width_ns == 0 {
            return Err(ConfigError::BucketWidth);
        }
        if self.max_buckets == 0 {
            return Err(ConfigError::BucketCount);
        }
        Ok(())
    }
}

/// A configuration precondition that failed; the run never starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// `producers` was zero.
    NoProducers,
    /// `consumers` was zero.
    NoConsumers,
    /// `capacity` was below 2 or not a power of two.
    Capacity(usize),
    /// `warmup` was not strictly shorter than `duration`.
    WarmupExceedsDuration,
    /// `bucket_width_ns` was zero.
    BucketWidth,
    /// `max_buckets` was zero.
    BucketCount,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoProducers => write!(f, "at least one producer is required"),
            Self::NoConsumers => write!(f, "at least one consumer is required"),
            Self::Capacity(c) => {
                write!(f, "capacity must be a power of two >= 2, got {c}")
            }
            Self::WarmupExceedsDuration => {
                write!(f, "total duration must be greater than the warmup time")
            }
            Self::BucketWidth => write!(f, "histogram bucket width must be > 0"),
            Self::BucketCount => write!(f, "histogram bucket count must be > 0"),
        }
    }
}

impl std::error::Error for ConfigError {}
