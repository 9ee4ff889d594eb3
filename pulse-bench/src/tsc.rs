//! Cycle counter access and calibration.
//!
//! The counter is only required to be monotonic and advance at a stable
//! rate; [`nanos_per_cycle`] measures that rate against the monotonic wall
//! clock so samples can be reported in nanoseconds.

use std::time::{Duration, Instant};

/// How long the calibration window sleeps between counter reads.
const CALIBRATION_SLEEP: Duration = Duration::from_millis(100);

/// Reads the cycle counter.
///
/// Uses `rdtscp` on x86_64 (serialising enough for back-to-back latency
/// reads). Elsewhere this falls back to a monotonic clock in nanoseconds,
/// in which case [`nanos_per_cycle`] calibrates to ~1.0.
#[cfg(target_arch = "x86_64")]
#[inline]
pub fn read() -> u64 {
    unsafe {
        let mut aux: u32 = 0;
        core::arch::x86_64::__rdtscp(&mut aux)
    }
}

#[cfg(not(target_arch = "x86_64"))]
#[inline]
pub fn read() -> u64 {
    use std::sync::OnceLock;
    static START: OnceLock<Instant> = OnceLock::new();
    START.get_or_init(Instant::now).elapsed().as_nanos() as u64
}

/// Measures nanoseconds per counter tick.
///
/// Reads the counter, sleeps ~100 ms, reads it again, and divides the
/// elapsed wall-clock nanoseconds by the tick delta.
pub fn nanos_per_cycle() -> f64 {
    let t0 = Instant::now();
    let c0 = read();
    std::thread::sleep(CALIBRATION_SLEEP);
    let c1 = read();
    let elapsed = t0.elapsed();

    elapsed.as_nanos() as f64 / c1.wrapping_sub(c0).max(1) as f64
}

/// Converts a tick delta to nanoseconds with the calibrated ratio.
#[inline]
pub fn cycles_to_ns(cycles: u64, ns_per_cycle: f64) -> u64 {
    (cycles as f64 * ns_per_cycle) as u64
}
