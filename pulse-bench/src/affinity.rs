//! Thread-to-core pinning.
//!
//! Pinning workers to fixed logical CPUs removes core-migration noise from
//! the measurement. This is measurement hygiene, not optimisation.
//!
//! Linux gets a real implementation via `pthread_setaffinity_np`; platforms
//! without per-thread affinity get a no-op so runs still complete there,
//! with the `pinning` column recording what was requested.

use std::io;

/// Pins the calling thread to a logical CPU.
///
/// # Errors
///
/// On Linux, fails if the core index is out of range for the kernel's CPU
/// set or not in the set this process is allowed to run on (cgroups,
/// taskset). A failure is fatal to the worker: silently running unpinned
/// would mislead the results.
#[cfg(target_os = "linux")]
pub fn pin_current_thread(core: usize) -> io::Result<()> {
    let max_cores = std::mem::size_of::<libc::cpu_set_t>() * 8;
    if core >= max_cores {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("core index {core} exceeds the CPU set capacity ({max_cores})"),
        ));
    }

    // SAFETY: a zeroed cpu_set_t is valid, and the index was bounds-checked
    // above. pthread_setaffinity_np reports errors as a return code.
    unsafe {
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_ZERO(&mut set);
        libc::CPU_SET(core, &mut set);

        let rc = libc::pthread_setaffinity_np(
            libc::pthread_self(),
            std::mem::size_of::<libc::cpu_set_t>(),
            &set as *const _,
        );
        if rc != 0 {
            return Err(io::Error::from_raw_os_error(rc));
        }
    }
    Ok(())
}

/// No-op on platforms without per-thread affinity.
#[cfg(not(target_os = "linux"))]
pub fn pin_current_thread(_core: usize) -> io::Result<()> {
    Ok(())
}

/// Number of logical CPUs available to this process.
///
/// Respects cgroup limits and affinity masks; falls back to 1 if the
/// parallelism cannot be determined.
pub fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(1)
}
