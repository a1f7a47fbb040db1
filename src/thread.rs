//! Named thread spawning with optional scheduling priority and CPU affinity.
//!
//! The dispatcher thread and pool-less schedule dispatches both go through
//! [`spawn`]. Priority and affinity are applied from inside the new thread
//! before the payload runs.
//!
//! # Platform Support
//!
//! - **Linux**: priority via `pthread_setschedparam` (`SCHED_RR`), affinity
//!   via `pthread_setaffinity_np`.
//! - **Other**: both settings degrade to a logged warning; the thread still
//!   runs. Silently ignoring them would mislead deployments that rely on
//!   real-time dispatch, so the warning is unconditional.

use std::io;
use std::thread::{self, JoinHandle};

use tracing::warn;

/// Maximum core index accepted by the affinity API.
///
/// `CPU_SETSIZE` on Linux (computed from the struct size because the libc
/// constant is not a const fn). Out-of-range indices are rejected before they
/// can reach the `CPU_SET` macro.
#[cfg(target_os = "linux")]
pub const CPU_SET_CAPACITY: usize = std::mem::size_of::<libc::cpu_set_t>() * 8;

#[cfg(not(target_os = "linux"))]
pub const CPU_SET_CAPACITY: usize = 1024;

/// Parameters for a managed thread.
#[derive(Clone, Debug, Default)]
pub struct ThreadSpec {
    /// Thread name, visible in debuggers and panic messages.
    pub name: String,
    /// Optional scheduling priority. `None` keeps the inherited policy.
    pub priority: Option<i32>,
    /// Optional core to pin the thread to. `None` leaves placement to the OS.
    pub affinity: Option<usize>,
}

impl ThreadSpec {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            priority: None,
            affinity: None,
        }
    }
}

/// Spawns a thread, applying `spec.priority` and `spec.affinity` inside the
/// new thread before `f` runs.
///
/// # Errors
///
/// Returns the OS error if the thread itself cannot be created. Priority and
/// affinity failures are not errors: they are logged and the thread proceeds.
pub fn spawn<F>(spec: ThreadSpec, f: F) -> io::Result<JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    let ThreadSpec {
        name,
        priority,
        affinity,
    } = spec;
    let label = name.clone();
    thread::Builder::new().name(name).spawn(move || {
        if let Some(prio) = priority {
            if let Err(e) = set_current_priority(prio) {
                warn!("thread '{}': could not set priority {}: {}", label, prio, e);
            }
        }
        if let Some(core) = affinity {
            if let Err(e) = pin_current_to_core(core) {
                warn!("thread '{}': could not pin to core {}: {}", label, core, e);
            }
        }
        f();
    })
}

#[inline]
fn validate_core(core: usize) -> io::Result<()> {
    if core >= CPU_SET_CAPACITY {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("core index {core} exceeds CPU_SET_CAPACITY ({CPU_SET_CAPACITY})"),
        ));
    }
    Ok(())
}

/// Pins the calling thread to a single core.
#[cfg(target_os = "linux")]
pub fn pin_current_to_core(core: usize) -> io::Result<()> {
    // Bounds check prevents undefined behavior in the CPU_SET macro.
    validate_core(core)?;

    // SAFETY:
    // - a zeroed cpu_set_t is valid and CPU_ZERO re-initialises it
    // - core < CPU_SET_CAPACITY, so CPU_SET stays in bounds
    // - pthread_setaffinity_np returns error codes directly (not via errno)
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

#[cfg(not(target_os = "linux"))]
pub fn pin_current_to_core(core: usize) -> io::Result<()> {
    validate_core(core)?;
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "CPU affinity is not supported on this platform",
    ))
}

/// Sets the calling thread's scheduling priority (`SCHED_RR`).
///
/// Raising priority typically requires `CAP_SYS_NICE` or an rtprio rlimit;
/// callers treat failure as advisory.
#[cfg(target_os = "linux")]
pub fn set_current_priority(priority: i32) -> io::Result<()> {
    // SAFETY: sched_param is plain-old-data; pthread_setschedparam returns
    // its error code directly.
    unsafe {
        let min = libc::sched_get_priority_min(libc::SCHED_RR);
        let max = libc::sched_get_priority_max(libc::SCHED_RR);
        if min == -1 || max == -1 {
            return Err(io::Error::last_os_error());
        }
        let param = libc::sched_param {
            sched_priority: priority.clamp(min, max),
        };
        let rc = libc::pthread_setschedparam(libc::pthread_self(), libc::SCHED_RR, &param);
        if rc != 0 {
            return Err(io::Error::from_raw_os_error(rc));
        }
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
pub fn set_current_priority(_priority: i32) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "thread priority is not supported on this platform",
    ))
}
