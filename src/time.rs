//! Wall-clock timestamps in nanoseconds, plus a strictly monotonic variant.
//!
//! All scheduler deadlines live in the wall-clock nanosecond domain. The
//! strictly monotonic variant exists because deadlines double as ordered-map
//! keys: two calls must never return the same value, even from concurrent
//! threads on a coarse clock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

pub(crate) const NANOS_PER_MICRO: u64 = 1_000;
pub(crate) const NANOS_PER_MILLI: u64 = 1_000_000;
pub(crate) const NANOS_PER_SEC: u64 = 1_000_000_000;

/// Wall-clock nanoseconds since the Unix epoch.
///
/// Returns 0 if the system clock reads before the epoch.
#[inline]
pub fn now_ns() -> u64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs().saturating_mul(NANOS_PER_SEC) + u64::from(d.subsec_nanos()),
        Err(_) => 0,
    }
}

/// Wall-clock microseconds since the Unix epoch.
#[inline]
pub fn now_us() -> u64 {
    now_ns() / NANOS_PER_MICRO
}

/// Wall-clock milliseconds since the Unix epoch.
#[inline]
pub fn now_ms() -> u64 {
    now_ns() / NANOS_PER_MILLI
}

/// Wall-clock seconds since the Unix epoch.
#[inline]
pub fn now_secs() -> u64 {
    now_ns() / NANOS_PER_SEC
}

/// Last value handed out by [`monotonic_next_ns`].
static LAST_NS: AtomicU64 = AtomicU64::new(0);

/// Strictly increasing wall-clock nanoseconds.
///
/// Every call returns a value greater than every previously returned value,
/// across all threads: `max(now_ns(), last + 1)` published with a
/// compare-exchange loop. If the wall clock stalls or steps backwards the
/// result advances by single nanoseconds until the clock catches up.
pub fn monotonic_next_ns() -> u64 {
    let mut result = now_ns();
    let mut prev = LAST_NS.load(Ordering::Relaxed);
    loop {
        if result <= prev {
            result = prev + 1;
        }
        match LAST_NS.compare_exchange_weak(prev, result, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => return result,
            Err(actual) => prev = actual,
        }
    }
}
