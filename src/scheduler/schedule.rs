//! Schedule entries, user-facing handles, and the creation builder.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::pool::{Work, WorkPool};

/// Process-lifetime schedule id counter.
static NEXT_ID: AtomicU64 = AtomicU64::new(0);

/// The scheduler-owned record of a standing intent to run work.
///
/// Entries live in exactly one of the two registry maps at any time and move
/// between them by value; every mutable field is protected by the scheduler
/// mutex. `dropped` is atomic because handles read it without the lock.
pub(crate) struct Entry {
    pub id: u64,
    pub func: Work,
    pub run_cb: Option<Work>,
    pub abort_cb: Option<Work>,
    /// Runs exactly once when the schedule is destroyed (explicit delete or
    /// scheduler teardown). Owns whatever cleanup the work's captured state
    /// needs.
    pub finalizer: Option<Box<dyn FnOnce() + Send>>,
    /// Repetition interval, ns. Must be > 0 unless `repeat == 1`.
    pub period: u64,
    /// Next absolute deadline, ns (wall-clock domain).
    pub start: u64,
    /// Remaining executions; 0 means infinite.
    pub repeat: u64,
    pub pool: Option<Arc<dyn WorkPool>>,
    pub priority: Option<i32>,
    pub dropped: Arc<AtomicU64>,
    /// Mirrors due-time-map membership.
    pub scheduled: bool,
}

impl Entry {
    /// Runs the finalizer if one is present. Idempotent: the finalizer can
    /// only be taken once.
    pub fn finalize(&mut self) {
        if let Some(f) = self.finalizer.take() {
            f();
        }
    }
}

/// Handle to a schedule owned by a [`Scheduler`](crate::scheduler::Scheduler).
///
/// The handle is deliberately not `Clone`: `Scheduler::delete` consumes it,
/// which makes use-after-delete unrepresentable.
#[derive(Debug)]
pub struct Schedule {
    pub(crate) id: u64,
    pub(crate) dropped: Arc<AtomicU64>,
}

impl Schedule {
    /// Process-unique schedule id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Number of occurrences the pool has refused so far.
    ///
    /// Lock-free; this is the only schedule field readable without the
    /// scheduler lock.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Acquire)
    }
}

/// Builder for [`Scheduler::create`](crate::scheduler::Scheduler::create).
///
/// ```
/// use std::time::Duration;
/// use cadre::scheduler::ScheduleSpec;
///
/// let spec = ScheduleSpec::new(|| println!("tick"))
///     .period(Duration::from_millis(100))
///     .start_offset(Duration::from_millis(50))
///     .repeat(3);
/// ```
pub struct ScheduleSpec {
    func: Work,
    run_cb: Option<Work>,
    abort_cb: Option<Work>,
    finalizer: Option<Box<dyn FnOnce() + Send>>,
    period_ns: u64,
    offset_ns: u64,
    repeat: u64,
    pool: Option<Arc<dyn WorkPool>>,
    priority: Option<i32>,
}

impl ScheduleSpec {
    /// Starts a spec around the work function. Defaults: one-shot
    /// (`repeat = 1`), immediate (`start_offset = 0`), no pool, no priority.
    pub fn new(func: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            func: Arc::new(func),
            run_cb: None,
            abort_cb: None,
            finalizer: None,
            period_ns: 0,
            offset_ns: 0,
            repeat: 1,
            pool: None,
            priority: None,
        }
    }

    /// Repetition interval. Required whenever `repeat != 1`.
    pub fn period(mut self, period: Duration) -> Self {
        self.period_ns = period.as_nanos() as u64;
        self
    }

    /// Delay before the first deadline.
    pub fn start_offset(mut self, offset: Duration) -> Self {
        self.offset_ns = offset.as_nanos() as u64;
        self
    }

    /// Number of executions; 0 means repeat forever.
    pub fn repeat(mut self, repeat: u64) -> Self {
        self.repeat = repeat;
        self
    }

    /// Pool to submit dispatches to. Without one, every dispatch spawns a
    /// dedicated thread.
    pub fn pool(mut self, pool: Arc<dyn WorkPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Priority for pool submission or spawned-thread scheduling.
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Callback invoked just before each dispatch attempt.
    pub fn run_callback(mut self, cb: impl Fn() + Send + Sync + 'static) -> Self {
        self.run_cb = Some(Arc::new(cb));
        self
    }

    /// Callback invoked when a dispatch is dropped by the pool.
    pub fn abort_callback(mut self, cb: impl Fn() + Send + Sync + 'static) -> Self {
        self.abort_cb = Some(Arc::new(cb));
        self
    }

    /// Cleanup run exactly once when the schedule is destroyed.
    pub fn finalizer(mut self, f: impl FnOnce() + Send + 'static) -> Self {
        self.finalizer = Some(Box::new(f));
        self
    }

    /// Materialises the entry with its first deadline anchored to the
    /// strictly monotonic clock, so creation order stays observable even for
    /// identical offsets.
    pub(crate) fn into_entry_now(self) -> Entry {
        let start = crate::time::monotonic_next_ns() + self.offset_ns;
        self.into_entry(start)
    }

    /// Materialises the entry with `start = start_ns` (caller supplies the
    /// absolute first deadline).
    ///
    /// # Panics
    ///
    /// Panics if `repeat != 1` and the period is zero; such a schedule would
    /// re-queue itself at the same instant forever.
    pub(crate) fn into_entry(self, start_ns: u64) -> Entry {
        assert!(
            self.repeat == 1 || self.period_ns > 0,
            "a repeating schedule requires a non-zero period"
        );
        Entry {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            func: self.func,
            run_cb: self.run_cb,
            abort_cb: self.abort_cb,
            finalizer: self.finalizer,
            period: self.period_ns,
            start: start_ns,
            repeat: self.repeat,
            pool: self.pool,
            priority: self.priority,
            dropped: Arc::new(AtomicU64::new(0)),
            scheduled: false,
        }
    }
}
