//! Pool admission under saturation: refused dispatches are dropped, counted,
//! and reported through the abort callback.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use cadre::{FixedPool, ScheduleSpec, Scheduler, SchedulerConfig, WorkPool};

/// A periodic schedule against a saturated single-worker pool: roughly one
/// invocation (the sleeping worker), several drops, one abort callback per
/// drop, and a warn only for the first.
#[test]
fn saturated_pool_drops_and_counts() {
    let pool: Arc<dyn WorkPool> = Arc::new(FixedPool::new(1, 1));
    let scheduler = Scheduler::new(SchedulerConfig::default());

    let invocations = Arc::new(AtomicUsize::new(0));
    let aborts = Arc::new(AtomicUsize::new(0));
    let invocations2 = Arc::clone(&invocations);
    let aborts2 = Arc::clone(&aborts);

    let s = scheduler.create(
        ScheduleSpec::new(move || {
            invocations2.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(500));
        })
        .period(Duration::from_millis(50))
        .repeat(0)
        .pool(Arc::clone(&pool))
        .abort_callback(move || {
            aborts2.fetch_add(1, Ordering::SeqCst);
        }),
    );
    assert!(scheduler.add(&s));
    scheduler.start();

    thread::sleep(Duration::from_millis(400));
    scheduler.stop();

    // The worker is still inside its 500 ms sleep: exactly one invocation
    // started; the second admission is parked in the queue.
    assert_eq!(invocations.load(Ordering::SeqCst), 1);

    let dropped = s.dropped();
    assert!(dropped >= 3, "expected sustained drops, got {dropped}");
    assert_eq!(aborts.load(Ordering::SeqCst) as u64, dropped);

    // Dropping the scheduler then the pool drains the queued job.
    drop(scheduler);
    drop(pool);
    assert_eq!(invocations.load(Ordering::SeqCst), 2);
}

/// Occurrences refused by the pool are never retried: after the pool frees
/// up, only newly due occurrences are admitted.
#[test]
fn drops_are_not_retried() {
    let pool: Arc<dyn WorkPool> = Arc::new(FixedPool::new(1, 1));
    let scheduler = Scheduler::new(SchedulerConfig::default());

    let invocations = Arc::new(AtomicUsize::new(0));
    let invocations2 = Arc::clone(&invocations);

    let s = scheduler.create(
        ScheduleSpec::new(move || {
            invocations2.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(200));
        })
        .period(Duration::from_millis(25))
        .repeat(0)
        .pool(Arc::clone(&pool)),
    );
    scheduler.add(&s);
    scheduler.start();

    thread::sleep(Duration::from_millis(300));
    scheduler.stop();
    let dropped = s.dropped();
    let ran = invocations.load(Ordering::SeqCst);
    assert!(dropped >= 1);

    // Let the worker drain everything that was ever admitted.
    thread::sleep(Duration::from_millis(500));
    let drained = invocations.load(Ordering::SeqCst);

    // Total admissions = invocations so far + at most one queued job; the
    // dropped occurrences must not reappear.
    assert!(
        drained <= ran + 2,
        "dropped occurrences were retried: ran {ran}, drained {drained}"
    );
}
