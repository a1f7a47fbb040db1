//! The scheduler: a single dispatcher thread over the schedule registry.
//!
//! # Architecture
//!
//! ```text
//!   API callers (any thread)                dispatcher thread
//!   ────────────────────────                ─────────────────
//!   create/add/remove/reset ──┐        ┌── state wait (RUNNING|DELETED)
//!   delete/start/stop         │        │
//!                             ▼        ▼
//!                      ┌──────────────────────┐
//!                      │  Mutex<Inner>        │
//!                      │   lifecycle state    │
//!                      │   due-time map       │──► timed wait until front
//!                      │   idle map           │    deadline, then dispatch:
//!                      │   next wake (ns)     │    pool.try_submit or spawn,
//!                      └──────────────────────┘    re-queue / retire
//!                             ▲
//!                      Condvar (broadcast): mutators that newly front the
//!                      queue, lifecycle transitions, stop acknowledgement
//! ```
//!
//! One mutex guards the maps, every mutable schedule field, and the lifecycle
//! state; the per-schedule drop counter is the only field read without it.
//! The dispatcher is the sole consumer of the due-time map.
//!
//! # Dispatch semantics
//!
//! - One schedule is dispatched per wakeup; the loop then recomputes the next
//!   deadline, so a backlog of due schedules drains in consecutive immediate
//!   wakeups in deadline order.
//! - A refused pool submission is a *drop*: the occurrence is discarded (never
//!   retried), the abort callback runs, the atomic drop counter advances, and
//!   the first drop per schedule is logged at warn.
//! - Run/abort callbacks and pool admission execute under the scheduler lock.
//!   They are user code: they must return normally and must not call back
//!   into the scheduler.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

use serde_json::{Map, Value};
use tracing::{debug, info, trace, warn};

use crate::component::{Component, ComponentState};
use crate::container::{ComponentFactory, Container};
use crate::thread::{self, ThreadSpec};
use crate::time::{self, NANOS_PER_SEC};

use super::registry::Registry;
use super::schedule::{Schedule, ScheduleSpec};

/// Upper bound on a dispatcher sleep when no schedule is pending, so missed
/// signals cost at most one day, not forever.
const DEFAULT_WAKE_NS: u64 = 24 * 60 * 60 * NANOS_PER_SEC;

/// Dispatcher thread parameters.
#[derive(Clone, Copy, Debug, Default)]
pub struct SchedulerConfig {
    /// Scheduling priority for the dispatcher thread.
    pub priority: Option<i32>,
    /// Core to pin the dispatcher thread to.
    pub affinity: Option<usize>,
}

struct Inner {
    state: ComponentState,
    registry: Registry,
    /// Absolute deadline (ns) of the dispatcher's next timed wake.
    wake_at: u64,
    /// True while the dispatcher is parked in its state wait. Raised (with a
    /// broadcast) before parking; this is the stop acknowledgement.
    dispatcher_idle: bool,
}

struct Core {
    inner: Mutex<Inner>,
    cond: Condvar,
}

impl Core {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().expect("scheduler mutex poisoned")
    }

    /// Lock with poison recovery, for teardown paths that must not panic.
    fn lock_or_recover(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poison) => poison.into_inner(),
        }
    }
}

/// Deadline-driven scheduler with a dedicated dispatcher thread.
///
/// Created in the `Initial` state with the dispatcher already launched and
/// parked; [`start`](Scheduler::start) begins dispatching. Dropping the
/// scheduler tears everything down: the dispatcher observes `Deleted`, the
/// thread is joined, and every remaining schedule's finalizer runs exactly
/// once.
pub struct Scheduler {
    core: Arc<Core>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    /// Allocates the scheduler and launches its dispatcher thread.
    pub fn new(config: SchedulerConfig) -> Self {
        info!(
            "scheduler alloc (priority: {:?} affinity: {:?})",
            config.priority, config.affinity
        );
        let core = Arc::new(Core {
            inner: Mutex::new(Inner {
                state: ComponentState::Initial,
                registry: Registry::new(),
                wake_at: time::now_ns(),
                dispatcher_idle: false,
            }),
            cond: Condvar::new(),
        });

        let dispatch_core = Arc::clone(&core);
        let spec = ThreadSpec {
            name: "scheduler-dispatch".into(),
            priority: config.priority,
            affinity: config.affinity,
        };
        let handle = thread::spawn(spec, move || dispatch_loop(&dispatch_core))
            .expect("spawn scheduler dispatcher");

        Self {
            core,
            dispatcher: Mutex::new(Some(handle)),
        }
    }

    /// Transitions to `Running` and wakes the dispatcher.
    pub fn start(&self) {
        trace!("scheduler start");
        let mut inner = self.core.lock();
        if inner.state != ComponentState::Running {
            inner.state = ComponentState::Running;
            self.core.cond.notify_all();
        }
    }

    /// Transitions to `Stopped` and waits for the dispatcher to park.
    ///
    /// On return the dispatcher is in its state wait and will not dispatch
    /// again until [`start`](Scheduler::start).
    pub fn stop(&self) {
        trace!("scheduler stop");
        let mut inner = self.core.lock();
        if inner.state == ComponentState::Stopped && inner.dispatcher_idle {
            return;
        }
        inner.state = ComponentState::Stopped;
        self.core.cond.notify_all();
        while !inner.dispatcher_idle {
            inner = self
                .core
                .cond
                .wait(inner)
                .expect("scheduler mutex poisoned");
        }
    }

    /// Creates a schedule and parks it in the idle map.
    ///
    /// The first deadline is `monotonic_next_ns() + start_offset`; the
    /// monotonic read keeps creation order observable even for identical
    /// offsets. The schedule does not dispatch until
    /// [`add`](Scheduler::add)ed.
    pub fn create(&self, spec: ScheduleSpec) -> Schedule {
        let entry = spec.into_entry_now();
        trace!(
            "schedule create #{} (period: {} repeat: {})",
            entry.id,
            entry.period,
            entry.repeat
        );
        let handle = Schedule {
            id: entry.id,
            dropped: Arc::clone(&entry.dropped),
        };
        self.core.lock().registry.idle_add(entry);
        handle
    }

    /// Moves an idle schedule into the due-time map. Returns true iff the
    /// transition occurred (false when already scheduled).
    ///
    /// A schedule whose deadline already passed fires on the dispatcher's
    /// next wakeup rather than waiting for a period boundary.
    pub fn add(&self, schedule: &Schedule) -> bool {
        trace!("schedule add #{}", schedule.id);
        let mut inner = self.core.lock();
        if inner.registry.is_scheduled(schedule.id) {
            return false;
        }
        let entry = inner
            .registry
            .idle_remove(schedule.id)
            .unwrap_or_else(|| misuse(schedule.id));
        let front = inner.registry.queue_add(entry);
        if front && inner.state == ComponentState::Running {
            self.core.cond.notify_all();
        }
        true
    }

    /// Moves a scheduled entry back to the idle map. Returns true iff the
    /// transition occurred (false when already idle).
    pub fn remove(&self, schedule: &Schedule) -> bool {
        trace!("schedule remove #{}", schedule.id);
        let mut inner = self.core.lock();
        match inner.registry.queue_remove(schedule.id) {
            Some(entry) => {
                inner.registry.idle_add(entry);
                true
            }
            None => {
                if inner.registry.entry_mut(schedule.id).is_none() {
                    misuse(schedule.id);
                }
                false
            }
        }
    }

    /// Pushes the next deadline out to `now + period`.
    ///
    /// If the schedule is queued it is re-keyed (and the dispatcher is woken
    /// when it becomes the new front); if idle, only its stored deadline
    /// moves.
    pub fn reset(&self, schedule: &Schedule) {
        trace!("schedule reset #{}", schedule.id);
        let mut inner = self.core.lock();
        let entry = inner
            .registry
            .entry_mut(schedule.id)
            .unwrap_or_else(|| misuse(schedule.id));
        let next = entry.period + time::now_ns();
        if entry.scheduled {
            let front = inner
                .registry
                .queue_update(schedule.id, next)
                .expect("scheduled entry must be queued");
            if front && inner.state == ComponentState::Running {
                self.core.cond.notify_all();
            }
        } else {
            entry.start = next;
        }
    }

    /// Replaces the pre-dispatch callback.
    pub fn set_run_callback(&self, schedule: &Schedule, cb: impl Fn() + Send + Sync + 'static) {
        let mut inner = self.core.lock();
        inner
            .registry
            .entry_mut(schedule.id)
            .unwrap_or_else(|| misuse(schedule.id))
            .run_cb = Some(Arc::new(cb));
    }

    /// Replaces the dropped-dispatch callback.
    pub fn set_abort_callback(&self, schedule: &Schedule, cb: impl Fn() + Send + Sync + 'static) {
        let mut inner = self.core.lock();
        inner
            .registry
            .entry_mut(schedule.id)
            .unwrap_or_else(|| misuse(schedule.id))
            .abort_cb = Some(Arc::new(cb));
    }

    /// Destroys a schedule, removing it from whichever map holds it and
    /// running its finalizer. Consumes the handle, so a deleted schedule
    /// cannot be touched again.
    pub fn delete(&self, schedule: Schedule) {
        trace!("schedule delete #{}", schedule.id);
        let mut entry = {
            let mut inner = self.core.lock();
            inner
                .registry
                .remove(schedule.id)
                .unwrap_or_else(|| misuse(schedule.id))
        };
        // Finalizer is user code; run it outside the lock.
        entry.finalize();
    }

    fn lifecycle_state(&self) -> ComponentState {
        self.core.lock().state
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        trace!("scheduler free");
        {
            let mut inner = self.core.lock_or_recover();
            inner.state = ComponentState::Deleted;
            self.core.cond.notify_all();
        }
        let handle = match self.dispatcher.lock() {
            Ok(mut guard) => guard.take(),
            Err(poison) => poison.into_inner().take(),
        };
        if let Some(handle) = handle {
            let _ = handle.join();
        }
        // Dispatcher is gone; drain both maps and run each finalizer once.
        let drained = self.core.lock_or_recover().registry.drain();
        for mut entry in drained {
            entry.finalize();
        }
    }
}

impl Component for Scheduler {
    fn start(&self) {
        Scheduler::start(self);
    }

    fn stop(&self) {
        Scheduler::stop(self);
    }

    fn state(&self) -> ComponentState {
        self.lifecycle_state()
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

#[cold]
fn misuse(id: u64) -> ! {
    panic!("schedule #{id} is not owned by this scheduler");
}

/// Body of the dispatcher thread.
///
/// Two suspension points, both releasing the lock: the state wait (until
/// `Running` or `Deleted`) and the timed wait (until the next deadline, a
/// mutator signal, or a spurious wake). Exits only on `Deleted`.
fn dispatch_loop(core: &Core) {
    let mut inner = core.lock();
    loop {
        // State wait. Raise the idle flag once per park so stop() observers
        // know the dispatcher cannot be mid-dispatch.
        while !matches!(
            inner.state,
            ComponentState::Running | ComponentState::Deleted
        ) {
            if !inner.dispatcher_idle {
                inner.dispatcher_idle = true;
                core.cond.notify_all();
            }
            inner = core.cond.wait(inner).expect("scheduler mutex poisoned");
        }
        if inner.state == ComponentState::Deleted {
            break;
        }
        inner.dispatcher_idle = false;

        // Next wake: the front deadline, or a bounded default when the queue
        // is empty. Recomputed before every wait so a restart immediately
        // notices work queued while stopped.
        inner.wake_at = inner
            .registry
            .front_start()
            .unwrap_or_else(|| time::now_ns() + DEFAULT_WAKE_NS);

        let timeout = Duration::from_nanos(inner.wake_at.saturating_sub(time::now_ns()));
        let (guard, _timed_out) = core
            .cond
            .wait_timeout(inner, timeout)
            .expect("scheduler mutex poisoned");
        inner = guard;

        if inner.state != ComponentState::Running {
            debug!(
                "dispatcher {}",
                if inner.state == ComponentState::Deleted {
                    "terminating"
                } else {
                    "stopping"
                }
            );
            if inner.state == ComponentState::Deleted {
                break;
            }
            continue;
        }

        if inner
            .registry
            .front_start()
            .is_some_and(|start| start < time::now_ns())
        {
            dispatch_front(&mut inner);
        }
    }
    debug!("dispatcher exited");
}

/// Dispatches the front of the due-time map, then re-queues or retires it.
/// Called with the lock held and a due front guaranteed.
fn dispatch_front(inner: &mut Inner) {
    let Some(mut entry) = inner.registry.pop_front() else {
        return;
    };

    if let Some(cb) = &entry.run_cb {
        cb();
    }

    match &entry.pool {
        Some(pool) => {
            trace!("running schedule #{} from pool", entry.id);
            if !pool.try_submit(Arc::clone(&entry.func), entry.priority) {
                if let Some(cb) = &entry.abort_cb {
                    cb();
                }
                // Sole writer of the drop counter; warn once per schedule.
                if entry.dropped.fetch_add(1, Ordering::AcqRel) == 0 {
                    warn!("scheduled event dropped for schedule #{}", entry.id);
                }
            }
        }
        None => {
            trace!("running schedule #{} as thread", entry.id);
            let work = Arc::clone(&entry.func);
            let spec = ThreadSpec {
                name: format!("schedule-{}", entry.id),
                priority: entry.priority,
                affinity: None,
            };
            if let Err(e) = thread::spawn(spec, move || work()) {
                warn!("schedule #{}: could not spawn thread: {}", entry.id, e);
            }
        }
    }

    let next = entry.period + time::now_ns();
    if entry.repeat > 0 {
        entry.repeat -= 1;
        if entry.repeat == 0 {
            trace!("schedule #{} now idle", entry.id);
            inner.registry.idle_add(entry);
            return;
        }
    }
    entry.start = next;
    inner.registry.queue_add(entry);
}

// ---------------------------------------------------------------------------
// Container factory
// ---------------------------------------------------------------------------

/// Factory for configuration-driven scheduler components (type
/// `"scheduler"`).
///
/// Recognised keys: `Logger` (name of a logger component in the same
/// container, resolved first so it starts earlier), `Affinity` (optional
/// core index), `Priority` (optional thread priority).
pub struct SchedulerFactory;

impl ComponentFactory for SchedulerFactory {
    fn component_type(&self) -> &'static str {
        "scheduler"
    }

    fn configure(
        &self,
        container: &Container,
        config: &Map<String, Value>,
    ) -> Option<Arc<dyn Component>> {
        if let Some(logger) = config.get("Logger").and_then(Value::as_str) {
            if container.find_component(logger).is_none() {
                warn!("scheduler: logger component '{}' not found", logger);
            }
        }
        let config = SchedulerConfig {
            priority: config
                .get("Priority")
                .and_then(Value::as_i64)
                .map(|v| v as i32),
            affinity: config
                .get("Affinity")
                .and_then(Value::as_i64)
                .map(|v| v as usize),
        };
        Some(Arc::new(Scheduler::new(config)))
    }
}
