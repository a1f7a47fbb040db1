//! Component container with a deadline-driven task scheduler, for long-lived
//! device services.
//!
//! # Overview
//!
//! Two subsystems, one crate:
//!
//! - The **scheduler** dispatches user work at configurable deadlines, with
//!   optional periodicity and repetition counts, submitting to a work pool or
//!   spawning dedicated threads. A single dispatcher thread sleeps until the
//!   earliest deadline; schedules live in two indexed maps (due-time, idle)
//!   guarded by one mutex.
//! - The **container** composes named components (the scheduler among them),
//!   wires them from JSON configuration with `${ENV}` substitution, and
//!   drives start/stop in declaration order and its reverse.
//!
//! ```text
//!   Runtime (process-level)
//!   ├── factory registry ── "scheduler" │ "logger" │ host factories
//!   ├── config loader ───── name → JSON document
//!   └── containers ──┬── Container "edge"
//!                    │     ├── Logger          (starts first)
//!                    │     ├── Scheduler ──────┐
//!                    │     └── app components  │ dispatcher thread
//!                    └── ...                   ▼
//!                                      due-time map ── pool.try_submit
//!                                      idle map            │ refused?
//!                                                          ▼ drop + count
//! ```
//!
//! # Quick start
//!
//! ```no_run
//! use std::time::Duration;
//! use cadre::{Scheduler, SchedulerConfig, ScheduleSpec};
//!
//! let scheduler = Scheduler::new(SchedulerConfig::default());
//! let tick = scheduler.create(
//!     ScheduleSpec::new(|| println!("tick"))
//!         .period(Duration::from_secs(1))
//!         .repeat(0), // forever
//! );
//! scheduler.add(&tick);
//! scheduler.start();
//! ```
//!
//! # Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`scheduler`] | Dispatcher, schedule registry, public schedule API |
//! | [`container`] | Containers, factories, runtime registries, config |
//! | [`component`] | The start/stop/state contract containers manage |
//! | [`pool`] | Work-pool admission trait + bounded reference pool |
//! | [`logging`] | Logger component over the `tracing` facade |
//! | [`thread`] | Named spawn with optional priority/affinity |
//! | [`time`] | Wall-clock ns and the strictly monotonic variant |

pub mod component;
pub mod container;
pub mod logging;
pub mod pool;
pub mod scheduler;
pub mod thread;
pub mod time;

pub use component::{Component, ComponentState, StateCell};
pub use container::{
    ComponentFactory, ConfigError, ConfigSource, Container, DirConfigSource, FactoryResolver,
    MemConfigSource, Runtime,
};
pub use logging::{LoggerComponent, LoggerFactory};
pub use pool::{FixedPool, Work, WorkPool};
pub use scheduler::{Schedule, ScheduleSpec, Scheduler, SchedulerConfig, SchedulerFactory};
