//! Component contract shared by the container and everything it manages.
//!
//! A component is anything with a start/stop lifecycle that a container can
//! hold by name: the scheduler, a logger, application services. Destruction
//! is `Drop`; the container releases its `Arc` and the component tears itself
//! down when the last holder lets go.

use std::any::Any;
use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle states a component moves through.
///
/// `Deleted` is only ever observed internally during teardown; a component
/// reachable from a container reports one of the other three.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ComponentState {
    Initial = 0,
    Running = 1,
    Stopped = 2,
    Deleted = 3,
}

impl ComponentState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => ComponentState::Running,
            2 => ComponentState::Stopped,
            3 => ComponentState::Deleted,
            _ => ComponentState::Initial,
        }
    }
}

/// A container-managed object with start/stop lifecycle hooks.
///
/// `start` and `stop` must be idempotent: the container calls them in bulk
/// and `delete_component` stops a component that is not already stopped.
pub trait Component: Send + Sync {
    fn start(&self);
    fn stop(&self);

    /// Current lifecycle state.
    fn state(&self) -> ComponentState;

    /// Downcast seam so collaborators can recover the concrete type after a
    /// [`find_component`](crate::container::Container::find_component) lookup.
    fn as_any(&self) -> &dyn Any;
}

/// Lock-free state holder for components that have no richer state machine.
#[derive(Debug)]
pub struct StateCell(AtomicU8);

impl StateCell {
    pub fn new() -> Self {
        Self(AtomicU8::new(ComponentState::Initial as u8))
    }

    pub fn get(&self) -> ComponentState {
        ComponentState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, state: ComponentState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}
