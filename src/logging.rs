//! Logger component: containers declare their logging like any other
//! component, so dependents can order themselves after it.
//!
//! Starting the component installs a global `tracing` formatter subscriber
//! filtered by the configured level. Installation is best-effort: if a
//! subscriber already exists (another container's logger, or a test
//! harness), the existing one keeps working and this component still reports
//! `Running`. A global subscriber cannot be uninstalled, so `stop` only
//! records the state change.

use std::any::Any;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing_subscriber::EnvFilter;

use crate::component::{Component, ComponentState, StateCell};
use crate::container::{ComponentFactory, Container};

pub struct LoggerComponent {
    level: String,
    state: StateCell,
}

impl LoggerComponent {
    /// `level` is an `EnvFilter` directive, e.g. `"info"` or
    /// `"warn,cadre=debug"`.
    pub fn new(level: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            state: StateCell::new(),
        }
    }

    pub fn level(&self) -> &str {
        &self.level
    }
}

impl Component for LoggerComponent {
    fn start(&self) {
        if self.state.get() != ComponentState::Running {
            let filter =
                EnvFilter::try_new(&self.level).unwrap_or_else(|_| EnvFilter::new("info"));
            let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
            self.state.set(ComponentState::Running);
        }
    }

    fn stop(&self) {
        self.state.set(ComponentState::Stopped);
    }

    fn state(&self) -> ComponentState {
        self.state.get()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Factory for configuration-driven loggers (type `"logger"`).
///
/// Recognised keys: `Level` (filter directive, default `"info"`).
pub struct LoggerFactory;

impl ComponentFactory for LoggerFactory {
    fn component_type(&self) -> &'static str {
        "logger"
    }

    fn configure(
        &self,
        _container: &Container,
        config: &Map<String, Value>,
    ) -> Option<Arc<dyn Component>> {
        let level = config
            .get("Level")
            .and_then(Value::as_str)
            .unwrap_or("info");
        Some(Arc::new(LoggerComponent::new(level)))
    }
}
