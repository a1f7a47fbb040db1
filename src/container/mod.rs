//! Component container: named components with ordered start/stop.
//!
//! A container owns an insertion-ordered list of component holders wired
//! from configuration. Start walks the list head→tail, stop walks tail→head,
//! so dependents stop before their dependencies. Components are constructed
//! by registered factories; a component that names another component in its
//! configuration is resolved through [`Container::find_component`], which
//! loads on demand and detects cyclic references.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | `ConfigSource` loader, env substitution, JSON parsing |
//! | [`factory`] | `ComponentFactory` and dynamic-resolution seams |
//! | [`runtime`] | Process-level registries (factories, containers, loader) |

pub mod config;
pub mod factory;
pub mod runtime;

pub use config::{
    parse_config, substitute_env, ConfigError, ConfigSource, DirConfigSource, MemConfigSource,
};
pub use factory::{ComponentFactory, FactoryResolver};
pub use runtime::Runtime;

use std::cell::RefCell;
use std::sync::{Arc, RwLockReadGuard, RwLockWriteGuard};

use serde_json::Value;
use tracing::{debug, error, warn};

use crate::component::{Component, ComponentState};

use self::runtime::RuntimeRef;

thread_local! {
    /// Names currently being loaded on this thread, outermost first. A name
    /// reappearing on the stack is a cyclic component reference.
    static LOADS_IN_PROGRESS: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
}

struct Holder {
    name: String,
    component: Arc<dyn Component>,
    factory: Arc<dyn ComponentFactory>,
}

/// Snapshot row from [`Container::list_components`].
#[derive(Clone, Debug)]
pub struct ComponentInfo {
    pub name: String,
    pub component_type: &'static str,
    pub state: ComponentState,
}

/// An ordered, named collection of components sharing start/stop sequencing.
///
/// Obtained from [`Runtime::create_container`]; names are unique per
/// runtime. Dropping the last `Arc` releases the holders in insertion order.
pub struct Container {
    name: String,
    runtime: RuntimeRef,
    holders: std::sync::RwLock<Vec<Holder>>,
}

impl Container {
    pub(crate) fn new(name: String, runtime: RuntimeRef) -> Self {
        Self {
            name,
            runtime,
            holders: std::sync::RwLock::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn read_holders(&self) -> RwLockReadGuard<'_, Vec<Holder>> {
        self.holders.read().expect("container lock poisoned")
    }

    fn write_holders(&self) -> RwLockWriteGuard<'_, Vec<Holder>> {
        self.holders.write().expect("container lock poisoned")
    }

    fn runtime(&self) -> Arc<Runtime> {
        self.runtime
            .upgrade()
            .expect("runtime released while container in use")
    }

    /// Loads this container's configuration and creates every declared
    /// component, in declaration order.
    ///
    /// Per-component failures (unknown type, missing or malformed
    /// configuration, factory refusal) are logged and skipped; only a
    /// missing or malformed container document is an error.
    pub fn init(&self) -> Result<(), ConfigError> {
        let rt = self.runtime();
        let text = rt
            .loader()
            .load(&self.name)
            .ok_or_else(|| ConfigError::Missing(self.name.clone()))?;
        let map = parse_config(&text)?;
        for (cname, ctype) in &map {
            match ctype.as_str() {
                Some(ctype) => {
                    self.load_component(&rt, cname, ctype);
                }
                None => warn!(
                    "container '{}': type of component '{}' is not a string",
                    self.name, cname
                ),
            }
        }
        Ok(())
    }

    /// One load pass for a declared component: registered factory first,
    /// dynamic resolution as the fallback.
    fn load_component(&self, rt: &Arc<Runtime>, cname: &str, ctype: &str) -> bool {
        if self.lookup(cname).is_some() {
            return true;
        }
        let config_text = rt.loader().load(cname);
        let factory = rt
            .find_factory(ctype)
            .or_else(|| self.resolve_factory(rt, config_text.as_deref()));
        let Some(factory) = factory else {
            warn!(
                "container '{}': no factory for component type '{}'",
                self.name, ctype
            );
            return false;
        };
        let Some(text) = config_text else {
            warn!(
                "container '{}': no configuration for component '{}'",
                self.name, cname
            );
            return false;
        };
        self.create_component(cname, factory, &text)
    }

    /// Attempts dynamic factory resolution from a component configuration's
    /// `"Library"` / `"Factory"` keys. Requires a resolver on the runtime.
    fn resolve_factory(
        &self,
        rt: &Arc<Runtime>,
        config_text: Option<&str>,
    ) -> Option<Arc<dyn ComponentFactory>> {
        let resolver = rt.resolver()?;
        let map = parse_config(config_text?).ok()?;
        let library = map.get("Library").and_then(Value::as_str)?;
        let symbol = map.get("Factory").and_then(Value::as_str)?;
        match resolver.resolve(library, symbol) {
            Some(factory) => {
                rt.register_factory(Arc::clone(&factory));
                Some(factory)
            }
            None => {
                error!(
                    "container '{}': could not load factory '{}' from library '{}'",
                    self.name, symbol, library
                );
                None
            }
        }
    }

    /// Parses the component configuration, invokes the factory, and appends
    /// the holder. Construction runs without the holder lock so factories
    /// can resolve dependencies through [`find_component`][Self::find_component].
    fn create_component(
        &self,
        cname: &str,
        factory: Arc<dyn ComponentFactory>,
        config_text: &str,
    ) -> bool {
        let map = match parse_config(config_text) {
            Ok(map) => map,
            Err(e) => {
                warn!(
                    "container '{}': bad configuration for component '{}': {}",
                    self.name, cname, e
                );
                return false;
            }
        };
        let Some(component) = factory.configure(self, &map) else {
            warn!(
                "container '{}': failed to create component '{}'",
                self.name, cname
            );
            return false;
        };
        let mut holders = self.write_holders();
        if holders.iter().any(|h| h.name == cname) {
            // Lost a race with a concurrent load of the same name; first wins.
            return true;
        }
        debug!("container '{}': created component '{}'", self.name, cname);
        holders.push(Holder {
            name: cname.to_string(),
            component,
            factory,
        });
        true
    }

    fn lookup(&self, name: &str) -> Option<Arc<dyn Component>> {
        self.read_holders()
            .iter()
            .find(|h| h.name == name)
            .map(|h| Arc::clone(&h.component))
    }

    /// Finds a component by name, loading it (and, recursively, anything it
    /// depends on) from configuration when absent. Returns `None` if the
    /// component is not declared, fails to load, or participates in a cyclic
    /// reference.
    pub fn find_component(&self, name: &str) -> Option<Arc<dyn Component>> {
        if let Some(component) = self.lookup(name) {
            return Some(component);
        }
        let rt = self.runtime.upgrade()?;
        self.chained_load(&rt, name);
        self.lookup(name)
    }

    fn chained_load(&self, rt: &Arc<Runtime>, cname: &str) {
        let cycle = LOADS_IN_PROGRESS.with(|stack| {
            let mut stack = stack.borrow_mut();
            if stack.iter().any(|n| n == cname) {
                true
            } else {
                stack.push(cname.to_string());
                false
            }
        });
        if cycle {
            error!(
                "container '{}': cyclic component reference for component '{}'",
                self.name, cname
            );
            return;
        }

        if let Some(text) = rt.loader().load(&self.name) {
            match parse_config(&text) {
                Ok(map) => match map.get(cname).and_then(Value::as_str) {
                    Some(ctype) => {
                        self.load_component(rt, cname, ctype);
                    }
                    None => warn!(
                        "container '{}': component '{}' is not declared",
                        self.name, cname
                    ),
                },
                Err(e) => warn!("container '{}': bad configuration: {}", self.name, e),
            }
        }

        LOADS_IN_PROGRESS.with(|stack| {
            stack.borrow_mut().pop();
        });
    }

    /// Starts components in declaration order (dependencies first).
    pub fn start(&self) {
        for (name, component) in self.holder_snapshot() {
            debug!("container '{}': starting '{}'", self.name, name);
            component.start();
        }
    }

    /// Stops components in reverse declaration order (dependents first).
    pub fn stop(&self) {
        for (name, component) in self.holder_snapshot().into_iter().rev() {
            debug!("container '{}': stopping '{}'", self.name, name);
            component.stop();
        }
    }

    // Lifecycle calls run on a snapshot: std's RwLock is not re-entrant, and
    // a component's start may legitimately call find_component.
    fn holder_snapshot(&self) -> Vec<(String, Arc<dyn Component>)> {
        self.read_holders()
            .iter()
            .map(|h| (h.name.clone(), Arc::clone(&h.component)))
            .collect()
    }

    /// Unlinks a component, stopping it first if it is not already stopped.
    /// Returns false if no component had this name.
    pub fn delete_component(&self, name: &str) -> bool {
        let holder = {
            let mut holders = self.write_holders();
            match holders.iter().position(|h| h.name == name) {
                Some(idx) => holders.remove(idx),
                None => return false,
            }
        };
        if holder.component.state() != ComponentState::Stopped {
            holder.component.stop();
        }
        debug!("container '{}': deleted component '{}'", self.name, name);
        true
    }

    /// Creates a component from caller-supplied configuration text, resolving
    /// the factory dynamically if it is not registered.
    pub fn add_component(&self, component_type: &str, name: &str, config_json: &str) -> bool {
        let rt = self.runtime();
        let factory = rt
            .find_factory(component_type)
            .or_else(|| self.resolve_factory(&rt, Some(config_json)));
        match factory {
            Some(factory) => self.create_component(name, factory, config_json),
            None => {
                error!(
                    "container '{}': could not find or load factory '{}'",
                    self.name, component_type
                );
                false
            }
        }
    }

    /// Name, type, and state of every held component, in insertion order.
    pub fn list_components(&self) -> Vec<ComponentInfo> {
        self.read_holders()
            .iter()
            .map(|h| ComponentInfo {
                name: h.name.clone(),
                component_type: h.factory.component_type(),
                state: h.component.state(),
            })
            .collect()
    }
}

impl Drop for Container {
    fn drop(&mut self) {
        debug!("container '{}' released", self.name);
        let mut holders = match self.holders.write() {
            Ok(guard) => guard,
            Err(poison) => poison.into_inner(),
        };
        // Holders release in insertion order.
        for holder in holders.drain(..) {
            drop(holder);
        }
    }
}
