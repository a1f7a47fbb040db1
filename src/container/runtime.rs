//! The process-level runtime: factory registry, container registry, loader.
//!
//! Everything the original kept in free-standing globals lives here as one
//! explicit object, created at startup and shared by `Arc`. This keeps tests
//! hermetic: each test builds its own runtime and nothing leaks between them.

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tracing::debug;

use super::config::ConfigSource;
use super::factory::{ComponentFactory, FactoryResolver};
use super::Container;

pub struct Runtime {
    loader: Arc<dyn ConfigSource>,
    resolver: Option<Arc<dyn FactoryResolver>>,
    /// Registered factories, first registration of a type wins.
    factories: Mutex<Vec<Arc<dyn ComponentFactory>>>,
    /// Containers alive in this runtime, insertion-ordered, unique names.
    containers: Mutex<Vec<Arc<Container>>>,
}

impl Runtime {
    pub fn new(loader: Arc<dyn ConfigSource>) -> Arc<Self> {
        Arc::new(Self {
            loader,
            resolver: None,
            factories: Mutex::new(Vec::new()),
            containers: Mutex::new(Vec::new()),
        })
    }

    /// Runtime with a dynamic-factory resolver installed.
    pub fn with_resolver(
        loader: Arc<dyn ConfigSource>,
        resolver: Arc<dyn FactoryResolver>,
    ) -> Arc<Self> {
        Arc::new(Self {
            loader,
            resolver: Some(resolver),
            factories: Mutex::new(Vec::new()),
            containers: Mutex::new(Vec::new()),
        })
    }

    pub(super) fn loader(&self) -> &dyn ConfigSource {
        self.loader.as_ref()
    }

    pub(super) fn resolver(&self) -> Option<&Arc<dyn FactoryResolver>> {
        self.resolver.as_ref()
    }

    fn factories_locked(&self) -> MutexGuard<'_, Vec<Arc<dyn ComponentFactory>>> {
        self.factories.lock().expect("factory registry poisoned")
    }

    fn containers_locked(&self) -> MutexGuard<'_, Vec<Arc<Container>>> {
        self.containers.lock().expect("container registry poisoned")
    }

    /// Registers a factory. A second registration of the same type is
    /// silently ignored; the first wins.
    pub fn register_factory(&self, factory: Arc<dyn ComponentFactory>) {
        let mut factories = self.factories_locked();
        if factories
            .iter()
            .any(|f| f.component_type() == factory.component_type())
        {
            debug!(
                "factory '{}' already registered, keeping first",
                factory.component_type()
            );
            return;
        }
        factories.push(factory);
    }

    /// Looks up a factory by type key.
    pub fn find_factory(&self, component_type: &str) -> Option<Arc<dyn ComponentFactory>> {
        self.factories_locked()
            .iter()
            .find(|f| f.component_type() == component_type)
            .cloned()
    }

    /// Allocates a named container, or `None` if the name is taken.
    pub fn create_container(self: &Arc<Self>, name: &str) -> Option<Arc<Container>> {
        let mut containers = self.containers_locked();
        if containers.iter().any(|c| c.name() == name) {
            return None;
        }
        let container = Arc::new(Container::new(name.to_string(), Arc::downgrade(self)));
        containers.push(Arc::clone(&container));
        Some(container)
    }

    /// Finds a container by name.
    pub fn find_container(&self, name: &str) -> Option<Arc<Container>> {
        self.containers_locked()
            .iter()
            .find(|c| c.name() == name)
            .cloned()
    }

    /// Unlinks a container from the runtime. The container (and its
    /// components, in insertion order) is destroyed once the last external
    /// `Arc` is released. Returns false if no container had this name.
    pub fn remove_container(&self, name: &str) -> bool {
        let mut containers = self.containers_locked();
        match containers.iter().position(|c| c.name() == name) {
            Some(idx) => {
                containers.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Names of containers alive in this runtime, in creation order.
    pub fn container_names(&self) -> Vec<String> {
        self.containers_locked()
            .iter()
            .map(|c| c.name().to_string())
            .collect()
    }
}

/// Weak runtime handle held by containers; upgraded on demand so a container
/// never keeps its runtime alive.
pub(crate) type RuntimeRef = Weak<Runtime>;
