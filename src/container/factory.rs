//! Component factories and the dynamic-factory resolution seam.

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::component::Component;

use super::Container;

/// Describes how to construct components of one type.
///
/// Destruction is `Drop` on the component; there is no separate free hook.
pub trait ComponentFactory: Send + Sync {
    /// Unique factory key, matched against the container configuration's
    /// type values.
    fn component_type(&self) -> &'static str;

    /// Builds a component from its parsed configuration. `None` means the
    /// configuration was unusable; the container logs and continues.
    ///
    /// The factory may call [`Container::find_component`] to resolve
    /// dependencies; chained loads are cycle-checked.
    fn configure(
        &self,
        container: &Container,
        config: &Map<String, Value>,
    ) -> Option<Arc<dyn Component>>;
}

/// Resolves a factory from a library path and symbol name.
///
/// Dynamic loading itself is out of scope for this crate; hosts that want
/// `"Library"`/`"Factory"` configuration keys to work install an
/// implementation on the [`Runtime`](super::Runtime). A component
/// configuration names the library and a symbol resolving to a factory
/// constructor; the resolver returns the constructed factory or `None` on
/// any load failure.
pub trait FactoryResolver: Send + Sync {
    fn resolve(&self, library: &str, symbol: &str) -> Option<Arc<dyn ComponentFactory>>;
}
