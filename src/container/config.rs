//! Configuration loading: named JSON documents with environment substitution.
//!
//! A [`ConfigSource`] resolves a name to JSON text; the container asks it for
//! its own document (the `component name → component type` map) and for one
//! document per component. Before parsing, `${NAME}` tokens are replaced with
//! the corresponding environment variable; unset variables substitute to
//! empty, matching deployments that template credentials and paths into
//! otherwise static files.

use std::path::PathBuf;
use std::sync::OnceLock;

use ahash::AHashMap;
use regex::Regex;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

/// Errors surfaced by container initialisation.
///
/// Per-component failures are logged and skipped; only a missing or
/// malformed *container* document aborts `init`.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The source has no document under this name.
    #[error("configuration for '{0}' not found")]
    Missing(String),

    /// The document is not valid JSON, or not a JSON object.
    #[error("invalid configuration JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Resolves configuration names to JSON text.
///
/// The returned string is owned by the caller. `None` means the source has
/// no such document; I/O failures are treated the same way.
pub trait ConfigSource: Send + Sync {
    fn load(&self, name: &str) -> Option<String>;
}

/// Directory-backed source: `name` resolves to `<dir>/<name>.json`.
pub struct DirConfigSource {
    dir: PathBuf,
}

impl DirConfigSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl ConfigSource for DirConfigSource {
    fn load(&self, name: &str) -> Option<String> {
        let path = self.dir.join(format!("{name}.json"));
        match std::fs::read_to_string(&path) {
            Ok(text) => Some(text),
            Err(e) => {
                debug!("no configuration at {}: {}", path.display(), e);
                None
            }
        }
    }
}

/// In-memory source, mainly for tests and embedded defaults.
pub struct MemConfigSource {
    docs: AHashMap<String, String>,
}

impl MemConfigSource {
    pub fn new() -> Self {
        Self {
            docs: AHashMap::new(),
        }
    }

    pub fn with(mut self, name: impl Into<String>, json: impl Into<String>) -> Self {
        self.docs.insert(name.into(), json.into());
        self
    }
}

impl Default for MemConfigSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigSource for MemConfigSource {
    fn load(&self, name: &str) -> Option<String> {
        self.docs.get(name).cloned()
    }
}

/// Replaces every `${NAME}` token with the value of the environment variable
/// `NAME`, or the empty string when unset.
pub fn substitute_env(input: &str) -> String {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    let token = TOKEN
        .get_or_init(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid env token"));
    token
        .replace_all(input, |caps: &regex::Captures<'_>| {
            std::env::var(&caps[1]).unwrap_or_default()
        })
        .into_owned()
}

/// Substitutes environment variables, then parses the text as a JSON object.
///
/// Key order is preserved: the container document's declaration order is its
/// start order.
pub fn parse_config(text: &str) -> Result<Map<String, Value>, ConfigError> {
    let substituted = substitute_env(text);
    Ok(serde_json::from_str(&substituted)?)
}
