// src/resolve/config_source.rs
use std::collections::HashMap;

/// Key/value lookup for explicit override configuration. One implementation
/// per execution environment, selected once at startup rather than branched
/// per call.
pub trait ConfigSource: Send + Sync {
    /// Returns the value for `key`, treating empty values as absent.
    fn get(&self, key: &str) -> Option<String>;
}

/// Reads overrides from the process environment.
pub struct EnvConfigSource;

impl ConfigSource for EnvConfigSource {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|v| !v.is_empty())
    }
}

/// In-memory source for tests and embedders.
#[derive(Default)]
pub struct MapConfigSource {
    values: HashMap<String, String>,
}

impl MapConfigSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }
}

impl From<HashMap<String, String>> for MapConfigSource {
    fn from(values: HashMap<String, String>) -> Self {
        Self { values }
    }
}

impl ConfigSource for MapConfigSource {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).filter(|v| !v.is_empty()).cloned()
    }
}
