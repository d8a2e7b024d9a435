// src/resolve/source.rs
use crate::registry::{derived_override_key, ServiceDescriptor};
use crate::resolve::config_source::ConfigSource;
use crate::resolve::registry_client::{strip_health_suffix, DynamicRegistry};
use crate::resolve::resolver::ResolveOptions;
use crate::resolve::ResolutionSource;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

/// One link in the override -> dynamic -> fallback chain. The chain is an
/// explicit ordered list so the fallback order stays first-class and each
/// source is testable on its own.
#[async_trait]
pub trait ResolutionStrategy: Send + Sync {
    async fn try_resolve(
        &self,
        id: &str,
        descriptor: Option<&ServiceDescriptor>,
        opts: &ResolveOptions,
    ) -> Option<(Url, ResolutionSource)>;

    fn name(&self) -> &'static str;
}

/// Explicit override configuration, checked first. Key variants in order:
/// the key from the call options, the descriptor's declared key, then the
/// name derived from the identifier.
pub struct OverrideSource {
    config: Arc<dyn ConfigSource>,
}

impl OverrideSource {
    pub fn new(config: Arc<dyn ConfigSource>) -> Self {
        Self { config }
    }

    fn candidate_keys(
        id: &str,
        descriptor: Option<&ServiceDescriptor>,
        opts: &ResolveOptions,
    ) -> Vec<String> {
        let mut keys = Vec::with_capacity(3);
        if let Some(key) = &opts.override_key {
            keys.push(key.clone());
        }
        if let Some(key) = descriptor.and_then(|d| d.override_key.clone()) {
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        let derived = derived_override_key(id);
        if !keys.contains(&derived) {
            keys.push(derived);
        }
        keys
    }
}

#[async_trait]
impl ResolutionStrategy for OverrideSource {
    async fn try_resolve(
        &self,
        id: &str,
        descriptor: Option<&ServiceDescriptor>,
        opts: &ResolveOptions,
    ) -> Option<(Url, ResolutionSource)> {
        for key in Self::candidate_keys(id, descriptor, opts) {
            let Some(value) = self.config.get(&key) else {
                continue;
            };
            match Url::parse(&value) {
                Ok(url) => {
                    debug!("Resolved '{}' from override {}", id, key);
                    return Some((url, ResolutionSource::Override));
                }
                Err(e) => {
                    // A malformed override is treated as absent, not fatal.
                    warn!("Override {} for '{}' is not a valid URL: {}", key, id, e);
                }
            }
        }
        None
    }

    fn name(&self) -> &'static str {
        "override"
    }
}

/// Dynamic registry lookup. Unavailability of the registry, for any reason,
/// silently falls through to the next source.
pub struct DynamicSource {
    registry: Arc<dyn DynamicRegistry>,
}

impl DynamicSource {
    pub fn new(registry: Arc<dyn DynamicRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl ResolutionStrategy for DynamicSource {
    async fn try_resolve(
        &self,
        id: &str,
        _descriptor: Option<&ServiceDescriptor>,
        _opts: &ResolveOptions,
    ) -> Option<(Url, ResolutionSource)> {
        let record = self.registry.lookup_active(id).await?;
        let health_url = record.health_check_url?;

        // The registry stores a probe URL; denormalize it back to the base so
        // the cached value serves any path.
        let base = strip_health_suffix(&health_url);
        match Url::parse(base) {
            Ok(url) => {
                debug!("Resolved '{}' from dynamic registry: {}", id, url);
                Some((url, ResolutionSource::Dynamic))
            }
            Err(e) => {
                warn!(
                    "Registry health_check_url for '{}' is not a valid URL ({}): {}",
                    id, health_url, e
                );
                None
            }
        }
    }

    fn name(&self) -> &'static str {
        "dynamic"
    }
}

/// Deterministic `http://<identifier>:<port>` fallback. Disallowed in strict
/// mode, where exhausting the chain is a configuration error instead.
pub struct FallbackSource;

#[async_trait]
impl ResolutionStrategy for FallbackSource {
    async fn try_resolve(
        &self,
        id: &str,
        descriptor: Option<&ServiceDescriptor>,
        opts: &ResolveOptions,
    ) -> Option<(Url, ResolutionSource)> {
        if opts.strict {
            return None;
        }

        let host = descriptor.map(|d| d.fallback_host().to_string());
        let host = host.as_deref().unwrap_or(id);
        let port = descriptor
            .map(|d| d.default_port)
            .or(opts.default_port)
            .unwrap_or(80);

        match Url::parse(&format!("http://{}:{}", host, port)) {
            Ok(url) => Some((url, ResolutionSource::Fallback)),
            Err(e) => {
                warn!("Cannot build fallback URL for '{}': {}", id, e);
                None
            }
        }
    }

    fn name(&self) -> &'static str {
        "fallback"
    }
}
