// src/resolve/resolver.rs
use crate::registry::{derived_override_key, ServiceCatalog};
use crate::resolve::cache::{EndpointCache, ResolvedEndpoint};
use crate::resolve::config_source::ConfigSource;
use crate::resolve::registry_client::DynamicRegistry;
use crate::resolve::source::{DynamicSource, FallbackSource, OverrideSource, ResolutionStrategy};
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// Per-call resolution options. The path suffix is appended at call time and
/// is not part of the cache key.
#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
    /// Override key to consult before the descriptor's declared key.
    pub override_key: Option<String>,
    /// Path suffix appended to the resolved base URL.
    pub path: Option<String>,
    /// TTL for the cache entry written by this resolution.
    pub ttl: Option<Duration>,
    /// Port for ad hoc identifiers with no descriptor.
    pub default_port: Option<u16>,
    /// Disallow the deterministic fallback; exhausting the chain becomes a
    /// configuration error.
    pub strict: bool,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ResolveError {
    #[error("No resolvable URL for '{slug}' in strict mode; set the {key} override")]
    MissingOverride { slug: String, key: String },
}

/// Multi-source URL resolver. Walks an ordered strategy chain (override,
/// dynamic registry, deterministic fallback) and caches the winning base URL
/// per identifier.
pub struct Resolver {
    catalog: Arc<ServiceCatalog>,
    cache: Arc<EndpointCache>,
    sources: Vec<Arc<dyn ResolutionStrategy>>,
    default_ttl: Duration,
    strict: bool,
}

impl Resolver {
    pub fn new(
        catalog: Arc<ServiceCatalog>,
        cache: Arc<EndpointCache>,
        config: Arc<dyn ConfigSource>,
        registry: Option<Arc<dyn DynamicRegistry>>,
    ) -> Self {
        let mut sources: Vec<Arc<dyn ResolutionStrategy>> =
            vec![Arc::new(OverrideSource::new(config))];
        if let Some(registry) = registry {
            sources.push(Arc::new(DynamicSource::new(registry)));
        }
        sources.push(Arc::new(FallbackSource));

        Self {
            catalog,
            cache,
            sources,
            default_ttl: DEFAULT_CACHE_TTL,
            strict: false,
        }
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Makes strict mode the default for every call; individual calls can
    /// still opt in via options but cannot opt out.
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Resolves an identifier to a usable URL, first source to answer wins.
    /// A fresh cache hit short-circuits the chain entirely.
    pub async fn resolve(&self, id: &str, opts: &ResolveOptions) -> Result<Url, ResolveError> {
        let opts = ResolveOptions {
            strict: self.strict || opts.strict,
            ..opts.clone()
        };

        if let Some(entry) = self.cache.get(id) {
            return Ok(apply_path(&entry.base_url, opts.path.as_deref()));
        }

        let descriptor = self.catalog.get(id);

        for source in &self.sources {
            let Some((base_url, tag)) = source
                .try_resolve(id, descriptor.as_deref(), &opts)
                .await
            else {
                continue;
            };

            let ttl = opts.ttl.unwrap_or(self.default_ttl);
            self.cache
                .insert(ResolvedEndpoint::new(id, base_url.clone(), tag, ttl));
            debug!(
                "Resolved '{}' via {} source: {}",
                id,
                source.name(),
                base_url
            );
            return Ok(apply_path(&base_url, opts.path.as_deref()));
        }

        let key = descriptor
            .as_deref()
            .and_then(|d| d.override_key.clone())
            .unwrap_or_else(|| derived_override_key(id));
        Err(ResolveError::MissingOverride {
            slug: id.to_string(),
            key,
        })
    }

    /// Resolves many identifiers concurrently. One identifier's failure never
    /// blocks the others; each gets its own result.
    pub async fn resolve_batch(
        &self,
        ids: &[String],
    ) -> HashMap<String, Result<Url, ResolveError>> {
        let opts = ResolveOptions::default();
        let resolutions = join_all(ids.iter().map(|id| async {
            let result = self.resolve(id, &opts).await;
            (id.clone(), result)
        }))
        .await;

        resolutions.into_iter().collect()
    }

    /// Evicts one cached entry, or all of them, forcing re-resolution on the
    /// next call. Used after configuration changes and for test isolation.
    pub fn clear_cache(&self, id: Option<&str>) {
        self.cache.clear(id);
    }
}

/// Appends a path suffix to a base URL, preserving any path the base already
/// carries. A suffix that cannot be joined is dropped rather than failing the
/// resolution.
pub fn join_path(base: &Url, suffix: &str) -> Url {
    let suffix = suffix.trim_start_matches('/');
    if suffix.is_empty() {
        return base.clone();
    }

    // Url::join resolves relative to the last segment, so a base of
    // `/api` would lose `api`. A trailing slash keeps the base path intact.
    let mut joined = base.clone();
    if !joined.path().ends_with('/') {
        joined.set_path(&format!("{}/", joined.path()));
    }

    match joined.join(suffix) {
        Ok(url) => url,
        Err(e) => {
            warn!("Cannot append path '{}' to {}: {}", suffix, base, e);
            base.clone()
        }
    }
}

fn apply_path(base: &Url, path: Option<&str>) -> Url {
    match path {
        None | Some("") => base.clone(),
        Some(path) => join_path(base, path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ServiceDescriptor;
    use crate::resolve::config_source::MapConfigSource;
    use crate::resolve::registry_client::RegistryRecord;
    use crate::resolve::ResolutionSource;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn descriptor(slug: &str, port: u16) -> ServiceDescriptor {
        ServiceDescriptor {
            slug: slug.to_string(),
            name: slug.to_string(),
            tier: None,
            host: None,
            default_port: port,
            override_key: None,
            health_path: Some("/health".to_string()),
            metadata: Default::default(),
        }
    }

    fn catalog(descriptors: Vec<ServiceDescriptor>) -> Arc<ServiceCatalog> {
        Arc::new(ServiceCatalog::new(descriptors).unwrap())
    }

    /// Registry stub that counts lookups and serves a fixed record.
    struct CountingRegistry {
        record: Option<RegistryRecord>,
        lookups: AtomicUsize,
    }

    impl CountingRegistry {
        fn new(record: Option<RegistryRecord>) -> Self {
            Self {
                record,
                lookups: AtomicUsize::new(0),
            }
        }

        fn lookup_count(&self) -> usize {
            self.lookups.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl DynamicRegistry for CountingRegistry {
        async fn lookup_active(&self, _slug: &str) -> Option<RegistryRecord> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            self.record.clone()
        }
    }

    fn record_with_health_url(url: &str) -> RegistryRecord {
        RegistryRecord {
            name: "svc".to_string(),
            description: None,
            health_check_url: Some(url.to_string()),
            default_port: None,
            override_variable_name: None,
            tier: None,
            tags: vec![],
            metadata: Default::default(),
        }
    }

    #[tokio::test]
    async fn test_fallback_when_override_and_registry_absent() {
        let resolver = Resolver::new(
            catalog(vec![descriptor("hirag-v2", 8086)]),
            Arc::new(EndpointCache::new()),
            Arc::new(MapConfigSource::new()),
            Some(Arc::new(CountingRegistry::new(None))),
        );

        let url = resolver
            .resolve("hirag-v2", &ResolveOptions::default())
            .await
            .unwrap();
        assert_eq!(url.as_str(), "http://hirag-v2:8086/");
    }

    #[tokio::test]
    async fn test_override_wins_regardless_of_registry() {
        let registry = Arc::new(CountingRegistry::new(Some(record_with_health_url(
            "http://from-registry:1/health",
        ))));
        let resolver = Resolver::new(
            catalog(vec![descriptor("presign", 8088)]),
            Arc::new(EndpointCache::new()),
            Arc::new(MapConfigSource::new().with("PRESIGN_URL", "http://presign.internal:9999")),
            Some(registry.clone()),
        );

        let url = resolver
            .resolve("presign", &ResolveOptions::default())
            .await
            .unwrap();
        assert_eq!(url.as_str(), "http://presign.internal:9999/");
        assert_eq!(registry.lookup_count(), 0);
    }

    #[tokio::test]
    async fn test_registry_url_cached_with_suffix_stripped() {
        let registry = Arc::new(CountingRegistry::new(Some(record_with_health_url(
            "http://svc:1234/healthz",
        ))));
        let cache = Arc::new(EndpointCache::new());
        let resolver = Resolver::new(
            catalog(vec![descriptor("svc", 8080)]),
            cache.clone(),
            Arc::new(MapConfigSource::new()),
            Some(registry),
        );

        resolver
            .resolve("svc", &ResolveOptions::default())
            .await
            .unwrap();

        let entry = cache.get("svc").unwrap();
        assert_eq!(entry.base_url.as_str(), "http://svc:1234/");
        assert_eq!(entry.source, ResolutionSource::Dynamic);
    }

    #[tokio::test]
    async fn test_ttl_window_means_single_registry_lookup() {
        let registry = Arc::new(CountingRegistry::new(Some(record_with_health_url(
            "http://svc:1234/health",
        ))));
        let resolver = Resolver::new(
            catalog(vec![descriptor("svc", 8080)]),
            Arc::new(EndpointCache::new()),
            Arc::new(MapConfigSource::new()),
            Some(registry.clone()),
        );

        resolver.resolve("svc", &ResolveOptions::default()).await.unwrap();
        resolver.resolve("svc", &ResolveOptions::default()).await.unwrap();
        assert_eq!(registry.lookup_count(), 1);
    }

    #[tokio::test]
    async fn test_clear_cache_forces_fresh_resolution() {
        let registry = Arc::new(CountingRegistry::new(Some(record_with_health_url(
            "http://svc:1234/health",
        ))));
        let resolver = Resolver::new(
            catalog(vec![descriptor("svc", 8080)]),
            Arc::new(EndpointCache::new()),
            Arc::new(MapConfigSource::new()),
            Some(registry.clone()),
        );

        resolver.resolve("svc", &ResolveOptions::default()).await.unwrap();
        resolver.clear_cache(Some("svc"));
        resolver.resolve("svc", &ResolveOptions::default()).await.unwrap();
        assert_eq!(registry.lookup_count(), 2);
    }

    #[tokio::test]
    async fn test_path_suffix_not_part_of_cache_key() {
        let registry = Arc::new(CountingRegistry::new(Some(record_with_health_url(
            "http://svc:1234/health",
        ))));
        let resolver = Resolver::new(
            catalog(vec![descriptor("svc", 8080)]),
            Arc::new(EndpointCache::new()),
            Arc::new(MapConfigSource::new()),
            Some(registry.clone()),
        );

        let health = resolver
            .resolve(
                "svc",
                &ResolveOptions {
                    path: Some("/health".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let api = resolver
            .resolve(
                "svc",
                &ResolveOptions {
                    path: Some("/api/v1".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(health.as_str(), "http://svc:1234/health");
        assert_eq!(api.as_str(), "http://svc:1234/api/v1");
        // One cached base URL served both paths.
        assert_eq!(registry.lookup_count(), 1);
    }

    #[tokio::test]
    async fn test_path_suffix_appended_to_path_bearing_base() {
        let resolver = Resolver::new(
            catalog(vec![descriptor("svc", 8080)]),
            Arc::new(EndpointCache::new()),
            Arc::new(MapConfigSource::new().with("SVC_URL", "http://svc.internal:9999/api")),
            None,
        );

        let url = resolver
            .resolve(
                "svc",
                &ResolveOptions {
                    path: Some("/health".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        // The base path must survive; the suffix is appended, not resolved
        // against the last segment.
        assert_eq!(url.as_str(), "http://svc.internal:9999/api/health");
    }

    #[test]
    fn test_join_path_preserves_base_path() {
        let base = Url::parse("http://svc.internal:9999/api").unwrap();
        assert_eq!(
            join_path(&base, "/v1/health").as_str(),
            "http://svc.internal:9999/api/v1/health"
        );
        assert_eq!(join_path(&base, "").as_str(), "http://svc.internal:9999/api");

        let bare = Url::parse("http://svc:1234").unwrap();
        assert_eq!(join_path(&bare, "/health").as_str(), "http://svc:1234/health");
    }

    #[tokio::test]
    async fn test_strict_mode_raises_named_configuration_error() {
        let resolver = Resolver::new(
            catalog(vec![descriptor("svc", 8080)]),
            Arc::new(EndpointCache::new()),
            Arc::new(MapConfigSource::new()),
            Some(Arc::new(CountingRegistry::new(None))),
        )
        .with_strict(true);

        let err = resolver
            .resolve("svc", &ResolveOptions::default())
            .await
            .unwrap_err();
        let ResolveError::MissingOverride { slug, key } = err;
        assert_eq!(slug, "svc");
        assert_eq!(key, "SVC_URL");
    }

    #[tokio::test]
    async fn test_ad_hoc_identifier_resolves_without_descriptor() {
        let resolver = Resolver::new(
            catalog(vec![descriptor("svc", 8080)]),
            Arc::new(EndpointCache::new()),
            Arc::new(MapConfigSource::new()),
            None,
        );

        let url = resolver
            .resolve(
                "scratch",
                &ResolveOptions {
                    default_port: Some(7777),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(url.as_str(), "http://scratch:7777/");
    }

    #[tokio::test]
    async fn test_resolve_batch_isolates_failures() {
        // Strict resolver: "svc" has an override, "orphan" has nothing.
        let resolver = Resolver::new(
            catalog(vec![descriptor("svc", 8080), descriptor("orphan", 8081)]),
            Arc::new(EndpointCache::new()),
            Arc::new(MapConfigSource::new().with("SVC_URL", "http://svc.internal:8080")),
            Some(Arc::new(CountingRegistry::new(None))),
        )
        .with_strict(true);

        let results = resolver
            .resolve_batch(&["svc".to_string(), "orphan".to_string()])
            .await;

        assert_eq!(results.len(), 2);
        assert!(results["svc"].is_ok());
        assert!(results["orphan"].is_err());
    }

    #[tokio::test]
    async fn test_expired_ttl_triggers_re_resolution() {
        let registry = Arc::new(CountingRegistry::new(Some(record_with_health_url(
            "http://svc:1234/health",
        ))));
        let resolver = Resolver::new(
            catalog(vec![descriptor("svc", 8080)]),
            Arc::new(EndpointCache::new()),
            Arc::new(MapConfigSource::new()),
            Some(registry.clone()),
        )
        .with_default_ttl(Duration::ZERO);

        resolver.resolve("svc", &ResolveOptions::default()).await.unwrap();
        resolver.resolve("svc", &ResolveOptions::default()).await.unwrap();
        assert_eq!(registry.lookup_count(), 2);
    }
}
