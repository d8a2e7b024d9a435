// src/resolve/cache.rs
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;

/// Which resolution source produced an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionSource {
    Override,
    Dynamic,
    Fallback,
}

/// One cached resolution. Entries are replaced wholesale, never mutated in
/// place, so concurrent readers only ever see a complete entry.
#[derive(Debug, Clone)]
pub struct ResolvedEndpoint {
    pub slug: String,
    pub base_url: Url,
    pub source: ResolutionSource,
    pub resolved_at: Instant,
    ttl: Duration,
}

impl ResolvedEndpoint {
    pub fn new(slug: impl Into<String>, base_url: Url, source: ResolutionSource, ttl: Duration) -> Self {
        Self {
            slug: slug.into(),
            base_url,
            source,
            resolved_at: Instant::now(),
            ttl,
        }
    }

    pub fn is_fresh(&self) -> bool {
        self.resolved_at.elapsed() < self.ttl
    }
}

/// TTL-tagged map of resolved base URLs, keyed by identifier only. The path
/// suffix a caller asks for is appended at call time, so one entry serves many
/// paths. Injectable so tests and embedders get isolated instances.
#[derive(Default)]
pub struct EndpointCache {
    entries: DashMap<String, Arc<ResolvedEndpoint>>,
}

impl EndpointCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached entry only while fresh; a stale entry is evicted and
    /// treated as absent.
    pub fn get(&self, slug: &str) -> Option<Arc<ResolvedEndpoint>> {
        let entry = self.entries.get(slug)?.clone();
        if entry.is_fresh() {
            Some(entry)
        } else {
            self.entries.remove(slug);
            None
        }
    }

    pub fn insert(&self, endpoint: ResolvedEndpoint) {
        self.entries
            .insert(endpoint.slug.clone(), Arc::new(endpoint));
    }

    /// Evicts one entry, or everything when no identifier is given.
    pub fn clear(&self, slug: Option<&str>) {
        match slug {
            Some(slug) => {
                self.entries.remove(slug);
            }
            None => self.entries.clear(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
