// src/resolve/registry_client.rs
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Known health-check suffixes, in priority order. Stripping stops at the
/// first match so the cached value is a clean, reusable base URL.
pub const HEALTH_SUFFIXES: [&str; 4] = ["/healthz", "/health", "/metrics", "/ping"];

/// Strips one known health-check suffix from a URL, first match wins.
pub fn strip_health_suffix(url: &str) -> &str {
    for suffix in HEALTH_SUFFIXES {
        if let Some(base) = url.strip_suffix(suffix) {
            return base;
        }
    }
    url
}

/// One row from the dynamic registry.
#[derive(Debug, Clone, Deserialize)]
pub struct RegistryRecord {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub health_check_url: Option<String>,
    #[serde(default)]
    pub default_port: Option<u16>,
    #[serde(default)]
    pub override_variable_name: Option<String>,
    #[serde(default)]
    pub tier: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Read-only query surface over the dynamic registry. Zero rows and transport
/// errors are both "source unavailable"; neither is ever fatal.
#[async_trait]
pub trait DynamicRegistry: Send + Sync {
    async fn lookup_active(&self, slug: &str) -> Option<RegistryRecord>;
}

pub struct HttpRegistryClient {
    base_url: Url,
    client: Client,
}

impl HttpRegistryClient {
    pub fn new(base_url: Url, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create registry HTTP client");

        Self { base_url, client }
    }
}

#[async_trait]
impl DynamicRegistry for HttpRegistryClient {
    async fn lookup_active(&self, slug: &str) -> Option<RegistryRecord> {
        let mut url = match self.base_url.join("services") {
            Ok(url) => url,
            Err(e) => {
                warn!("Registry base URL cannot address /services: {}", e);
                return None;
            }
        };
        url.query_pairs_mut()
            .append_pair("slug", slug)
            .append_pair("active", "true");

        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                debug!("Registry lookup for '{}' failed: {}", slug, e);
                return None;
            }
        };

        if !response.status().is_success() {
            debug!(
                "Registry lookup for '{}' returned HTTP {}",
                slug,
                response.status()
            );
            return None;
        }

        let mut rows: Vec<RegistryRecord> = match response.json().await {
            Ok(rows) => rows,
            Err(e) => {
                warn!("Registry response for '{}' is not valid JSON: {}", slug, e);
                return None;
            }
        };

        if rows.len() > 1 {
            // Duplicate active rows are a registry hygiene problem; take the
            // first deterministically rather than failing the resolution.
            warn!(
                "Registry returned {} active rows for '{}', using the first",
                rows.len(),
                slug
            );
        }

        if rows.is_empty() {
            None
        } else {
            Some(rows.remove(0))
        }
    }
}
