// src/registry/descriptor.rs
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Static metadata describing one deployable service. Loaded once at startup
/// and immutable afterwards; the catalog hands out `Arc`s.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    /// Unique stable identifier, e.g. `"hirag-v2"`.
    pub slug: String,
    /// Human-readable display name.
    pub name: String,
    /// Category/tier tag used for sweep filtering, e.g. `"gateway"`.
    #[serde(default)]
    pub tier: Option<String>,
    /// Conventional hostname. Defaults to the slug when absent.
    #[serde(default)]
    pub host: Option<String>,
    pub default_port: u16,
    /// Name of an explicit override configuration key, checked before the
    /// derived `<SLUG>_URL` variant.
    #[serde(default)]
    pub override_key: Option<String>,
    /// Relative health-check path. A descriptor without one is never probed
    /// over the network and reports `unknown`.
    #[serde(default)]
    pub health_path: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl ServiceDescriptor {
    /// Hostname used by the deterministic fallback URL.
    pub fn fallback_host(&self) -> &str {
        self.host.as_deref().unwrap_or(&self.slug)
    }

    /// Override key derived from the slug: `hirag-v2` -> `HIRAG_V2_URL`.
    pub fn derived_override_key(&self) -> String {
        derived_override_key(&self.slug)
    }
}

pub fn derived_override_key(slug: &str) -> String {
    let upper: String = slug
        .chars()
        .map(|c| if c.is_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect();
    format!("{}_URL", upper)
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Duplicate service slug: {0}")]
    DuplicateSlug(String),

    #[error("Empty service slug in descriptor '{0}'")]
    EmptySlug(String),
}

/// Compiled list of known services, indexed by slug.
pub struct ServiceCatalog {
    services: Vec<Arc<ServiceDescriptor>>,
    by_slug: HashMap<String, Arc<ServiceDescriptor>>,
}

impl ServiceCatalog {
    pub fn new(descriptors: Vec<ServiceDescriptor>) -> Result<Self, CatalogError> {
        let mut services = Vec::with_capacity(descriptors.len());
        let mut by_slug = HashMap::with_capacity(descriptors.len());

        for descriptor in descriptors {
            if descriptor.slug.is_empty() {
                return Err(CatalogError::EmptySlug(descriptor.name));
            }

            let descriptor = Arc::new(descriptor);
            if by_slug
                .insert(descriptor.slug.clone(), descriptor.clone())
                .is_some()
            {
                return Err(CatalogError::DuplicateSlug(descriptor.slug.clone()));
            }
            services.push(descriptor);
        }

        Ok(Self { services, by_slug })
    }

    pub fn get(&self, slug: &str) -> Option<Arc<ServiceDescriptor>> {
        self.by_slug.get(slug).cloned()
    }

    pub fn all(&self) -> &[Arc<ServiceDescriptor>] {
        &self.services
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}
