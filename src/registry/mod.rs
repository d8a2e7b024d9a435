// src/registry/mod.rs
mod descriptor;

pub use descriptor::{derived_override_key, CatalogError, ServiceCatalog, ServiceDescriptor};
