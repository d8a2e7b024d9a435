// src/resolve/mod.rs
mod cache;
mod config_source;
mod registry_client;
mod resolver;
mod source;

pub use cache::{EndpointCache, ResolutionSource, ResolvedEndpoint};
pub use config_source::{ConfigSource, EnvConfigSource, MapConfigSource};
pub use registry_client::{
    strip_health_suffix, DynamicRegistry, HttpRegistryClient, RegistryRecord, HEALTH_SUFFIXES,
};
pub use resolver::{join_path, ResolveError, ResolveOptions, Resolver};
pub use source::{DynamicSource, FallbackSource, OverrideSource, ResolutionStrategy};
