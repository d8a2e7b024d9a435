// src/config/models.rs
use crate::registry::ServiceDescriptor;
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    pub services: Vec<ServiceDescriptor>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Poll cadence, measured cycle start to cycle start.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Per-probe deadline.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Upper bound on concurrent outbound probes within one sweep.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// How long a resolved base URL stays usable before re-resolution.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    /// When true, resolution with no override and no registry row is a hard
    /// error instead of the deterministic fallback.
    #[serde(default)]
    pub strict: bool,
    #[serde(default = "default_status_enabled")]
    pub status_enabled: bool,
    #[serde(default = "default_status_port")]
    pub status_port: u16,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Base URL of the dynamic registry. Absent disables the dynamic
    /// resolution source entirely.
    #[serde(default)]
    pub base_url: Option<Url>,
    #[serde(default = "default_registry_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_interval_secs() -> u64 {
    30
}

fn default_timeout_secs() -> u64 {
    5
}

fn default_batch_size() -> usize {
    8
}

fn default_cache_ttl_secs() -> u64 {
    300
}

fn default_status_enabled() -> bool {
    true
}

fn default_status_port() -> u16 {
    9090
}

fn default_registry_timeout_secs() -> u64 {
    3
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            timeout_secs: default_timeout_secs(),
            batch_size: default_batch_size(),
            cache_ttl_secs: default_cache_ttl_secs(),
            strict: false,
            status_enabled: default_status_enabled(),
            status_port: default_status_port(),
        }
    }
}

impl MonitorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

impl RegistryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.services.is_empty() {
            bail!("Configuration must declare at least one service");
        }
        if self.monitor.batch_size == 0 {
            bail!("monitor.batch_size must be at least 1");
        }
        if self.monitor.interval_secs == 0 {
            bail!("monitor.interval_secs must be at least 1");
        }

        let mut seen = HashSet::new();
        for service in &self.services {
            if !seen.insert(service.slug.as_str()) {
                bail!("Duplicate service slug: {}", service.slug);
            }
        }

        // Worst-case sweep duration is batch count x per-batch timeout; an
        // interval below that bound means perpetual catch-up.
        let batches =
            ((self.services.len() + self.monitor.batch_size - 1) / self.monitor.batch_size) as u64;
        if self.monitor.interval_secs < batches * self.monitor.timeout_secs {
            tracing::warn!(
                "Polling interval {}s is below worst-case sweep duration {}s; \
                 slow sweeps will delay the schedule",
                self.monitor.interval_secs,
                batches * self.monitor.timeout_secs
            );
        }

        Ok(())
    }
}
