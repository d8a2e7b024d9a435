// src/probe/prober.rs
use crate::registry::ServiceDescriptor;
use crate::resolve::{join_path, ResolveOptions, Resolver};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeStatus {
    Healthy,
    Unhealthy,
    /// No health-check contract declared; distinct from unhealthy.
    Unknown,
}

/// Outcome of one probe attempt. Every attempt yields exactly one of these;
/// probing never returns an error.
#[derive(Debug, Clone, Serialize)]
pub struct ProbeResult {
    pub slug: String,
    pub status: ProbeStatus,
    pub latency_ms: u64,
    pub checked_at: DateTime<Utc>,
    pub detail: Option<String>,
}

impl ProbeResult {
    fn new(slug: &str, status: ProbeStatus, latency_ms: u64, detail: Option<String>) -> Self {
        Self {
            slug: slug.to_string(),
            status,
            latency_ms,
            checked_at: Utc::now(),
            detail,
        }
    }

    pub fn healthy(slug: &str, latency_ms: u64) -> Self {
        Self::new(slug, ProbeStatus::Healthy, latency_ms, None)
    }

    pub fn unhealthy(slug: &str, latency_ms: u64, detail: impl Into<String>) -> Self {
        Self::new(slug, ProbeStatus::Unhealthy, latency_ms, Some(detail.into()))
    }

    pub fn unknown(slug: &str, detail: impl Into<String>) -> Self {
        Self::new(slug, ProbeStatus::Unknown, 0, Some(detail.into()))
    }
}

/// Seam between the aggregator/poller and the real network, so sweeps can be
/// exercised with fakes.
#[async_trait]
pub trait Probe: Send + Sync {
    async fn probe(&self, descriptor: &ServiceDescriptor, timeout: Duration) -> ProbeResult;
}

/// Issues one bounded-time health check against a resolved target and
/// classifies the outcome.
pub struct HealthProber {
    resolver: Arc<Resolver>,
    client: Client,
}

impl HealthProber {
    pub fn new(resolver: Arc<Resolver>) -> Self {
        let client = Client::builder()
            .build()
            .expect("Failed to create probe HTTP client");

        Self { resolver, client }
    }
}

#[async_trait]
impl Probe for HealthProber {
    async fn probe(&self, descriptor: &ServiceDescriptor, deadline: Duration) -> ProbeResult {
        let slug = descriptor.slug.as_str();

        // No declared health contract: unknown, no network call.
        let Some(path) = descriptor.health_path.as_deref() else {
            return ProbeResult::unknown(slug, "no health-check path declared");
        };

        let base = match self.resolver.resolve(slug, &ResolveOptions::default()).await {
            Ok(base) => base,
            Err(e) => return ProbeResult::unknown(slug, e.to_string()),
        };
        // Appended to the base, preserving any path the base carries; one
        // cached base serves both probes and business calls.
        let target = join_path(&base, path);

        // The deadline is enforced here, independently of any client default.
        // On expiry the request future is dropped, which cancels the in-flight
        // connection rather than letting it finish in the background.
        let start = Instant::now();
        let outcome = timeout(deadline, self.client.get(target).send()).await;
        let latency_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(Ok(response)) => {
                let status = response.status();
                if status.is_success() {
                    debug!("Probe {} healthy in {}ms", slug, latency_ms);
                    ProbeResult::healthy(slug, latency_ms)
                } else {
                    ProbeResult::unhealthy(slug, latency_ms, format!("HTTP {}", status.as_u16()))
                }
            }
            Ok(Err(e)) => ProbeResult::unhealthy(slug, latency_ms, normalize_cause(&e)),
            Err(_) => ProbeResult::unhealthy(slug, latency_ms, "timeout"),
        }
    }
}

/// Collapses transport failures into a stable, comparable cause string.
fn normalize_cause(error: &reqwest::Error) -> String {
    if error.is_timeout() {
        "timeout".to_string()
    } else if error.is_connect() {
        "connection failed".to_string()
    } else if error.is_request() {
        "request error".to_string()
    } else {
        error.to_string()
    }
}
