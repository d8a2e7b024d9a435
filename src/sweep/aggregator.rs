// src/sweep/aggregator.rs
use crate::metrics::MetricsCollector;
use crate::probe::{Probe, ProbeResult, ProbeStatus};
use crate::registry::ServiceDescriptor;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

/// Predicate applied to the descriptor set before probing. Both fields must
/// match when present.
#[derive(Debug, Clone, Default)]
pub struct SweepFilter {
    pub tier: Option<String>,
    pub slugs: Option<Vec<String>>,
}

impl SweepFilter {
    pub fn matches(&self, descriptor: &ServiceDescriptor) -> bool {
        if let Some(tier) = &self.tier {
            if descriptor.tier.as_deref() != Some(tier.as_str()) {
                return false;
            }
        }
        if let Some(slugs) = &self.slugs {
            if !slugs.iter().any(|s| s == &descriptor.slug) {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone)]
pub struct SweepOptions {
    /// Per-probe deadline, not a whole-sweep deadline.
    pub timeout: Duration,
    /// Upper bound on concurrent outbound probes.
    pub batch_size: usize,
    pub filter: Option<SweepFilter>,
}

impl Default for SweepOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            batch_size: 8,
            filter: None,
        }
    }
}

/// Immutable summary of one sweep. Replaces its predecessor wholesale; counts
/// always sum to `total`.
#[derive(Debug, Clone, Serialize)]
pub struct AggregateReport {
    pub sweep_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub results: Vec<ProbeResult>,
    pub healthy: usize,
    pub unhealthy: usize,
    pub unknown: usize,
    pub total: usize,
}

impl AggregateReport {
    pub fn from_results(
        sweep_id: Uuid,
        started_at: DateTime<Utc>,
        results: Vec<ProbeResult>,
    ) -> Self {
        let mut healthy = 0;
        let mut unhealthy = 0;
        let mut unknown = 0;
        for result in &results {
            match result.status {
                ProbeStatus::Healthy => healthy += 1,
                ProbeStatus::Unhealthy => unhealthy += 1,
                ProbeStatus::Unknown => unknown += 1,
            }
        }

        Self {
            sweep_id,
            started_at,
            total: results.len(),
            results,
            healthy,
            unhealthy,
            unknown,
        }
    }

    /// Healthy share of the sweep; 0 when nothing was probed.
    pub fn percent_healthy(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.healthy as f64 / self.total as f64
        }
    }

    pub fn result_for(&self, slug: &str) -> Option<&ProbeResult> {
        self.results.iter().find(|r| r.slug == slug)
    }
}

/// Fans probes out across a descriptor set in bounded-size concurrent batches
/// and folds the outcomes into one report.
pub struct HealthAggregator {
    prober: Arc<dyn Probe>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl HealthAggregator {
    pub fn new(prober: Arc<dyn Probe>, metrics: Option<Arc<MetricsCollector>>) -> Self {
        Self { prober, metrics }
    }

    /// Probes the filtered set batch by batch: everything within a batch runs
    /// in parallel, the next batch waits for the current one, so peak
    /// concurrency never exceeds the batch size.
    pub async fn run_sweep(
        &self,
        descriptors: &[Arc<ServiceDescriptor>],
        opts: &SweepOptions,
    ) -> AggregateReport {
        let sweep_id = Uuid::new_v4();
        let started_at = Utc::now();

        let targets: Vec<Arc<ServiceDescriptor>> = descriptors
            .iter()
            .filter(|d| opts.filter.as_ref().map_or(true, |f| f.matches(d)))
            .cloned()
            .collect();

        let batch_size = opts.batch_size.max(1);
        let mut results = Vec::with_capacity(targets.len());

        for batch in targets.chunks(batch_size) {
            debug!(
                "Sweep {} probing batch of {} services",
                sweep_id,
                batch.len()
            );
            let probes = batch
                .iter()
                .map(|descriptor| self.prober.probe(descriptor, opts.timeout));
            results.extend(join_all(probes).await);
        }

        if let Some(metrics) = &self.metrics {
            for result in &results {
                metrics.record_probe(result);
            }
        }

        let report = AggregateReport::from_results(sweep_id, started_at, results);

        if let Some(metrics) = &self.metrics {
            metrics.record_sweep(report.healthy, report.total);
        }

        info!(
            "Sweep {} complete: {}/{} healthy, {} unhealthy, {} unknown",
            sweep_id, report.healthy, report.total, report.unhealthy, report.unknown
        );
        report
    }
}
