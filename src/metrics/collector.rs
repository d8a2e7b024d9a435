// src/metrics/collector.rs
use crate::probe::{ProbeResult, ProbeStatus};
use anyhow::Result;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntGauge, IntGaugeVec, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

pub struct MetricsRegistry {
    registry: Registry,
    collector: Arc<MetricsCollector>,
}

impl MetricsRegistry {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        let collector = Arc::new(MetricsCollector::new(&registry)?);

        Ok(Self {
            registry,
            collector,
        })
    }

    pub fn collector(&self) -> Arc<MetricsCollector> {
        self.collector.clone()
    }

    pub fn gather(&self) -> Vec<u8> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            tracing::error!("Failed to encode metrics: {}", e);
        }
        buffer
    }
}

pub struct MetricsCollector {
    pub probe_duration_seconds: HistogramVec,
    /// 1 healthy, 0 unhealthy, -1 unknown.
    pub service_health: IntGaugeVec,
    pub sweeps_total: IntCounter,
    pub healthy_services: IntGauge,
    pub total_services: IntGauge,
}

impl MetricsCollector {
    pub fn new(registry: &Registry) -> Result<Self> {
        let probe_duration_seconds = HistogramVec::new(
            HistogramOpts::new("svc_probe_duration_seconds", "Health probe duration"),
            &["service"],
        )?;
        registry.register(Box::new(probe_duration_seconds.clone()))?;

        let service_health = IntGaugeVec::new(
            Opts::new(
                "svc_service_health",
                "Service health (1=healthy, 0=unhealthy, -1=unknown)",
            ),
            &["service"],
        )?;
        registry.register(Box::new(service_health.clone()))?;

        let sweeps_total =
            IntCounter::new("svc_sweeps_total", "Total completed health sweeps")?;
        registry.register(Box::new(sweeps_total.clone()))?;

        let healthy_services =
            IntGauge::new("svc_healthy_services", "Healthy services in the last sweep")?;
        registry.register(Box::new(healthy_services.clone()))?;

        let total_services =
            IntGauge::new("svc_total_services", "Services covered by the last sweep")?;
        registry.register(Box::new(total_services.clone()))?;

        Ok(Self {
            probe_duration_seconds,
            service_health,
            sweeps_total,
            healthy_services,
            total_services,
        })
    }

    pub fn record_probe(&self, result: &ProbeResult) {
        self.probe_duration_seconds
            .with_label_values(&[&result.slug])
            .observe(result.latency_ms as f64 / 1000.0);

        let value = match result.status {
            ProbeStatus::Healthy => 1,
            ProbeStatus::Unhealthy => 0,
            ProbeStatus::Unknown => -1,
        };
        self.service_health
            .with_label_values(&[&result.slug])
            .set(value);
    }

    pub fn record_sweep(&self, healthy: usize, total: usize) {
        self.sweeps_total.inc();
        self.healthy_services.set(healthy as i64);
        self.total_services.set(total as i64);
    }
}
