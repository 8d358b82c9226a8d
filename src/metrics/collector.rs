// src/metrics/collector.rs
use crate::health::HealthStatus;
use anyhow::Result;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
    Opts, Registry, TextEncoder,
};
use std::sync::Arc;
use std::time::Duration;

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

    pub fn gather(&self) -> Result<Vec<u8>> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(buffer)
    }
}

pub struct MetricsCollector {
    // Probe metrics
    pub probes_total: IntCounterVec,
    pub probe_duration_seconds: HistogramVec,

    // Target state
    pub target_status: IntGaugeVec,
    pub status_transitions_total: IntCounterVec,

    // Broadcast metrics
    pub subscribers: IntGauge,
    pub messages_published_total: IntCounter,
    pub subscribers_dropped_total: IntCounter,
}

impl MetricsCollector {
    pub fn new(registry: &Registry) -> Result<Self> {
        let probes_total = IntCounterVec::new(
            Opts::new("monitor_probes_total", "Total number of probes"),
            &["target", "result"],
        )?;
        registry.register(Box::new(probes_total.clone()))?;

        let probe_duration_seconds = HistogramVec::new(
            HistogramOpts::new("monitor_probe_duration_seconds", "Probe latency in seconds"),
            &["target"],
        )?;
        registry.register(Box::new(probe_duration_seconds.clone()))?;

        let target_status = IntGaugeVec::new(
            Opts::new(
                "monitor_target_status",
                "Target status (0=unknown, 1=operational, 2=degraded, 3=down)",
            ),
            &["target"],
        )?;
        registry.register(Box::new(target_status.clone()))?;

        let status_transitions_total = IntCounterVec::new(
            Opts::new(
                "monitor_status_transitions_total",
                "Total status transitions by new status",
            ),
            &["target", "to"],
        )?;
        registry.register(Box::new(status_transitions_total.clone()))?;

        let subscribers = IntGauge::new("monitor_subscribers", "Connected stream subscribers")?;
        registry.register(Box::new(subscribers.clone()))?;

        let messages_published_total = IntCounter::new(
            "monitor_messages_published_total",
            "Total updates delivered to subscribers",
        )?;
        registry.register(Box::new(messages_published_total.clone()))?;

        let subscribers_dropped_total = IntCounter::new(
            "monitor_subscribers_dropped_total",
            "Subscribers removed after a failed delivery",
        )?;
        registry.register(Box::new(subscribers_dropped_total.clone()))?;

        Ok(Self {
            probes_total,
            probe_duration_seconds,
            target_status,
            status_transitions_total,
            subscribers,
            messages_published_total,
            subscribers_dropped_total,
        })
    }

    pub fn record_probe(&self, target: &str, ok: bool, latency: Duration) {
        let result = if ok { "success" } else { "failure" };
        self.probes_total
            .with_label_values(&[target, result])
            .inc();

        self.probe_duration_seconds
            .with_label_values(&[target])
            .observe(latency.as_secs_f64());
    }

    pub fn record_transition(&self, target: &str, to: HealthStatus) {
        self.status_transitions_total
            .with_label_values(&[target, to.as_str()])
            .inc();

        self.record_status(target, to);
    }

    /// Set the status gauge without counting a transition, e.g. for targets
    /// that are still Unknown at startup.
    pub fn record_status(&self, target: &str, status: HealthStatus) {
        self.target_status
            .with_label_values(&[target])
            .set(status.as_gauge());
    }

    pub fn update_subscribers(&self, count: usize) {
        self.subscribers.set(count as i64);
    }

    pub fn record_published(&self, delivered: usize) {
        self.messages_published_total.inc_by(delivered as u64);
    }

    pub fn record_dropped_subscriber(&self) {
        self.subscribers_dropped_total.inc();
    }
}
