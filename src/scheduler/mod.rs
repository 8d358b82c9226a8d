// src/scheduler/mod.rs
mod backoff;

pub use backoff::Backoff;

use crate::config::TargetConfig;
use crate::health::HealthRegistry;
use crate::metrics::MetricsCollector;
use crate::probe::Prober;
use crate::shutdown;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Fatal at startup: the monitor never serves with these.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerConfigError {
    #[error("no targets configured")]
    NoTargets,

    #[error("target id must not be empty")]
    EmptyTargetId,

    #[error("duplicate target id: {0}")]
    DuplicateTarget(String),

    #[error("target {0}: interval must be greater than zero")]
    InvalidInterval(String),

    #[error("target {0}: timeout must be greater than zero")]
    InvalidTimeout(String),

    #[error("target {0}: failure threshold must be at least 1")]
    InvalidThreshold(String),

    #[error("target {0}: backoff cap must not be below the interval")]
    InvalidBackoffCap(String),

    #[error("target {0}: endpoint has no host")]
    InvalidEndpoint(String),

    #[error("heartbeat interval must be greater than zero")]
    InvalidHeartbeat,
}

/// Owns one probe loop per target.
pub struct Scheduler {
    targets: Vec<Arc<TargetConfig>>,
    prober: Arc<dyn Prober>,
    registry: Arc<HealthRegistry>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl Scheduler {
    pub fn new(
        targets: Vec<TargetConfig>,
        prober: Arc<dyn Prober>,
        registry: Arc<HealthRegistry>,
        metrics: Option<Arc<MetricsCollector>>,
    ) -> Result<Self, SchedulerConfigError> {
        if targets.is_empty() {
            return Err(SchedulerConfigError::NoTargets);
        }

        let mut seen = HashSet::new();
        for target in &targets {
            target.validate()?;
            if !seen.insert(target.id.clone()) {
                return Err(SchedulerConfigError::DuplicateTarget(target.id.clone()));
            }
            // No-op for targets registered up front.
            if registry.get(&target.id).is_err() {
                registry.register(target);
            }
        }

        // Every target gets a status series before its first transition.
        if let Some(metrics) = &metrics {
            for target in &targets {
                if let Ok(state) = registry.get(&target.id) {
                    metrics.record_status(&target.id, state.status);
                }
            }
        }

        Ok(Self {
            targets: targets.into_iter().map(Arc::new).collect(),
            prober,
            registry,
            metrics,
        })
    }

    pub fn target_count(&self) -> usize {
        self.targets.len()
    }

    /// Spawn one task per target. Each stops when `shutdown` fires,
    /// abandoning any probe in flight.
    pub fn start(&self, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        info!("Starting scheduler for {} targets", self.targets.len());

        self.targets
            .iter()
            .map(|target| {
                let probe_loop = ProbeLoop {
                    target: target.clone(),
                    prober: self.prober.clone(),
                    registry: self.registry.clone(),
                    metrics: self.metrics.clone(),
                };
                tokio::spawn(probe_loop.run(shutdown.clone()))
            })
            .collect()
    }
}

struct ProbeLoop {
    target: Arc<TargetConfig>,
    prober: Arc<dyn Prober>,
    registry: Arc<HealthRegistry>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl ProbeLoop {
    async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        let backoff = Backoff::for_target(&self.target);
        debug!(
            "Probing {} every {:?} (cap {:?})",
            self.target.id,
            self.target.interval(),
            self.target.backoff_max()
        );

        loop {
            // Awaited in place: the next tick cannot start before this probe ends.
            let result = tokio::select! {
                result = self.prober.probe(&self.target) => result,
                _ = shutdown::wait_for(&mut shutdown_rx) => break,
            };

            if let Some(metrics) = &self.metrics {
                metrics.record_probe(&self.target.id, result.ok, result.latency);
            }

            if let Some(error) = &result.error {
                warn!("Probe of {} failed: {}", self.target.id, error);
            }

            let failures = match self.registry.update(&self.target.id, &result) {
                Ok(transition) => {
                    if let (Some(metrics), Some(transition)) = (&self.metrics, &transition) {
                        metrics.record_transition(&self.target.id, transition.to);
                    }
                    self.registry
                        .get(&self.target.id)
                        .map(|state| state.consecutive_failures)
                        .unwrap_or(0)
                }
                Err(e) => {
                    error!("Dropping probe result: {}", e);
                    0
                }
            };

            let delay = backoff.delay(failures);
            if failures > 0 {
                debug!(
                    "Next probe of {} in {:?} ({} consecutive failures)",
                    self.target.id, delay, failures
                );
            }

            tokio::select! {
                _ = sleep(delay) => {}
                _ = shutdown::wait_for(&mut shutdown_rx) => break,
            }
        }

        info!("Probe loop for {} stopped", self.target.id);
    }
}
