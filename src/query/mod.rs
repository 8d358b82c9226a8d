// src/query/mod.rs
//! Read-only views over the registry and broadcaster for the HTTP layer.

mod responses;

pub use responses::{DashboardResponse, HealthResponse, MonitoringSummary, StatusResponse};

use crate::broadcast::Broadcaster;
use crate::health::{HealthRegistry, HealthStatus};
use crate::shutdown::Shutdown;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const SERVICE_NAME: &str = "NorthFlank Monitor";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

const STATUS_HEALTHY: &str = "healthy";
const STATUS_SHUTTING_DOWN: &str = "shutting_down";
const DASHBOARD_ACTIVE: &str = "active";

#[derive(Debug, Clone, PartialEq)]
pub struct HealthSummary {
    pub overall_status: HealthStatus,
    pub per_target_status: BTreeMap<String, HealthStatus>,
    pub subscriber_count: usize,
    pub uptime: Duration,
}

pub struct QueryApi {
    registry: Arc<HealthRegistry>,
    broadcaster: Arc<Broadcaster>,
    shutdown: Shutdown,
    started_at: Instant,
}

impl QueryApi {
    pub fn new(
        registry: Arc<HealthRegistry>,
        broadcaster: Arc<Broadcaster>,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            registry,
            broadcaster,
            shutdown,
            started_at: Instant::now(),
        }
    }

    pub fn health_summary(&self) -> HealthSummary {
        let per_target_status = self.registry.snapshot().statuses();

        HealthSummary {
            overall_status: overall_status(per_target_status.values().copied()),
            per_target_status,
            subscriber_count: self.broadcaster.subscriber_count(),
            uptime: self.started_at.elapsed(),
        }
    }

    pub fn health(&self) -> HealthResponse {
        let status = if self.shutdown.is_triggered() {
            STATUS_SHUTTING_DOWN
        } else {
            STATUS_HEALTHY
        };

        HealthResponse {
            status,
            timestamp: Utc::now(),
            version: VERSION,
            uptime: self.started_at.elapsed().as_secs_f64(),
            service: SERVICE_NAME,
            connected_clients: self.broadcaster.subscriber_count(),
        }
    }

    pub fn dashboard(&self) -> DashboardResponse {
        let summary = self.health_summary();

        DashboardResponse {
            timestamp: Utc::now(),
            service: SERVICE_NAME,
            status: DASHBOARD_ACTIVE,
            connected_clients: summary.subscriber_count,
            monitoring: MonitoringSummary {
                targets: summary.per_target_status.len(),
                status: summary.overall_status,
            },
        }
    }

    pub fn status(&self) -> StatusResponse {
        let summary = self.health_summary();

        StatusResponse {
            status: summary.overall_status,
            timestamp: Utc::now(),
            services: summary.per_target_status,
        }
    }
}

/// Roll individual target statuses up into one.
///
/// Unknown when there is nothing known yet, Down only when every target is
/// down, Degraded when anything is failing, Operational when all targets are.
pub fn overall_status<I>(statuses: I) -> HealthStatus
where
    I: IntoIterator<Item = HealthStatus>,
{
    let (mut total, mut unknown, mut operational, mut down) = (0, 0, 0, 0);
    for status in statuses {
        total += 1;
        match status {
            HealthStatus::Unknown => unknown += 1,
            HealthStatus::Operational => operational += 1,
            HealthStatus::Down => down += 1,
            HealthStatus::Degraded => {}
        }
    }

    if total == unknown {
        HealthStatus::Unknown
    } else if down == total {
        HealthStatus::Down
    } else if operational + unknown < total {
        HealthStatus::Degraded
    } else if unknown > 0 {
        HealthStatus::Unknown
    } else {
        HealthStatus::Operational
    }
}
