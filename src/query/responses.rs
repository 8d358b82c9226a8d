// src/query/responses.rs
use crate::health::HealthStatus;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// `GET /health`
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub version: &'static str,
    /// Seconds since start.
    pub uptime: f64,
    pub service: &'static str,
    pub connected_clients: usize,
}

impl HealthResponse {
    pub fn is_shutting_down(&self) -> bool {
        self.status == super::STATUS_SHUTTING_DOWN
    }
}

/// `GET /dashboard`
#[derive(Debug, Clone, Serialize)]
pub struct DashboardResponse {
    pub timestamp: DateTime<Utc>,
    pub service: &'static str,
    pub status: &'static str,
    pub connected_clients: usize,
    pub monitoring: MonitoringSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonitoringSummary {
    pub targets: usize,
    pub status: HealthStatus,
}

/// `GET /api/status`
#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub status: HealthStatus,
    pub timestamp: DateTime<Utc>,
    pub services: BTreeMap<String, HealthStatus>,
}
