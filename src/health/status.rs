// src/health/status.rs
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Unknown,
    Operational,
    Degraded,
    Down,
}

impl HealthStatus {
    /// Next status after a probe result.
    ///
    /// `failures` is the consecutive failure count including this result
    /// (ignored on success). Every `(status, result)` pair has exactly one
    /// successor.
    pub fn next(self, ok: bool, failures: u32, threshold: u32) -> HealthStatus {
        if ok {
            return HealthStatus::Operational;
        }

        if failures >= threshold {
            return HealthStatus::Down;
        }

        match self {
            HealthStatus::Unknown | HealthStatus::Operational | HealthStatus::Degraded => {
                HealthStatus::Degraded
            }
            HealthStatus::Down => HealthStatus::Down,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Unknown => "unknown",
            HealthStatus::Operational => "operational",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Down => "down",
        }
    }

    /// Gauge encoding used by the metrics exporter.
    pub fn as_gauge(&self) -> i64 {
        match self {
            HealthStatus::Unknown => 0,
            HealthStatus::Operational => 1,
            HealthStatus::Degraded => 2,
            HealthStatus::Down => 3,
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
