// src/health/snapshot.rs
use super::status::HealthStatus;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Per-target state held by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetState {
    pub status: HealthStatus,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub last_changed_at: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub last_latency_ms: Option<u64>,
    pub last_error: Option<String>,
}

impl TargetState {
    pub fn new() -> Self {
        Self {
            status: HealthStatus::Unknown,
            last_checked_at: None,
            last_changed_at: None,
            consecutive_failures: 0,
            last_latency_ms: None,
            last_error: None,
        }
    }
}

impl Default for TargetState {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of every target's state. Never mutated after creation.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub taken_at: DateTime<Utc>,
    pub generation: u64,
    pub targets: BTreeMap<String, TargetState>,
}

impl Snapshot {
    /// Target id to status, the shape the HTTP and stream payloads use.
    pub fn statuses(&self) -> BTreeMap<String, HealthStatus> {
        self.targets
            .iter()
            .map(|(id, state)| (id.clone(), state.status))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

// Two snapshots of the same registry state are equal regardless of when they were taken.
impl PartialEq for Snapshot {
    fn eq(&self, other: &Self) -> bool {
        self.generation == other.generation && self.targets == other.targets
    }
}

impl Eq for Snapshot {}
