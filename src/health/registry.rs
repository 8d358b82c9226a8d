// src/health/registry.rs
use super::snapshot::{Snapshot, TargetState};
use super::status::HealthStatus;
use crate::config::TargetConfig;
use crate::probe::ProbeResult;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("unknown target: {0}")]
    UnknownTarget(String),
}

/// A status change produced by [`HealthRegistry::update`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub target_id: String,
    pub from: HealthStatus,
    pub to: HealthStatus,
    pub at: DateTime<Utc>,
}

#[derive(Debug)]
struct TargetEntry {
    failure_threshold: u32,
    state: TargetState,
}

/// Authoritative map of target id to current health.
///
/// Each update holds the target's shard lock for its whole read-modify-write,
/// so a snapshot sees either the old or the new state of a target, never a mix.
pub struct HealthRegistry {
    targets: DashMap<String, TargetEntry>,
    generation: AtomicU64,
    changes: watch::Sender<u64>,
}

impl HealthRegistry {
    pub fn new(targets: &[TargetConfig]) -> Self {
        let (changes, _) = watch::channel(0);
        let registry = Self {
            targets: DashMap::new(),
            generation: AtomicU64::new(0),
            changes,
        };

        for target in targets {
            registry.register(target);
        }
        registry
    }

    /// Adds a target in the Unknown state. Returns false if the id is taken.
    pub fn register(&self, target: &TargetConfig) -> bool {
        if self.targets.contains_key(&target.id) {
            warn!("Target {} already registered", target.id);
            return false;
        }

        self.targets.insert(
            target.id.clone(),
            TargetEntry {
                failure_threshold: target.failure_threshold,
                state: TargetState::new(),
            },
        );
        info!("Registered target {} ({})", target.id, target.endpoint);
        true
    }

    /// Apply one probe result. Returns the transition if the status changed.
    pub fn update(
        &self,
        target_id: &str,
        result: &ProbeResult,
    ) -> Result<Option<Transition>, RegistryError> {
        let mut entry = self
            .targets
            .get_mut(target_id)
            .ok_or_else(|| RegistryError::UnknownTarget(target_id.to_string()))?;

        let now = Utc::now();
        let threshold = entry.failure_threshold;
        let state = &mut entry.state;

        let failures = if result.ok {
            0
        } else {
            state.consecutive_failures.saturating_add(1)
        };
        let previous = state.status;
        let next = previous.next(result.ok, failures, threshold);

        state.consecutive_failures = failures;
        state.last_checked_at = Some(now);
        state.last_latency_ms = Some(result.latency.as_millis() as u64);
        state.last_error = result.error.as_ref().map(|e| e.to_string());

        let transition = if next != previous {
            state.status = next;
            state.last_changed_at = Some(now);
            Some(Transition {
                target_id: target_id.to_string(),
                from: previous,
                to: next,
                at: now,
            })
        } else {
            None
        };

        self.generation.fetch_add(1, Ordering::SeqCst);
        drop(entry);

        if let Some(transition) = &transition {
            match transition.to {
                HealthStatus::Operational => info!(
                    "Target {} is now operational (was {})",
                    target_id, transition.from
                ),
                HealthStatus::Down => warn!(
                    "Target {} is now down after {} consecutive failures",
                    target_id, failures
                ),
                _ => warn!(
                    "Target {} is now {} (was {})",
                    target_id, transition.to, transition.from
                ),
            }
            self.changes.send_modify(|count| *count += 1);
        }

        Ok(transition)
    }

    pub fn get(&self, target_id: &str) -> Result<TargetState, RegistryError> {
        self.targets
            .get(target_id)
            .map(|entry| entry.state.clone())
            .ok_or_else(|| RegistryError::UnknownTarget(target_id.to_string()))
    }

    pub fn snapshot(&self) -> Snapshot {
        let generation = self.generation.load(Ordering::SeqCst);
        let targets: BTreeMap<String, TargetState> = self
            .targets
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().state.clone()))
            .collect();

        Snapshot {
            taken_at: Utc::now(),
            generation,
            targets,
        }
    }

    /// Fires once per status transition (not per probe).
    pub fn watch_changes(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}
