// src/broadcast/message.rs
use crate::health::{HealthStatus, Snapshot};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Messages pushed to stream subscribers.
///
/// Serialized as `{"type": "monitoring_update", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    MonitoringUpdate(MonitoringUpdate),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitoringUpdate {
    pub timestamp: DateTime<Utc>,
    pub services: BTreeMap<String, HealthStatus>,
    pub connected_clients: usize,
}

impl ServerMessage {
    pub fn monitoring_update(snapshot: &Snapshot, connected_clients: usize) -> Self {
        ServerMessage::MonitoringUpdate(MonitoringUpdate {
            timestamp: snapshot.taken_at,
            services: snapshot.statuses(),
            connected_clients,
        })
    }
}
