// src/config/models.rs
use crate::scheduler::SchedulerConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub broadcast: BroadcastConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,

    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,

    #[serde(default)]
    pub targets: Vec<TargetConfig>,
}

impl Config {
    /// Reject configurations the scheduler could never run.
    pub fn validate(&self) -> Result<(), SchedulerConfigError> {
        if self.targets.is_empty() {
            return Err(SchedulerConfigError::NoTargets);
        }

        let mut seen = HashSet::new();
        for target in &self.targets {
            if !seen.insert(target.id.as_str()) {
                return Err(SchedulerConfigError::DuplicateTarget(target.id.clone()));
            }
            target.validate()?;
        }

        if self.broadcast.heartbeat_secs == 0 {
            return Err(SchedulerConfigError::InvalidHeartbeat);
        }

        Ok(())
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_websocket_port")]
    pub websocket_port: u16,

    /// How long the HTTP listener keeps accepting after shutdown starts, so
    /// load balancers polling `/health` see the 503.
    #[serde(default = "default_drain_secs")]
    pub drain_secs: u64,
}

impl ServerConfig {
    pub fn drain(&self) -> Duration {
        Duration::from_secs(self.drain_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            websocket_port: default_websocket_port(),
            drain_secs: default_drain_secs(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: LogFormat,

    /// When set, JSON logs are also written to `combined.log` and
    /// `error.log` (errors only) in this directory.
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            directory: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastConfig {
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,

    /// Deadline for handing one update to one subscriber.
    #[serde(default = "default_delivery_timeout_ms")]
    pub delivery_timeout_ms: u64,

    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl BroadcastConfig {
    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs)
    }

    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_millis(self.delivery_timeout_ms)
    }
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            heartbeat_secs: default_heartbeat_secs(),
            delivery_timeout_ms: default_delivery_timeout_ms(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,

    #[serde(default = "default_metrics_path")]
    pub path: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            path: default_metrics_path(),
        }
    }
}

/// How a target is checked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CheckKind {
    /// `GET endpoint + path`, healthy on any 2xx.
    Http {
        #[serde(default = "default_check_path")]
        path: String,
    },
    /// Plain TCP connect to the endpoint's host and port.
    Tcp,
}

impl Default for CheckKind {
    fn default() -> Self {
        CheckKind::Http {
            path: default_check_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    pub id: String,
    pub endpoint: Url,

    #[serde(default)]
    pub check: CheckKind,

    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    #[serde(default = "default_backoff_max_secs")]
    pub backoff_max_secs: u64,

    #[serde(default = "default_jitter")]
    pub jitter: bool,
}

impl TargetConfig {
    /// Target with the default probe settings, checked over HTTP at `/health`.
    pub fn new(id: impl Into<String>, endpoint: Url) -> Self {
        Self {
            id: id.into(),
            endpoint,
            check: CheckKind::default(),
            interval_secs: default_interval_secs(),
            timeout_ms: default_timeout_ms(),
            failure_threshold: default_failure_threshold(),
            backoff_max_secs: default_backoff_max_secs(),
            jitter: default_jitter(),
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_secs(self.backoff_max_secs)
    }

    pub fn validate(&self) -> Result<(), SchedulerConfigError> {
        let target = || self.id.clone();

        if self.id.trim().is_empty() {
            return Err(SchedulerConfigError::EmptyTargetId);
        }
        if self.interval_secs == 0 {
            return Err(SchedulerConfigError::InvalidInterval(target()));
        }
        if self.timeout_ms == 0 {
            return Err(SchedulerConfigError::InvalidTimeout(target()));
        }
        if self.failure_threshold == 0 {
            return Err(SchedulerConfigError::InvalidThreshold(target()));
        }
        if self.backoff_max_secs < self.interval_secs {
            return Err(SchedulerConfigError::InvalidBackoffCap(target()));
        }
        if self.check == CheckKind::Tcp && self.endpoint.host_str().is_none() {
            return Err(SchedulerConfigError::InvalidEndpoint(target()));
        }
        Ok(())
    }
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    3002
}
fn default_websocket_port() -> u16 {
    8080
}
fn default_drain_secs() -> u64 {
    2
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> LogFormat {
    LogFormat::Text
}
fn default_heartbeat_secs() -> u64 {
    30
}
fn default_delivery_timeout_ms() -> u64 {
    1000
}
fn default_channel_capacity() -> usize {
    16
}
fn default_metrics_enabled() -> bool {
    true
}
fn default_metrics_path() -> String {
    "/metrics".to_string()
}
fn default_shutdown_grace_secs() -> u64 {
    5
}
fn default_check_path() -> String {
    "/health".to_string()
}
fn default_interval_secs() -> u64 {
    10
}
fn default_timeout_ms() -> u64 {
    5000
}
fn default_failure_threshold() -> u32 {
    3
}
fn default_backoff_max_secs() -> u64 {
    300
}
fn default_jitter() -> bool {
    true
}
