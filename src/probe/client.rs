// src/probe/client.rs
use crate::config::{CheckKind, TargetConfig};
use async_trait::async_trait;
use reqwest::Client;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

/// Why a probe failed. Always carried inside a [`ProbeResult`], never returned as an `Err`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProbeError {
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("unexpected HTTP status {0}")]
    UnexpectedStatus(u16),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProbeResult {
    pub ok: bool,
    pub latency: Duration,
    pub error: Option<ProbeError>,
}

impl ProbeResult {
    pub fn success(latency: Duration) -> Self {
        Self {
            ok: true,
            latency,
            error: None,
        }
    }

    pub fn failure(latency: Duration, error: ProbeError) -> Self {
        Self {
            ok: false,
            latency,
            error: Some(error),
        }
    }
}

/// Runs a single health check against a target.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, target: &TargetConfig) -> ProbeResult;
}

/// Probes targets over HTTP or raw TCP. Holds only a pooled HTTP client.
#[derive(Clone)]
pub struct ProbeClient {
    client: Client,
}

impl ProbeClient {
    pub fn new() -> reqwest::Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("northflank-monitor/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    async fn probe_http(&self, target: &TargetConfig, path: &str) -> Result<(), ProbeError> {
        let url = target
            .endpoint
            .join(path)
            .map_err(|e| ProbeError::Connection(format!("invalid probe url: {}", e)))?;

        let response = self
            .client
            .get(url)
            .timeout(target.timeout())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProbeError::Timeout(target.timeout())
                } else {
                    ProbeError::Connection(e.to_string())
                }
            })?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(ProbeError::UnexpectedStatus(status.as_u16()))
        }
    }

    async fn probe_tcp(&self, target: &TargetConfig) -> Result<(), ProbeError> {
        let host = target
            .endpoint
            .host_str()
            .ok_or_else(|| ProbeError::Connection("endpoint has no host".to_string()))?;
        let port = target
            .endpoint
            .port_or_known_default()
            .ok_or_else(|| ProbeError::Connection("endpoint has no port".to_string()))?;

        TcpStream::connect((host, port))
            .await
            .map(|_| ())
            .map_err(|e| ProbeError::Connection(e.to_string()))
    }
}

#[async_trait]
impl Prober for ProbeClient {
    async fn probe(&self, target: &TargetConfig) -> ProbeResult {
        let start = Instant::now();

        let check = async {
            match &target.check {
                CheckKind::Http { path } => self.probe_http(target, path).await,
                CheckKind::Tcp => self.probe_tcp(target).await,
            }
        };

        // The client timeout covers the request; this bounds DNS and connect too.
        let outcome = match timeout(target.timeout(), check).await {
            Ok(outcome) => outcome,
            Err(_) => Err(ProbeError::Timeout(target.timeout())),
        };

        let latency = start.elapsed();
        match outcome {
            Ok(()) => ProbeResult::success(latency),
            Err(error) => {
                debug!(target_id = %target.id, %error, "probe failed");
                ProbeResult::failure(latency, error)
            }
        }
    }
}
