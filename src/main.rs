// src/main.rs
use anyhow::{anyhow, Result};
use northflank_monitor::{
    broadcast::Broadcaster,
    config,
    health::HealthRegistry,
    logging,
    metrics::MetricsRegistry,
    probe::ProbeClient,
    query::QueryApi,
    scheduler::Scheduler,
    server::{RequestHandler, ServerBuilder, WebSocketServer},
    shutdown::{self, Shutdown},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::{JoinError, JoinHandle};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // `.env` values feed the PORT / WS_PORT / LOG_LEVEL overrides.
    let dotenv = dotenvy::dotenv();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.yaml".to_string());
    let config = config::load_config(&config_path).await?;

    let _log_guards = logging::init(&config.logging)?;
    if let Ok(path) = dotenv {
        info!("Loaded environment from: {}", path.display());
    }
    info!("Loaded configuration from: {}", config_path);

    // Initialize metrics
    let metrics_registry = Arc::new(MetricsRegistry::new()?);
    let metrics = metrics_registry.collector();

    // Registry, prober and scheduler
    let registry = Arc::new(HealthRegistry::new(&config.targets));
    let prober = Arc::new(ProbeClient::new()?);
    let scheduler = Scheduler::new(
        config.targets.clone(),
        prober,
        registry.clone(),
        Some(metrics.clone()),
    )?;

    let broadcaster = Arc::new(Broadcaster::new(
        registry.clone(),
        config.broadcast.clone(),
        Some(metrics.clone()),
    ));

    let shutdown = Shutdown::new();
    let api = Arc::new(QueryApi::new(
        registry.clone(),
        broadcaster.clone(),
        shutdown.clone(),
    ));

    // Background workers
    let mut workers: Vec<JoinHandle<()>> = scheduler.start(shutdown.subscribe());
    workers.push(tokio::spawn(broadcaster.clone().run(shutdown.subscribe())));

    // WebSocket push channel
    let ws_addr: SocketAddr =
        format!("{}:{}", config.server.host, config.server.websocket_port).parse()?;
    let ws_server = WebSocketServer::bind(
        ws_addr,
        broadcaster.clone(),
        config.broadcast.delivery_timeout(),
    )
    .await?;
    let mut ws_task: ServerTask = tokio::spawn(ws_server.serve(shutdown.subscribe()));

    // HTTP query endpoints
    let mut handler = RequestHandler::new(api);
    if config.metrics.enabled {
        handler = handler.with_metrics(&config.metrics.path, metrics_registry.clone());
    }
    let http_addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let mut http_task: ServerTask = tokio::spawn(
        ServerBuilder::new(http_addr)
            .with_handler(handler)
            .with_shutdown(shutdown.subscribe())
            .with_drain(config.server.drain().min(config.shutdown_grace()))
            .serve(),
    );

    info!("NorthFlank Monitor started");
    info!("Dashboard available at http://{}/dashboard", http_addr);

    let exit = tokio::select! {
        _ = shutdown::signal_received() => Exit::Signal,
        res = &mut http_task => Exit::Http(res),
        res = &mut ws_task => Exit::WebSocket(res),
    };

    // Graceful shutdown
    shutdown.trigger();
    let outcome = match exit {
        Exit::Signal => {
            workers.push(detach(http_task));
            workers.push(detach(ws_task));
            Ok(())
        }
        Exit::Http(res) => {
            workers.push(detach(ws_task));
            server_exit("HTTP", res)
        }
        Exit::WebSocket(res) => {
            workers.push(detach(http_task));
            server_exit("WebSocket", res)
        }
    };

    let grace = config.shutdown_grace();
    match tokio::time::timeout(grace, futures::future::join_all(workers)).await {
        Ok(_) => info!("Shutdown complete"),
        Err(_) => warn!("Shutdown grace period of {:?} exceeded, exiting", grace),
    }

    outcome
}

type ServerTask = JoinHandle<Result<()>>;

enum Exit {
    Signal,
    Http(Result<Result<()>, JoinError>),
    WebSocket(Result<Result<()>, JoinError>),
}

fn detach(task: ServerTask) -> JoinHandle<()> {
    tokio::spawn(async move {
        let _ = task.await;
    })
}

/// A listener returning before shutdown is fatal.
fn server_exit(name: &str, res: Result<Result<()>, JoinError>) -> Result<()> {
    match res {
        Ok(Ok(())) => Err(anyhow!("{} server exited unexpectedly", name)),
        Ok(Err(e)) => {
            error!("{} server error: {}", name, e);
            Err(e)
        }
        Err(e) => Err(anyhow!("{} server task failed: {}", name, e)),
    }
}
