// src/server/builder.rs
use crate::server::listener::{accepted, bind_tcp, ACCEPT_ERROR_DELAY};
use crate::shutdown;
use anyhow::{anyhow, Result};
use hyper::{server::conn::Http, Body, Request, Response};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower::Service;

/// Builder so `main.rs` can inject the request handler and shutdown signal.
pub struct ServerBuilder<H>
where
    H: Service<Request<Body>, Response = Response<Body>> + Send + Clone + 'static,
    H::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    H::Future: Send + 'static,
{
    addr: SocketAddr,
    handler: Option<H>,
    shutdown: Option<watch::Receiver<bool>>,
    drain: Duration,
}

impl<H> ServerBuilder<H>
where
    H: Service<Request<Body>, Response = Response<Body>> + Send + Clone + 'static,
    H::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    H::Future: Send + 'static,
{
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            handler: None,
            shutdown: None,
            drain: Duration::ZERO,
        }
    }

    pub fn with_handler(mut self, handler: H) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Stop accepting connections once this fires.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Keep accepting for this long after shutdown fires.
    pub fn with_drain(mut self, drain: Duration) -> Self {
        self.drain = drain;
        self
    }

    /// Consume the builder, bind the listener and serve until shutdown.
    pub async fn serve(self) -> Result<()> {
        let listener = bind_tcp(self.addr).await?;
        self.serve_listener(listener).await
    }

    /// Serve on an already bound listener until shutdown plus the drain window.
    pub async fn serve_listener(self, listener: TcpListener) -> Result<()> {
        let handler = self
            .handler
            .ok_or_else(|| anyhow!("handler must be set via with_handler()"))?;
        // Without a shutdown receiver, serve forever; `_never` outlives the loop.
        let (_never, fallback_rx) = watch::channel(false);
        let mut shutdown_rx = self.shutdown.unwrap_or(fallback_rx);
        let drain = self.drain;
        let addr = listener.local_addr()?;
        tracing::info!("HTTP server listening on {}", addr);

        let stop = async move {
            shutdown::wait_for(&mut shutdown_rx).await;
            if !drain.is_zero() {
                tracing::info!("HTTP server draining for {:?}", drain);
                tokio::time::sleep(drain).await;
            }
        };
        tokio::pin!(stop);

        loop {
            let (stream, peer) = tokio::select! {
                result = listener.accept() => match accepted(result, "HTTP") {
                    Some(conn) => conn,
                    None => {
                        tokio::time::sleep(ACCEPT_ERROR_DELAY).await;
                        continue;
                    }
                },
                _ = &mut stop => break,
            };
            let svc = handler.clone();

            tokio::spawn(async move {
                let http = Http::new();
                if let Err(err) = http.serve_connection(stream, svc).await {
                    tracing::warn!(%peer, %err, "connection error");
                }
            });
        }

        tracing::info!("HTTP server on {} stopped accepting connections", addr);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::Broadcaster;
    use crate::config::{BroadcastConfig, TargetConfig};
    use crate::health::HealthRegistry;
    use crate::query::QueryApi;
    use crate::server::RequestHandler;
    use crate::shutdown::Shutdown;
    use std::sync::Arc;
    use url::Url;

    fn handler(shutdown: &Shutdown) -> RequestHandler {
        let targets = [TargetConfig::new(
            "svc-a",
            Url::parse("http://127.0.0.1:9000").unwrap(),
        )];
        let registry = Arc::new(HealthRegistry::new(&targets));
        let broadcaster = Arc::new(Broadcaster::new(
            registry.clone(),
            BroadcastConfig::default(),
            None,
        ));
        RequestHandler::new(Arc::new(QueryApi::new(
            registry,
            broadcaster,
            shutdown.clone(),
        )))
    }

    #[tokio::test]
    async fn test_new_connections_see_503_while_draining() {
        let shutdown = Shutdown::new();
        let listener = bind_tcp("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let url = format!("http://{}/health", listener.local_addr().unwrap());

        let server = tokio::spawn(
            ServerBuilder::new(listener.local_addr().unwrap())
                .with_handler(handler(&shutdown))
                .with_shutdown(shutdown.subscribe())
                .with_drain(Duration::from_millis(500))
                .serve_listener(listener),
        );

        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(0)
            .build()
            .unwrap();
        assert_eq!(client.get(&url).send().await.unwrap().status(), 200);

        shutdown.trigger();
        let response = client.get(&url).send().await.unwrap();
        assert_eq!(response.status(), 503);

        tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_stops_accepting_without_drain() {
        let shutdown = Shutdown::new();
        let listener = bind_tcp("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(
            ServerBuilder::new(addr)
                .with_handler(handler(&shutdown))
                .with_shutdown(shutdown.subscribe())
                .serve_listener(listener),
        );

        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(2), server)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(tokio::net::TcpStream::connect(addr).await.is_err());
    }
}
