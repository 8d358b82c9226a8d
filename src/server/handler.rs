// src/server/handler.rs
use crate::metrics::MetricsRegistry;
use crate::query::QueryApi;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Body, Method, Request, Response, StatusCode};
use serde::Serialize;
use std::convert::Infallible;
use std::sync::Arc;
use tower::Service;

/// Routes the read-only HTTP endpoints onto [`QueryApi`].
#[derive(Clone)]
pub struct RequestHandler {
    api: Arc<QueryApi>,
    metrics: Option<(Arc<str>, Arc<MetricsRegistry>)>,
}

impl RequestHandler {
    pub fn new(api: Arc<QueryApi>) -> Self {
        Self { api, metrics: None }
    }

    /// Serve the Prometheus exposition at `path`.
    pub fn with_metrics(mut self, path: &str, registry: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some((Arc::from(path), registry));
        self
    }

    pub fn route(&self, req: &Request<Body>) -> Response<Body> {
        if req.method() != Method::GET {
            return text_response(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed");
        }

        match req.uri().path() {
            "/health" => {
                let health = self.api.health();
                let status = if health.is_shutting_down() {
                    StatusCode::SERVICE_UNAVAILABLE
                } else {
                    StatusCode::OK
                };
                json_response(status, &health)
            }
            "/dashboard" => json_response(StatusCode::OK, &self.api.dashboard()),
            "/api/status" => json_response(StatusCode::OK, &self.api.status()),
            path => match &self.metrics {
                Some((metrics_path, registry)) if path == &**metrics_path => {
                    match registry.gather() {
                        Ok(body) => {
                            let mut response = Response::new(Body::from(body));
                            response.headers_mut().insert(
                                CONTENT_TYPE,
                                HeaderValue::from_static("text/plain; version=0.0.4"),
                            );
                            response
                        }
                        Err(e) => {
                            tracing::error!(%e, "failed to encode metrics");
                            text_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
                        }
                    }
                }
                _ => text_response(StatusCode::NOT_FOUND, "Not Found"),
            },
        }
    }
}

impl Service<Request<Body>> for RequestHandler {
    type Response = Response<Body>;
    type Error = Infallible;
    type Future = futures::future::Ready<Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        tracing::debug!(method = %req.method(), path = %req.uri().path(), "request");
        futures::future::ready(Ok(self.route(&req)))
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Body> {
    match serde_json::to_vec(body) {
        Ok(bytes) => {
            let mut response = Response::new(Body::from(bytes));
            *response.status_mut() = status;
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            response
        }
        Err(e) => {
            tracing::error!(%e, "failed to serialize response");
            text_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
        }
    }
}

fn text_response(status: StatusCode, message: &'static str) -> Response<Body> {
    let mut response = Response::new(Body::from(message));
    *response.status_mut() = status;
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::Broadcaster;
    use crate::config::{BroadcastConfig, TargetConfig};
    use crate::health::HealthRegistry;
    use crate::shutdown::Shutdown;
    use tower::ServiceExt;
    use url::Url;

    fn handler() -> (RequestHandler, Shutdown) {
        let target = TargetConfig::new("svc-a", Url::parse("http://localhost:9000").unwrap());
        let registry = Arc::new(HealthRegistry::new(&[target]));
        let broadcaster = Arc::new(Broadcaster::new(
            registry.clone(),
            BroadcastConfig::default(),
            None,
        ));
        let shutdown = Shutdown::new();
        let api = Arc::new(QueryApi::new(registry, broadcaster, shutdown.clone()));
        let metrics = Arc::new(MetricsRegistry::new().unwrap());
        (RequestHandler::new(api).with_metrics("/metrics", metrics), shutdown)
    }

    async fn get(handler: RequestHandler, path: &str) -> (StatusCode, serde_json::Value) {
        let req = Request::get(path).body(Body::empty()).unwrap();
        let response = handler.oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let (handler, _) = handler();
        let (status, body) = get(handler, "/health").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["connected_clients"], 0);
        assert!(body["uptime"].is_number());
        assert!(body["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_health_503_while_shutting_down() {
        let (handler, shutdown) = handler();
        shutdown.trigger();
        let (status, body) = get(handler, "/health").await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["status"], "shutting_down");
    }

    #[tokio::test]
    async fn test_dashboard_and_status_endpoints() {
        let (handler, _) = handler();

        let (status, body) = get(handler.clone(), "/dashboard").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "active");
        assert_eq!(body["monitoring"]["targets"], 1);
        assert_eq!(body["monitoring"]["status"], "unknown");

        let (status, body) = get(handler, "/api/status").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["services"]["svc-a"], "unknown");
    }

    #[tokio::test]
    async fn test_metrics_not_found_and_method() {
        let (handler, _) = handler();

        let req = Request::get("/metrics").body(Body::empty()).unwrap();
        let response = handler.clone().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let (status, _) = get(handler.clone(), "/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let req = Request::post("/health").body(Body::empty()).unwrap();
        let response = handler.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
