// tests/monitor_tests.rs
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use hyper::{Body, Request};
use northflank_monitor::{
    broadcast::{Broadcaster, ServerMessage},
    config::{BroadcastConfig, TargetConfig},
    health::{HealthRegistry, HealthStatus},
    probe::{ProbeError, ProbeResult, Prober},
    query::QueryApi,
    scheduler::Scheduler,
    server::{RequestHandler, WebSocketServer},
    shutdown::Shutdown,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::{client_async, connect_async, tungstenite::Message};
use tower::ServiceExt;
use url::Url;

fn target(id: &str) -> TargetConfig {
    let mut target = TargetConfig::new(id, Url::parse("http://127.0.0.1:1").unwrap());
    target.interval_secs = 10;
    target.backoff_max_secs = 10;
    target.failure_threshold = 3;
    target.jitter = false;
    target
}

fn broadcast_config() -> BroadcastConfig {
    BroadcastConfig {
        heartbeat_secs: 30,
        delivery_timeout_ms: 200,
        channel_capacity: 8,
    }
}

/// Plays back a fixed list of outcomes, then keeps succeeding.
struct Playback(Mutex<VecDeque<bool>>);

#[async_trait]
impl Prober for Playback {
    async fn probe(&self, target: &TargetConfig) -> ProbeResult {
        let ok = self.0.lock().unwrap().pop_front().unwrap_or(true);
        if ok {
            ProbeResult::success(Duration::from_millis(2))
        } else {
            ProbeResult::failure(target.timeout(), ProbeError::Timeout(target.timeout()))
        }
    }
}

fn status_of(message: &ServerMessage, id: &str) -> HealthStatus {
    let ServerMessage::MonitoringUpdate(update) = message;
    update.services[id]
}

#[tokio::test(start_paused = true)]
async fn svc_a_transitions_are_pushed_to_subscribers() {
    let registry = Arc::new(HealthRegistry::new(&[target("svc-a")]));
    let broadcaster = Arc::new(Broadcaster::new(registry.clone(), broadcast_config(), None));
    let prober = Arc::new(Playback(Mutex::new(VecDeque::from(vec![false, false, false]))));
    let scheduler =
        Scheduler::new(vec![target("svc-a")], prober, registry.clone(), None).unwrap();

    let shutdown = Shutdown::new();
    let mut subscription = broadcaster.subscribe();
    let initial = subscription.recv().await.unwrap();
    assert_eq!(status_of(&initial, "svc-a"), HealthStatus::Unknown);

    let broadcast_task = tokio::spawn(broadcaster.clone().run(shutdown.subscribe()));
    let probe_tasks = scheduler.start(shutdown.subscribe());

    let mut seen = Vec::new();
    while seen.last() != Some(&HealthStatus::Operational) {
        let message = subscription.recv().await.unwrap();
        let status = status_of(&message, "svc-a");
        if seen.last() != Some(&status) {
            seen.push(status);
        }
    }

    assert_eq!(
        seen,
        vec![HealthStatus::Degraded, HealthStatus::Down, HealthStatus::Operational]
    );
    assert_eq!(registry.get("svc-a").unwrap().consecutive_failures, 0);

    shutdown.trigger();
    for task in probe_tasks {
        task.await.unwrap();
    }
    broadcast_task.await.unwrap();
}

#[tokio::test]
async fn websocket_clients_receive_snapshot_and_disconnects_are_pruned() {
    let registry = Arc::new(HealthRegistry::new(&[target("svc-a"), target("svc-b")]));
    registry
        .update("svc-a", &ProbeResult::success(Duration::from_millis(1)))
        .unwrap();
    let broadcaster = Arc::new(Broadcaster::new(registry.clone(), broadcast_config(), None));
    let shutdown = Shutdown::new();

    let server = WebSocketServer::bind(
        "127.0.0.1:0".parse().unwrap(),
        broadcaster.clone(),
        Duration::from_millis(200),
    )
    .await
    .unwrap();
    let url = format!("ws://{}", server.local_addr().unwrap());
    let server_task = tokio::spawn(server.serve(shutdown.subscribe()));

    let (mut first, _) = connect_async(url.as_str()).await.unwrap();
    let (mut second, _) = connect_async(url.as_str()).await.unwrap();

    // Both get the current snapshot straight away.
    let expected = serde_json::to_value(registry.snapshot().statuses()).unwrap();
    for client in [&mut first, &mut second] {
        let frame = tokio::time::timeout(Duration::from_secs(2), client.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let json: serde_json::Value = serde_json::from_str(frame.to_text().unwrap()).unwrap();
        assert_eq!(json["type"], "monitoring_update");
        assert_eq!(json["data"]["services"], expected);
    }

    // One client leaves.
    first.send(Message::Close(None)).await.unwrap();
    tokio::time::timeout(Duration::from_secs(2), async {
        while broadcaster.subscriber_count() != 1 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    let report = broadcaster.publish(&registry.snapshot()).await;
    assert_eq!(report.delivered, 1);

    let frame = tokio::time::timeout(Duration::from_secs(2), second.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let json: serde_json::Value = serde_json::from_str(frame.to_text().unwrap()).unwrap();
    assert_eq!(json["data"]["connected_clients"], 1);

    // `/health` agrees.
    let api = Arc::new(QueryApi::new(registry, broadcaster.clone(), shutdown.clone()));
    let response = RequestHandler::new(api)
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
    let health: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(health["connected_clients"], 1);

    // Shutdown closes the remaining stream.
    shutdown.trigger();
    broadcaster.close_all();
    server_task.await.unwrap().unwrap();
    let closing = tokio::time::timeout(Duration::from_secs(2), second.next())
        .await
        .unwrap();
    assert!(matches!(closing, Some(Ok(Message::Close(_))) | None | Some(Err(_))));
}

#[tokio::test]
async fn websocket_client_that_stops_reading_is_dropped_on_write_deadline() {
    // Enough long ids that each update is a few hundred KB.
    let targets: Vec<_> = (0..2000)
        .map(|i| target(&format!("svc-{:04}-{}", i, "x".repeat(200))))
        .collect();
    let registry = Arc::new(HealthRegistry::new(&targets));
    let broadcaster = Arc::new(Broadcaster::new(
        registry.clone(),
        BroadcastConfig {
            heartbeat_secs: 30,
            delivery_timeout_ms: 5000,
            channel_capacity: 1,
        },
        None,
    ));
    let shutdown = Shutdown::new();

    let server = WebSocketServer::bind(
        "127.0.0.1:0".parse().unwrap(),
        broadcaster.clone(),
        Duration::from_millis(100),
    )
    .await
    .unwrap();
    let addr = server.local_addr().unwrap();
    let url = format!("ws://{}", addr);
    let server_task = tokio::spawn(server.serve(shutdown.subscribe()));

    // Completes the handshake, then never polls the socket again.
    let stream = TcpStream::connect(addr).await.unwrap();
    let (_stalled, _) = client_async(url.as_str(), stream).await.unwrap();

    let (reader, _) = connect_async(url.as_str()).await.unwrap();
    let received = Arc::new(AtomicUsize::new(0));
    let reader_task = {
        let received = received.clone();
        tokio::spawn(async move {
            let mut reader = reader;
            while let Some(Ok(frame)) = reader.next().await {
                if frame.is_text() {
                    received.fetch_add(1, Ordering::SeqCst);
                }
            }
        })
    };

    tokio::time::timeout(Duration::from_secs(2), async {
        while broadcaster.subscriber_count() != 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    // Keep publishing until the stalled client's socket buffer fills and
    // its write deadline removes it.
    let snapshot = registry.snapshot();
    tokio::time::timeout(Duration::from_secs(30), async {
        while broadcaster.subscriber_count() != 1 {
            broadcaster.publish(&snapshot).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(broadcaster.subscriber_count(), 1);

    // The reading client keeps getting updates.
    let before = received.load(Ordering::SeqCst);
    let report = broadcaster.publish(&snapshot).await;
    assert_eq!(report.delivered, 1);
    tokio::time::timeout(Duration::from_secs(5), async {
        while received.load(Ordering::SeqCst) <= before {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    shutdown.trigger();
    broadcaster.close_all();
    server_task.await.unwrap().unwrap();
    tokio::time::timeout(Duration::from_secs(5), reader_task)
        .await
        .unwrap()
        .unwrap();
}
