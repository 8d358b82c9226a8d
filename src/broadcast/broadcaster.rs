// src/broadcast/broadcaster.rs
use super::message::ServerMessage;
use crate::config::BroadcastConfig;
use crate::health::{HealthRegistry, Snapshot};
use crate::metrics::MetricsCollector;
use crate::shutdown;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub type SubscriberId = Uuid;

/// Why one subscriber could not take an update. Never escalated past the broadcaster.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    #[error("subscriber channel closed")]
    Closed,

    #[error("delivery exceeded {0:?}")]
    Timeout(Duration),
}

/// Receiving end handed to one subscriber.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriberId,
    receiver: mpsc::Receiver<Arc<ServerMessage>>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Next update, or `None` once the broadcaster dropped this subscriber.
    pub async fn recv(&mut self) -> Option<Arc<ServerMessage>> {
        self.receiver.recv().await
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PublishReport {
    pub delivered: usize,
    pub dropped: usize,
}

/// Fans registry snapshots out to every live subscriber.
pub struct Broadcaster {
    registry: Arc<HealthRegistry>,
    subscribers: DashMap<SubscriberId, mpsc::Sender<Arc<ServerMessage>>>,
    config: BroadcastConfig,
    metrics: Option<Arc<MetricsCollector>>,
    changes: watch::Receiver<u64>,
    closed: AtomicBool,
}

impl Broadcaster {
    pub fn new(
        registry: Arc<HealthRegistry>,
        config: BroadcastConfig,
        metrics: Option<Arc<MetricsCollector>>,
    ) -> Self {
        let changes = registry.watch_changes();
        Self {
            registry,
            subscribers: DashMap::new(),
            config,
            metrics,
            changes,
            closed: AtomicBool::new(false),
        }
    }

    /// Register a subscriber. Its first message is the current full snapshot.
    pub fn subscribe(&self) -> Subscription {
        let (tx, receiver) = mpsc::channel(self.config.channel_capacity.max(1));
        let id = Uuid::new_v4();

        // Registered before the snapshot is taken, so a transition published
        // in between reaches this subscriber one way or the other.
        let registered = !self.closed.load(Ordering::SeqCst);
        if registered {
            self.subscribers.insert(id, tx.clone());
            self.report_count();
            debug!("Subscriber {} registered", id);
        } else {
            debug!("Subscriber {} arrived after shutdown, not registered", id);
        }

        let snapshot = self.registry.snapshot();
        let clients = self.subscriber_count() + usize::from(!registered);
        let initial = ServerMessage::monitoring_update(&snapshot, clients);
        // Only fails when a concurrent publish already filled the channel
        // with an update at least as recent.
        let _ = tx.try_send(Arc::new(initial));

        Subscription { id, receiver }
    }

    pub fn unsubscribe(&self, id: &SubscriberId) -> bool {
        let removed = self.subscribers.remove(id).is_some();
        if removed {
            self.report_count();
            debug!("Subscriber {} removed", id);
        }
        removed
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Deliver `snapshot` to every subscriber concurrently.
    ///
    /// Each send is bounded by the delivery timeout; a subscriber that is
    /// closed or too slow is removed without affecting the others.
    pub async fn publish(&self, snapshot: &Snapshot) -> PublishReport {
        // Drop receivers that already hung up so the client count is accurate.
        self.subscribers.retain(|_, tx| !tx.is_closed());

        let targets: Vec<(SubscriberId, mpsc::Sender<Arc<ServerMessage>>)> = self
            .subscribers
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();

        if targets.is_empty() {
            self.report_count();
            return PublishReport::default();
        }

        let message = Arc::new(ServerMessage::monitoring_update(snapshot, targets.len()));
        let deadline = self.config.delivery_timeout();

        let deliveries = targets.into_iter().map(|(id, tx)| {
            let message = message.clone();
            async move { (id, deliver(&tx, message, deadline).await) }
        });
        let results = futures::future::join_all(deliveries).await;

        let mut report = PublishReport::default();
        for (id, result) in results {
            match result {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!("Dropping subscriber {}: {}", id, e);
                    self.subscribers.remove(&id);
                    report.dropped += 1;
                    if let Some(metrics) = &self.metrics {
                        metrics.record_dropped_subscriber();
                    }
                }
            }
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_published(report.delivered);
        }
        self.report_count();

        debug!(
            "Published generation {} to {} subscribers ({} dropped)",
            snapshot.generation, report.delivered, report.dropped
        );
        report
    }

    /// Publish on every registry transition and on a heartbeat, whichever
    /// comes first. Closes all subscribers on shutdown.
    pub async fn run(self: Arc<Self>, mut shutdown_rx: watch::Receiver<bool>) {
        let heartbeat = self.config.heartbeat();
        let mut ticker = interval_at(Instant::now() + heartbeat, heartbeat);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // Subscribed at construction, so transitions before this point still count.
        let mut changes = self.changes.clone();

        info!("Starting broadcaster with heartbeat: {:?}", heartbeat);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    debug!("Heartbeat publish");
                }
                changed = changes.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    ticker.reset();
                }
                _ = shutdown::wait_for(&mut shutdown_rx) => break,
            }

            let snapshot = self.registry.snapshot();
            self.publish(&snapshot).await;
        }

        self.close_all();
    }

    /// Drop every subscriber channel; their `recv` returns `None` once drained.
    pub fn close_all(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let count = self.subscribers.len();
        self.subscribers.clear();
        self.report_count();
        info!("Broadcaster closed {} subscriber channels", count);
    }

    fn report_count(&self) {
        if let Some(metrics) = &self.metrics {
            metrics.update_subscribers(self.subscribers.len());
        }
    }
}

async fn deliver(
    tx: &mpsc::Sender<Arc<ServerMessage>>,
    message: Arc<ServerMessage>,
    deadline: Duration,
) -> Result<(), DeliveryError> {
    match timeout(deadline, tx.send(message)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(_)) => Err(DeliveryError::Closed),
        Err(_) => Err(DeliveryError::Timeout(deadline)),
    }
}
