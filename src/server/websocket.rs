// src/server/websocket.rs
use crate::broadcast::Broadcaster;
use crate::server::listener::{accepted, bind_tcp, ACCEPT_ERROR_DELAY};
use crate::shutdown;
use anyhow::Result;
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tracing::{error, info, warn};

/// Accepts stream clients and wires each one to a broadcaster subscription.
pub struct WebSocketServer {
    listener: TcpListener,
    broadcaster: Arc<Broadcaster>,
    write_timeout: Duration,
}

impl WebSocketServer {
    pub async fn bind(
        addr: SocketAddr,
        broadcaster: Arc<Broadcaster>,
        write_timeout: Duration,
    ) -> Result<Self> {
        let listener = bind_tcp(addr).await?;
        Ok(Self {
            listener,
            broadcaster,
            write_timeout,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub async fn serve(self, mut shutdown_rx: watch::Receiver<bool>) -> Result<()> {
        info!("WebSocket server listening on {}", self.local_addr()?);

        loop {
            let (stream, peer) = tokio::select! {
                result = self.listener.accept() => match accepted(result, "WebSocket") {
                    Some(conn) => conn,
                    None => {
                        tokio::time::sleep(ACCEPT_ERROR_DELAY).await;
                        continue;
                    }
                },
                _ = shutdown::wait_for(&mut shutdown_rx) => break,
            };

            let broadcaster = self.broadcaster.clone();
            let write_timeout = self.write_timeout;
            tokio::spawn(async move {
                handle_connection(stream, peer, broadcaster, write_timeout).await;
            });
        }

        info!("WebSocket server stopped accepting connections");
        Ok(())
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    broadcaster: Arc<Broadcaster>,
    write_timeout: Duration,
) {
    let ws = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!(%peer, "WebSocket handshake failed: {}", e);
            return;
        }
    };

    let mut subscription = broadcaster.subscribe();
    let id = subscription.id();
    info!(%peer, subscriber = %id, "WebSocket client connected");

    let (mut sink, mut incoming) = ws.split();

    loop {
        tokio::select! {
            update = subscription.recv() => {
                let Some(update) = update else {
                    // Dropped by the broadcaster (shutdown or failed delivery).
                    let _ = timeout(write_timeout, sink.send(Message::Close(None))).await;
                    break;
                };

                let text = match serde_json::to_string(&*update) {
                    Ok(text) => text,
                    Err(e) => {
                        error!("Failed to encode monitoring update: {}", e);
                        continue;
                    }
                };

                match timeout(write_timeout, sink.send(Message::Text(text))).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        warn!(%peer, "WebSocket error: {}", e);
                        break;
                    }
                    Err(_) => {
                        warn!(%peer, "WebSocket write exceeded {:?}", write_timeout);
                        break;
                    }
                }
            }
            frame = incoming.next() => match frame {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(%peer, "WebSocket error: {}", e);
                    break;
                }
            },
        }
    }

    broadcaster.unsubscribe(&id);
    info!(%peer, subscriber = %id, "WebSocket client disconnected");
}
