// src/server/listener.rs
// Encapsulates low-level TCP bind and accept so both listeners share it.
use anyhow::{Context, Result};
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};

/// Pause after a failed accept so fd exhaustion does not spin the loop.
pub const ACCEPT_ERROR_DELAY: Duration = Duration::from_millis(100);

pub async fn bind_tcp(addr: SocketAddr) -> Result<TcpListener> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    Ok(listener)
}

/// Accept errors (EMFILE, ECONNABORTED, ...) concern one connection, not the
/// listener: log them and let the caller keep accepting.
pub fn accepted(
    result: io::Result<(TcpStream, SocketAddr)>,
    server: &str,
) -> Option<(TcpStream, SocketAddr)> {
    match result {
        Ok(conn) => Some(conn),
        Err(e) => {
            tracing::warn!("{} accept failed: {}", server, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accept_error_is_not_fatal() {
        let emfile = io::Error::from_raw_os_error(24);
        assert!(accepted(Err(emfile), "HTTP").is_none());

        let aborted = io::Error::from(io::ErrorKind::ConnectionAborted);
        assert!(accepted(Err(aborted), "WebSocket").is_none());
    }

    #[tokio::test]
    async fn test_accepted_passes_connections_through() {
        let listener = bind_tcp("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let addr = listener.local_addr().unwrap();

        let client = tokio::spawn(TcpStream::connect(addr));
        let conn = accepted(listener.accept().await, "HTTP");
        client.await.unwrap().unwrap();

        let (_, peer) = conn.unwrap();
        assert_eq!(peer.ip(), addr.ip());
    }
}
