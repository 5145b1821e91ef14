//! TCP listener for trapped connections.
//!
//! Accepts connections and hands each one to its own session task. The
//! accept loop never waits on a session, so a thousand held connections cost
//! the next one nothing.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tracing::{debug, error, info};

use crate::config::{Config, ProtocolType};
use crate::metrics::TarpitMetrics;
use crate::protocols::payload_for;
use crate::session::Session;

/// Listen backlog for the trap socket.
const LISTEN_BACKLOG: i32 = 1024;

/// Errors that keep a listener from starting.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to resolve '{addr}': {source}")]
    Resolve { addr: String, source: io::Error },
    #[error("'{0}' has no IPv4 address")]
    NoIpv4(String),
    #[error("failed to bind {addr}: {source}")]
    Bind { addr: String, source: io::Error },
}

/// Server instance
pub struct Server {
    listener: TcpListener,
    protocol: ProtocolType,
    interval: Duration,
    metrics: Arc<TarpitMetrics>,
}

impl Server {
    /// Bind the trap listener. Any failure here is fatal to the process.
    pub async fn bind(config: &Config, metrics: Arc<TarpitMetrics>) -> Result<Self, ServerError> {
        let addr = resolve_ipv4(&config.listen).await?;
        let listener = create_listener(addr)
            .and_then(TcpListener::from_std)
            .map_err(|source| ServerError::Bind {
                addr: config.listen.clone(),
                source,
            })?;

        Ok(Server {
            listener,
            protocol: config.protocol,
            interval: config.interval,
            metrics,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until shutdown is signalled.
    pub async fn run(self, shutdown: broadcast::Sender<()>) {
        let mut shutdown_rx = shutdown.subscribe();
        if let Ok(addr) = self.local_addr() {
            info!(address = %addr, protocol = %self.protocol, "Server listening");
        }

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Listener shutting down");
                    return;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => self.spawn_session(stream, peer, &shutdown),
                    Err(e) => error!(error = %e, "Failed to accept connection"),
                },
            }
        }
    }

    fn spawn_session(&self, stream: TcpStream, peer: SocketAddr, shutdown: &broadcast::Sender<()>) {
        debug!(peer = %peer, "New connection");

        let session = Session::new(stream, peer, payload_for(self.protocol), self.interval);
        let metrics = Arc::clone(&self.metrics);
        let shutdown_rx = shutdown.subscribe();

        tokio::spawn(async move {
            let summary = session.run(&metrics, shutdown_rx).await;
            info!(
                peer = %summary.peer,
                started_at = %summary.started_at.to_rfc3339(),
                lifetime_secs = summary.lifetime.as_secs_f64(),
                bytes_sent = summary.bytes_sent,
                reason = %summary.reason,
                "Connection released"
            );
        });
    }
}

/// Resolve `addr` and keep the first IPv4 candidate.
async fn resolve_ipv4(addr: &str) -> Result<SocketAddr, ServerError> {
    let mut candidates =
        tokio::net::lookup_host(addr)
            .await
            .map_err(|source| ServerError::Resolve {
                addr: addr.to_string(),
                source,
            })?;

    candidates
        .find(SocketAddr::is_ipv4)
        .ok_or_else(|| ServerError::NoIpv4(addr.to_string()))
}

/// Create an IPv4 TCP listener with SO_REUSEADDR so restarts don't wait out
/// TIME_WAIT on a port full of trapped peers.
fn create_listener(addr: SocketAddr) -> io::Result<std::net::TcpListener> {
    let socket = socket2::Socket::new(
        socket2::Domain::IPV4,
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;

    Ok(socket.into())
}
