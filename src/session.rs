//! Lifecycle of one trapped connection.
//!
//! A session moves through `Starting -> Greeting -> Dripping -> Closed`:
//!
//! - **Starting**: the metrics guard is taken and the active gauge goes up.
//! - **Greeting**: protocols that greet write their first chunk at once.
//! - **Dripping**: wait one interval, write one chunk, repeat. There is no
//!   limit on how long this lasts.
//! - **Closed**: reached on the first failed write or on shutdown. The guard
//!   and the stream are dropped, which finishes the accounting and closes the
//!   socket on every exit path, including task cancellation.
//!
//! The session never reads. Whatever the client sends is left in the kernel
//! buffer and discarded with the socket.

use chrono::{DateTime, Utc};
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::drip::Drip;
use crate::metrics::TarpitMetrics;
use crate::protocols::PayloadSource;

/// Why a session ended.
#[derive(Debug)]
pub enum CloseReason {
    /// A write returned an error or accepted nothing.
    WriteFailed(io::Error),
    /// The process is shutting down.
    Shutdown,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::WriteFailed(e) => write!(f, "write failed: {e}"),
            CloseReason::Shutdown => f.write_str("shutdown"),
        }
    }
}

/// What a finished session reports back.
#[derive(Debug)]
pub struct SessionSummary {
    pub peer: SocketAddr,
    pub started_at: DateTime<Utc>,
    pub lifetime: Duration,
    pub bytes_sent: u64,
    pub reason: CloseReason,
}

/// One accepted connection and everything needed to drip into it.
pub struct Session<S> {
    peer: SocketAddr,
    stream: S,
    payload: Box<dyn PayloadSource>,
    interval: Duration,
}

impl<S> Session<S>
where
    S: AsyncWrite + Unpin + Send,
{
    pub fn new(
        stream: S,
        peer: SocketAddr,
        payload: Box<dyn PayloadSource>,
        interval: Duration,
    ) -> Self {
        Self {
            peer,
            stream,
            payload,
            interval,
        }
    }

    /// Hold the connection until a write fails or shutdown is signalled.
    pub async fn run(
        self,
        metrics: &Arc<TarpitMetrics>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> SessionSummary {
        let Session {
            peer,
            mut stream,
            mut payload,
            interval,
        } = self;

        let guard = metrics.session_started();
        let started_at = Utc::now();
        info!(peer = %peer, "Handling connection");

        let mut bytes_sent = 0u64;
        let reason = tokio::select! {
            _ = shutdown.recv() => CloseReason::Shutdown,
            reason = drip_loop(&mut stream, payload.as_mut(), interval, metrics, &mut bytes_sent) => reason,
        };

        let lifetime = guard.lifetime();
        drop(guard);
        drop(stream);

        SessionSummary {
            peer,
            started_at,
            lifetime,
            bytes_sent,
            reason,
        }
    }
}

/// Greeting and dripping. Only returns once a write fails.
async fn drip_loop<S>(
    stream: &mut S,
    payload: &mut dyn PayloadSource,
    interval: Duration,
    metrics: &TarpitMetrics,
    bytes_sent: &mut u64,
) -> CloseReason
where
    S: AsyncWrite + Unpin,
{
    let mut first = true;

    if payload.greets() {
        let chunk = payload.next_chunk(true);
        if let Err(e) = write_chunk(stream, &chunk, metrics, bytes_sent).await {
            return CloseReason::WriteFailed(e);
        }
        first = false;
    }

    let mut drip = Drip::new(interval);
    loop {
        drip.next_interval().await;

        let chunk = payload.next_chunk(first);
        first = false;

        if let Err(e) = write_chunk(stream, &chunk, metrics, bytes_sent).await {
            return CloseReason::WriteFailed(e);
        }
    }
}

/// A single write attempt. Whatever the kernel accepts is counted; a short
/// write is not topped up.
async fn write_chunk<S>(
    stream: &mut S,
    chunk: &[u8],
    metrics: &TarpitMetrics,
    bytes_sent: &mut u64,
) -> io::Result<usize>
where
    S: AsyncWrite + Unpin,
{
    let n = stream.write(chunk).await?;
    if n == 0 {
        return Err(io::ErrorKind::WriteZero.into());
    }

    metrics.record_bytes_sent(n);
    *bytes_sent += n as u64;
    debug!(bytes = n, "Dripped chunk");
    Ok(n)
}
