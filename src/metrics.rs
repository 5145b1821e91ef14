//! Connection accounting for the tarpit.
//!
//! All four quantities live in a `prometheus::Registry` owned by
//! `TarpitMetrics`, which is shared by handle between the acceptor, every
//! session and the exporter. Updates are atomic and lock-free, so any number
//! of sessions may record concurrently.
//!
//! | Metric                            | Type    | Updated                 |
//! |-----------------------------------|---------|-------------------------|
//! | `tarpit_<proto>_conn_active_count`| gauge   | +1 start, -1 end        |
//! | `tarpit_<proto>_conn_total_count` | counter | +1 per finished session |
//! | `tarpit_<proto>_conn_lifetime`    | gauge   | overwritten at end      |
//! | `tarpit_<proto>_conn_bytes_sent`  | counter | + bytes per write       |

use prometheus::{Encoder, Gauge, IntCounter, IntGauge, Opts, Registry, TextEncoder};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

use crate::config::ProtocolType;

const NAMESPACE: &str = "tarpit";

/// Errors from building or encoding the metrics registry.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("metrics registry error: {0}")]
    Prometheus(#[from] prometheus::Error),
    #[error("metrics output is not valid UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
}

/// Point-in-time copy of the four tarpit quantities.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricsSnapshot {
    pub active_connections: i64,
    pub total_connections: u64,
    pub last_lifetime_secs: f64,
    pub bytes_sent: u64,
}

/// Shared metrics sink.
pub struct TarpitMetrics {
    registry: Registry,
    active: IntGauge,
    total: IntCounter,
    lifetime: Gauge,
    bytes_sent: IntCounter,
}

impl TarpitMetrics {
    /// Create and register the metrics for one protocol listener.
    pub fn new(protocol: ProtocolType) -> Result<Arc<Self>, MetricsError> {
        let registry = Registry::new();
        let opts = |name: &str, help: &str| {
            Opts::new(name, help)
                .namespace(NAMESPACE)
                .subsystem(protocol.name())
        };

        let active = IntGauge::with_opts(opts(
            "conn_active_count",
            "Number of connections currently held open.",
        ))?;
        let total = IntCounter::with_opts(opts(
            "conn_total_count",
            "Number of connections that have been held and released.",
        ))?;
        let lifetime = Gauge::with_opts(opts(
            "conn_lifetime",
            "Lifetime in seconds of the most recently released connection.",
        ))?;
        let bytes_sent = IntCounter::with_opts(opts(
            "conn_bytes_sent",
            "Bytes written to trapped connections.",
        ))?;

        registry.register(Box::new(active.clone()))?;
        registry.register(Box::new(total.clone()))?;
        registry.register(Box::new(lifetime.clone()))?;
        registry.register(Box::new(bytes_sent.clone()))?;

        #[cfg(target_os = "linux")]
        registry.register(Box::new(
            prometheus::process_collector::ProcessCollector::for_self(),
        ))?;

        Ok(Arc::new(Self {
            registry,
            active,
            total,
            lifetime,
            bytes_sent,
        }))
    }

    /// Mark a session as started. The returned guard finishes the accounting
    /// when dropped, on whatever path the session exits.
    pub fn session_started(self: &Arc<Self>) -> SessionGuard {
        self.active.inc();
        SessionGuard {
            metrics: Arc::clone(self),
            started: Instant::now(),
        }
    }

    /// Count bytes accepted by a single write call.
    pub fn record_bytes_sent(&self, n: usize) {
        self.bytes_sent.inc_by(n as u64);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            active_connections: self.active.get(),
            total_connections: self.total.get(),
            last_lifetime_secs: self.lifetime.get(),
            bytes_sent: self.bytes_sent.get(),
        }
    }

    /// Encode every registered metric in the Prometheus text format.
    pub fn gather(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }

    fn session_finished(&self, lifetime: Duration) {
        self.active.dec();
        self.total.inc();
        self.lifetime.set(lifetime.as_secs_f64());
    }
}

/// Accounting handle for one live session.
pub struct SessionGuard {
    metrics: Arc<TarpitMetrics>,
    started: Instant,
}

impl SessionGuard {
    /// Time since the session started.
    pub fn lifetime(&self) -> Duration {
        self.started.elapsed()
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.metrics.session_finished(self.lifetime());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_snapshot() {
        let metrics = TarpitMetrics::new(ProtocolType::Ssh).unwrap();
        let snapshot = metrics.snapshot();

        assert_eq!(snapshot.active_connections, 0);
        assert_eq!(snapshot.total_connections, 0);
        assert_eq!(snapshot.last_lifetime_secs, 0.0);
        assert_eq!(snapshot.bytes_sent, 0);
    }

    #[tokio::test]
    async fn test_guard_tracks_active_and_total() {
        let metrics = TarpitMetrics::new(ProtocolType::Ssh).unwrap();

        let first = metrics.session_started();
        let second = metrics.session_started();
        assert_eq!(metrics.snapshot().active_connections, 2);
        assert_eq!(metrics.snapshot().total_connections, 0);

        drop(first);
        assert_eq!(metrics.snapshot().active_connections, 1);
        assert_eq!(metrics.snapshot().total_connections, 1);

        drop(second);
        assert_eq!(metrics.snapshot().active_connections, 0);
        assert_eq!(metrics.snapshot().total_connections, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lifetime_overwritten_not_summed() {
        let metrics = TarpitMetrics::new(ProtocolType::Http).unwrap();

        let guard = metrics.session_started();
        tokio::time::advance(Duration::from_secs(5)).await;
        drop(guard);
        assert_eq!(metrics.snapshot().last_lifetime_secs, 5.0);

        let guard = metrics.session_started();
        tokio::time::advance(Duration::from_secs(2)).await;
        drop(guard);
        assert_eq!(metrics.snapshot().last_lifetime_secs, 2.0);
    }

    #[test]
    fn test_bytes_sent_accumulates() {
        let metrics = TarpitMetrics::new(ProtocolType::Ssh).unwrap();
        metrics.record_bytes_sent(252);
        metrics.record_bytes_sent(0);
        metrics.record_bytes_sent(17);
        assert_eq!(metrics.snapshot().bytes_sent, 269);
    }

    #[test]
    fn test_gather_uses_protocol_names() {
        let metrics = TarpitMetrics::new(ProtocolType::Http).unwrap();
        metrics.record_bytes_sent(17);

        let text = metrics.gather().unwrap();
        assert!(text.contains("tarpit_http_conn_active_count 0"));
        assert!(text.contains("tarpit_http_conn_total_count 0"));
        assert!(text.contains("tarpit_http_conn_lifetime 0"));
        assert!(text.contains("tarpit_http_conn_bytes_sent 17"));
        assert!(!text.contains("tarpit_ssh_"));
    }

    #[test]
    fn test_registries_are_independent() {
        let ssh = TarpitMetrics::new(ProtocolType::Ssh).unwrap();
        let other = TarpitMetrics::new(ProtocolType::Ssh).unwrap();

        let _guard = ssh.session_started();
        assert_eq!(ssh.snapshot().active_connections, 1);
        assert_eq!(other.snapshot().active_connections, 0);
    }
}
