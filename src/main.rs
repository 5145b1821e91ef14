//! tarpit: holds scanner connections open for as long as they'll stay.
//!
//! Accepts TCP connections and never completes a real protocol exchange.
//! Every connection gets a small chunk of plausible bytes on a fixed
//! cadence, so clients waiting for the rest of the handshake wait forever.
//!
//! Features:
//! - SSH mode: an endless pre-banner line
//! - HTTP mode: a status line and an endless stream of random headers
//! - Prometheus metrics for held, released and total connections
//! - Configuration via CLI arguments or TOML file

mod config;
mod drip;
mod metrics;
mod metrics_server;
mod protocols;
mod server;
mod session;

use config::Config;
use metrics::TarpitMetrics;
use server::Server;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        listen = %config.listen,
        protocol = %config.protocol,
        metrics_listen = %config.metrics_listen,
        interval_ms = config.interval.as_millis() as u64,
        workers = ?config.workers,
        "Starting tarpit"
    );

    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    if let Some(workers) = config.workers {
        builder.worker_threads(workers);
    }
    let runtime = builder.build()?;

    runtime.block_on(run(config))
}

async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let metrics = TarpitMetrics::new(config.protocol)?;

    // Both listeners are bound before anything is served.
    let server = Server::bind(&config, Arc::clone(&metrics)).await?;
    let metrics_listener = metrics_server::bind(&config.metrics_listen).await?;

    let (shutdown_tx, _) = broadcast::channel(1);

    let exporter = tokio::spawn(metrics_server::serve(
        metrics_listener,
        Arc::clone(&metrics),
        shutdown_tx.subscribe(),
    ));

    let signal_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown signal received");
        // Every receiver may already be gone if the listener exited first.
        let _ = signal_tx.send(());
    });

    server.run(shutdown_tx).await;
    exporter.await?;

    let snapshot = metrics.snapshot();
    info!(
        active_connections = snapshot.active_connections,
        total_connections = snapshot.total_connections,
        last_lifetime_secs = snapshot.last_lifetime_secs,
        bytes_sent = snapshot.bytes_sent,
        "Tarpit stopped"
    );
    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
