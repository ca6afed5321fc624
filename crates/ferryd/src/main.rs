//! ferryd: receives files over TCP and serves a local status API.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use ferry_core::config::FerryConfig;
use ferry_services::{
    FanoutSink, Listener, ListenerConfig, LogSink, Sender, SenderConfig, SharedSink,
    TransferRegistry,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config: explicit path argument, else the usual lookup.
    let config = match std::env::args().nth(1) {
        Some(path) => FerryConfig::from_file(path.as_ref())
            .with_context(|| format!("failed to load config from {path}"))?,
        None => {
            if let Err(e) = FerryConfig::write_default_if_missing() {
                tracing::warn!(error = %e, "failed to write default config");
            }
            FerryConfig::load().unwrap_or_else(|e| {
                tracing::warn!(error = %e, "failed to load config, using defaults");
                FerryConfig::default()
            })
        }
    };
    tracing::info!(
        listen = %config.listen_addr(),
        destination = %config.receiver.destination_dir.display(),
        workers = config.receiver.workers,
        "ferryd starting"
    );

    // Events go to the log and to the registry behind the API.
    let registry = TransferRegistry::with_history_limit(config.transfer.history_limit);
    let sink: SharedSink = Arc::new(FanoutSink::new(vec![
        Arc::new(LogSink),
        Arc::new(registry.clone()),
    ]));

    let listener = Listener::start(ListenerConfig::from(&config), sink.clone())
        .await
        .context("failed to start listener")?;

    // ── Shutdown channel ─────────────────────────────────────────────────────
    // Subscribed before the signal task exists, so an early ctrl-c is not lost.
    let (shutdown_tx, mut shutdown_rx) = broadcast::channel::<()>(1);
    forward_signal(
        async {
            tokio::signal::ctrl_c().await.ok();
        },
        shutdown_tx.clone(),
    );

    // ── Status API ───────────────────────────────────────────────────────────
    let api_port = config.network.api_port;
    if api_port > 0 {
        let state = ferry_api::ApiState {
            registry: registry.clone(),
            sender: Sender::new(SenderConfig::from(&config), sink),
            listen_addr: listener.local_addr(),
            destination_dir: config.receiver.destination_dir.clone(),
            pool: listener.pool_stats(),
            shutdown_tx: shutdown_tx.clone(),
        };
        tokio::spawn(async move {
            if let Err(e) = ferry_api::serve(state, api_port).await {
                tracing::error!(error = %e, "status server failed");
            }
        });
    } else {
        tracing::info!("status API disabled");
    }

    let stats_printer = {
        let registry = registry.clone();
        let pool = listener.pool_stats();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(30));
            loop {
                interval.tick().await;
                let counts = registry.counts();
                tracing::debug!(
                    busy = pool.busy(),
                    queued = pool.queued(),
                    active = counts.active,
                    completed = counts.completed,
                    failed = counts.failed,
                    "transfer stats"
                );
            }
        })
    };

    // ── Wait for exit ────────────────────────────────────────────────────────

    tokio::select! {
        _ = shutdown_rx.recv()  => tracing::info!("shutting down"),
        _ = listener.stopped()  => tracing::error!("listener exited"),
    }

    stats_printer.abort();
    // In-flight transfers finish before this returns.
    listener.stop().await.context("listener failed")?;
    tracing::info!("ferryd stopped");
    Ok(())
}

/// Broadcast a shutdown once `signal` resolves.
fn forward_signal<F>(signal: F, shutdown: broadcast::Sender<()>) -> JoinHandle<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        signal.await;
        tracing::info!("shutdown signal received");
        let _ = shutdown.send(());
    })
}
