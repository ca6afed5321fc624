//! Foreground receiver.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};

use ferry_core::config::FerryConfig;
use ferry_services::{ChannelSink, FanoutSink, Listener, ListenerConfig, LogSink};

use super::progress::print_events;

pub struct ListenOptions {
    pub port: Option<u16>,
    pub dir: Option<PathBuf>,
    pub workers: Option<usize>,
}

/// Receive files until ctrl-c, then let running transfers finish.
pub async fn cmd_listen(opts: ListenOptions) -> Result<()> {
    let mut config = FerryConfig::load().unwrap_or_default();
    if let Some(port) = opts.port {
        config.network.listen_port = port;
    }
    if let Some(dir) = opts.dir {
        config.receiver.destination_dir = dir;
    }
    if let Some(workers) = opts.workers {
        config.receiver.workers = workers;
    }

    let (sink, rx) = ChannelSink::new();
    let printer = tokio::spawn(print_events(rx, false));

    let listener = Listener::start(
        ListenerConfig::from(&config),
        Arc::new(FanoutSink::new(vec![Arc::new(LogSink), Arc::new(sink)])),
    )
    .await
    .context("failed to start listener")?;
    println!(
        "Receiving on {} into {} (ctrl-c to stop)",
        listener.local_addr(),
        config.receiver.destination_dir.display()
    );

    tokio::select! {
        _ = tokio::signal::ctrl_c() => println!("stopping, waiting for running transfers"),
        _ = listener.stopped() => {}
    }

    let result = listener.stop().await;
    // The listener owned the last sink, so the printer drains and exits.
    printer.await?;
    result.context("listener failed")
}
