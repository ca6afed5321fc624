//! Listener behaviour when the process runs out of file descriptors.
//!
//! Lives in its own test binary because it lowers `RLIMIT_NOFILE` for the
//! whole process.
//!
//!   cargo test --test descriptor_pressure

#![cfg(unix)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, ensure, Context, Result};
use tokio::net::TcpStream;

use ferry_services::{
    ChannelSink, Listener, ListenerConfig, Sender, SenderConfig, TransferEvent,
};

const WAIT: Duration = Duration::from_secs(30);

fn lower_descriptor_limit(soft: libc::rlim_t) -> std::io::Result<()> {
    let mut limit = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    // SAFETY: `limit` is a valid, writable rlimit for the duration of the call.
    if unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, &mut limit) } != 0 {
        return Err(std::io::Error::last_os_error());
    }
    limit.rlim_cur = soft.min(limit.rlim_max);
    // SAFETY: `limit` is a valid rlimit.
    if unsafe { libc::setrlimit(libc::RLIMIT_NOFILE, &limit) } != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn listener_survives_running_out_of_descriptors() -> Result<()> {
    let root = std::env::temp_dir().join(format!("ferry-it-fds-{}", std::process::id()));
    let dest = root.join("dest");
    let source = root.join("after.bin");
    std::fs::create_dir_all(&dest)?;
    let payload: Vec<u8> = (0..20_000u32).map(|i| (i % 251) as u8).collect();
    std::fs::write(&source, &payload)?;

    let (sink, mut events) = ChannelSink::new();
    let config = ListenerConfig {
        bind_addr: "127.0.0.1:0".to_string(),
        destination_dir: dest.clone(),
        io_timeout: None,
        ..ListenerConfig::default()
    };
    let listener = Listener::start(config, Arc::new(sink)).await?;
    let addr = listener.local_addr();

    lower_descriptor_limit(128)?;

    // Header-less connections pin a descriptor on both ends until the
    // process can open no more.
    let mut held = Vec::new();
    let mut exhausted = false;
    for _ in 0..1024 {
        match tokio::time::timeout(Duration::from_secs(2), TcpStream::connect(addr)).await {
            Ok(Ok(conn)) => held.push(conn),
            Ok(Err(_)) | Err(_) => {
                exhausted = true;
                break;
            }
        }
    }
    ensure!(exhausted, "descriptor limit never reached");

    // Well past what a fixed error budget would have tolerated.
    tokio::time::sleep(Duration::from_secs(5)).await;
    ensure!(listener.is_running(), "listener gave up while starved of descriptors");

    drop(held);

    // Descriptors come back as the stalled handlers see end of stream.
    let (sent_sink, _sent) = ChannelSink::new();
    let sender = Sender::new(SenderConfig::default(), Arc::new(sent_sink));
    let deadline = tokio::time::Instant::now() + WAIT;
    loop {
        match sender.send_file(&source, "127.0.0.1", addr.port()).await {
            Ok(_) => break,
            Err(_) if tokio::time::Instant::now() < deadline => {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
            Err(e) => bail!("no transfer got through after descriptors were released: {e}"),
        }
    }

    let stored = loop {
        let event = tokio::time::timeout(WAIT, events.recv())
            .await
            .context("timed out waiting for the transfer")?
            .context("event channel closed")?;
        match event {
            TransferEvent::Completed { path, .. } => break path,
            TransferEvent::ListenerStopped { error, .. } => {
                bail!("listener stopped: {error:?}")
            }
            _ => {}
        }
    };
    ensure!(std::fs::read(&stored)? == payload, "received bytes differ");
    ensure!(listener.is_running());

    listener.stop().await?;
    let _ = std::fs::remove_dir_all(&root);
    Ok(())
}
