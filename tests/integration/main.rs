//! Ferry integration test harness.
//!
//! Every test runs a real listener and real senders over loopback on an
//! ephemeral port, writing into its own directory under the system temp dir.
//! Nothing here needs root or a running ferryd.
//!
//!   cargo test --test integration

mod concurrency;
mod transfer;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::sync::mpsc::UnboundedReceiver;

use ferry_services::{
    ChannelSink, Direction, Listener, ListenerConfig, ListenerHandle, Sender, SenderConfig,
    TransferEvent,
};

// ── Harness ───────────────────────────────────────────────────────────────────

/// Upper bound for anything a test waits on.
pub const WAIT: Duration = Duration::from_secs(30);

/// A scratch directory removed on drop.
pub struct TestDir {
    path: PathBuf,
}

impl TestDir {
    pub fn new(tag: &str) -> Self {
        static NEXT: AtomicU32 = AtomicU32::new(0);
        let path = std::env::temp_dir().join(format!(
            "ferry-it-{tag}-{}-{}",
            std::process::id(),
            NEXT.fetch_add(1, Ordering::Relaxed)
        ));
        let _ = std::fs::remove_dir_all(&path);
        std::fs::create_dir_all(&path).expect("create test dir");
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write a source file and return its path.
    pub fn file(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.path.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create parent");
        }
        std::fs::write(&path, contents).expect("write source file");
        path
    }

    /// Names of the files currently in the directory, sorted.
    pub fn entries(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(&self.path)
            .map(|rd| {
                rd.filter_map(|e| e.ok())
                    .map(|e| e.file_name().to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }
}

impl Drop for TestDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.path);
    }
}

/// Deterministic, non-repeating-looking test payload.
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len)
        .map(|i| (i.wrapping_mul(31) ^ (i >> 8)) as u8)
        .collect()
}

pub fn loopback_config(dest: &Path) -> ListenerConfig {
    ListenerConfig {
        bind_addr: "127.0.0.1:0".to_string(),
        destination_dir: dest.to_path_buf(),
        ..ListenerConfig::default()
    }
}

/// Start a loopback listener whose events land in the returned channel.
pub async fn start_listener(
    config: ListenerConfig,
) -> Result<(ListenerHandle, UnboundedReceiver<TransferEvent>)> {
    let (sink, rx) = ChannelSink::new();
    let handle = Listener::start(config, Arc::new(sink))
        .await
        .context("listener failed to start")?;
    Ok((handle, rx))
}

pub fn sender() -> (Sender, UnboundedReceiver<TransferEvent>) {
    let (sink, rx) = ChannelSink::new();
    (Sender::new(SenderConfig::default(), Arc::new(sink)), rx)
}

pub fn is_terminal(event: &TransferEvent) -> bool {
    matches!(
        event,
        TransferEvent::Completed { .. } | TransferEvent::Failed { .. }
    )
}

/// Collect events until `count` transfers have completed or failed.
pub async fn collect_terminal(
    rx: &mut UnboundedReceiver<TransferEvent>,
    count: usize,
) -> Result<Vec<TransferEvent>> {
    let mut events = Vec::new();
    let mut terminal = 0;
    while terminal < count {
        let event = tokio::time::timeout(WAIT, rx.recv())
            .await
            .with_context(|| format!("only {terminal} of {count} transfers finished in time"))?
            .context("event channel closed")?;
        if is_terminal(&event) {
            terminal += 1;
        }
        events.push(event);
    }
    Ok(events)
}

/// Wait for the first event matching `pred`.
pub async fn wait_for<F>(rx: &mut UnboundedReceiver<TransferEvent>, pred: F) -> Result<TransferEvent>
where
    F: Fn(&TransferEvent) -> bool,
{
    loop {
        let event = tokio::time::timeout(WAIT, rx.recv())
            .await
            .context("timed out waiting for event")?
            .context("event channel closed")?;
        if pred(&event) {
            return Ok(event);
        }
    }
}

/// Progress percentages reported for incoming transfers, in order.
pub fn incoming_percents(events: &[TransferEvent]) -> Vec<u8> {
    events
        .iter()
        .filter_map(|e| match e {
            TransferEvent::Progress { id, percent, .. } if id.direction == Direction::Incoming => {
                Some(*percent)
            }
            _ => None,
        })
        .collect()
}

/// Destination path of the single completed incoming transfer.
pub fn completed_path(events: &[TransferEvent]) -> Result<PathBuf> {
    let paths: Vec<&PathBuf> = events
        .iter()
        .filter_map(|e| match e {
            TransferEvent::Completed { path, .. } => Some(path),
            _ => None,
        })
        .collect();
    match paths.as_slice() {
        [one] => Ok((*one).clone()),
        other => bail!("expected one completed transfer, got {}", other.len()),
    }
}

/// Poll `cond` until it holds or `WAIT` runs out.
pub async fn eventually<F: Fn() -> bool>(what: &str, cond: F) -> Result<()> {
    let deadline = tokio::time::Instant::now() + WAIT;
    while !cond() {
        if tokio::time::Instant::now() > deadline {
            bail!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    Ok(())
}
