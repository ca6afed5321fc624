//! Transfer events and the sinks that consume them.
//!
//! The transfer code calls [`EventSink::emit`] from whichever task is moving
//! the bytes. Sinks must not assume a particular thread; a UI shell that needs
//! its own dispatcher forwards events there itself (see [`ChannelSink`]).

use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use ferry_core::{ErrorKind, TransferError};

// ── Identifiers ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Outgoing,
    Incoming,
}

/// Process-unique id of one transfer. For incoming transfers the sequence
/// number is also the connection id used in destination file names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TransferId {
    pub direction: Direction,
    pub seq: u64,
}

static NEXT_OUTGOING: AtomicU64 = AtomicU64::new(1);
static NEXT_INCOMING: AtomicU64 = AtomicU64::new(1);

impl TransferId {
    pub fn next_outgoing() -> Self {
        Self {
            direction: Direction::Outgoing,
            seq: NEXT_OUTGOING.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn next_incoming() -> Self {
        Self {
            direction: Direction::Incoming,
            seq: NEXT_INCOMING.fetch_add(1, Ordering::Relaxed),
        }
    }
}

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.direction {
            Direction::Outgoing => write!(f, "out-{}", self.seq),
            Direction::Incoming => write!(f, "in-{}", self.seq),
        }
    }
}

// ── Events ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TransferEvent {
    /// Header known. For outgoing transfers `path` is the source, for
    /// incoming ones the destination.
    Started {
        id: TransferId,
        name: String,
        path: PathBuf,
        peer: String,
        total_bytes: u64,
    },

    /// Non-decreasing within one transfer. A zero-byte file reports 100
    /// right away.
    Progress {
        id: TransferId,
        percent: u8,
        bytes: u64,
    },

    /// Always follows the last `Progress`, including for empty files.
    Completed {
        id: TransferId,
        path: PathBuf,
        bytes: u64,
    },

    /// `path` is the source for outgoing transfers and the destination for
    /// incoming ones, when a transfer got far enough to have one.
    Failed {
        id: TransferId,
        path: Option<PathBuf>,
        kind: ErrorKind,
        message: String,
    },

    /// The accept loop ended, either through `stop()` or a fatal socket error.
    ListenerStopped {
        local_addr: SocketAddr,
        error: Option<String>,
    },
}

impl TransferEvent {
    pub fn failed(id: TransferId, path: Option<&Path>, err: &TransferError) -> Self {
        TransferEvent::Failed {
            id,
            path: path.map(Path::to_path_buf),
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    pub fn id(&self) -> Option<TransferId> {
        match self {
            TransferEvent::Started { id, .. }
            | TransferEvent::Progress { id, .. }
            | TransferEvent::Completed { id, .. }
            | TransferEvent::Failed { id, .. } => Some(*id),
            TransferEvent::ListenerStopped { .. } => None,
        }
    }
}

// ── Sinks ─────────────────────────────────────────────────────────────────────

/// Receives transfer events. Called concurrently from many transfers.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: TransferEvent);
}

pub type SharedSink = Arc<dyn EventSink>;

/// Discards everything.
pub struct NoopSink;

impl EventSink for NoopSink {
    fn emit(&self, _event: TransferEvent) {}
}

/// Forwards events into an unbounded channel.
#[derive(Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<TransferEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TransferEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: TransferEvent) {
        // Receiver gone means nobody is watching any more.
        let _ = self.tx.send(event);
    }
}

/// Writes events to the tracing log.
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: TransferEvent) {
        match event {
            TransferEvent::Started {
                id,
                name,
                path,
                peer,
                total_bytes,
            } => tracing::info!(
                %id,
                name,
                path = %path.display(),
                peer,
                total_bytes,
                "transfer started"
            ),
            TransferEvent::Progress { id, percent, bytes } => {
                tracing::debug!(%id, percent, bytes, "transfer progress")
            }
            TransferEvent::Completed { id, path, bytes } => {
                tracing::info!(%id, path = %path.display(), bytes, "transfer completed")
            }
            TransferEvent::Failed {
                id,
                path,
                kind,
                message,
            } => match path {
                Some(path) => {
                    tracing::warn!(%id, ?kind, path = %path.display(), error = message, "transfer failed")
                }
                None => tracing::warn!(%id, ?kind, error = message, "transfer failed"),
            },
            TransferEvent::ListenerStopped { local_addr, error } => match error {
                Some(error) => tracing::error!(%local_addr, error, "listener stopped"),
                None => tracing::info!(%local_addr, "listener stopped"),
            },
        }
    }
}

/// Delivers every event to each inner sink in order.
pub struct FanoutSink {
    sinks: Vec<SharedSink>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<SharedSink>) -> Self {
        Self { sinks }
    }
}

impl EventSink for FanoutSink {
    fn emit(&self, event: TransferEvent) {
        if let Some((last, rest)) = self.sinks.split_last() {
            for sink in rest {
                sink.emit(event.clone());
            }
            last.emit(event);
        }
    }
}
