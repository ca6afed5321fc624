//! Transfer errors shared by the sender, the listener and the handlers.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::wire::{Frame, WireError};

/// Coarse classification of a [`TransferError`], stable enough to put in
/// events and API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    FileNotReadable,
    Bind,
    InvalidTarget,
    ConnectionRefused,
    ConnectionReset,
    TruncatedTransfer,
    MalformedFrame,
    TimedOut,
    Storage,
    PoolSaturated,
}

/// A failed transfer. Terminal for the unit of work that produced it; there
/// is no retry.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("cannot read {}: {source}", path.display())]
    FileNotReadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("invalid target {target:?}: no host given")]
    InvalidTarget { target: String },

    #[error("failed to connect to {addr}: {source}")]
    ConnectionRefused {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("connection reset: {source}")]
    ConnectionReset {
        #[source]
        source: io::Error,
    },

    #[error("transfer truncated: received {received} of {expected} bytes")]
    TruncatedTransfer { expected: u64, received: u64 },

    #[error("malformed frame: {0}")]
    MalformedFrame(#[from] WireError),

    #[error("timed out {stage} after {}s", timeout.as_secs())]
    TimedOut {
        stage: &'static str,
        timeout: Duration,
    },

    #[error("cannot write {}: {source}", path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("worker pool saturated: {queued} connections already queued")]
    PoolSaturated { queued: usize },
}

impl TransferError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransferError::FileNotReadable { .. } => ErrorKind::FileNotReadable,
            TransferError::Bind { .. } => ErrorKind::Bind,
            TransferError::InvalidTarget { .. } => ErrorKind::InvalidTarget,
            TransferError::ConnectionRefused { .. } => ErrorKind::ConnectionRefused,
            TransferError::ConnectionReset { .. } => ErrorKind::ConnectionReset,
            TransferError::TruncatedTransfer { .. } => ErrorKind::TruncatedTransfer,
            TransferError::MalformedFrame(_) => ErrorKind::MalformedFrame,
            TransferError::TimedOut { .. } => ErrorKind::TimedOut,
            TransferError::Storage { .. } => ErrorKind::Storage,
            TransferError::PoolSaturated { .. } => ErrorKind::PoolSaturated,
        }
    }

    /// Classify an I/O error hit while reading a header frame.
    pub fn from_frame_read(frame: Frame, e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            TransferError::MalformedFrame(WireError::UnexpectedEof(frame))
        } else {
            TransferError::ConnectionReset { source: e }
        }
    }
}
