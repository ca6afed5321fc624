//! Per-connection receive logic.
//!
//! One handler owns one accepted connection and walks it through
//! `AwaitingIdentifier → AwaitingSize → ReceivingPayload → Complete | Failed`.
//! Handlers share nothing with each other.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

use ferry_core::{wire, TransferError};

use crate::deadline::within;
use crate::event::{SharedSink, TransferEvent, TransferId};
use crate::naming;
use crate::progress::Progress;

/// Settings every handler of one listener shares.
#[derive(Debug, Clone)]
pub struct HandlerSettings {
    pub destination_dir: PathBuf,
    pub chunk_size: usize,
    pub io_timeout: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerState {
    AwaitingIdentifier,
    AwaitingSize,
    ReceivingPayload { expected: u64, received: u64 },
    Complete,
    Failed,
}

/// A fully received file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedFile {
    pub id: TransferId,
    /// Final segment of the sender's identifier.
    pub derived_name: String,
    pub destination_path: PathBuf,
    pub bytes_written: u64,
}

pub struct ConnectionHandler<S> {
    id: TransferId,
    peer: SocketAddr,
    stream: S,
    settings: Arc<HandlerSettings>,
    sink: SharedSink,
    state: HandlerState,
    /// Set once the destination file exists.
    destination: Option<PathBuf>,
}

impl<S> ConnectionHandler<S>
where
    S: AsyncRead + Unpin + Send,
{
    pub fn new(
        id: TransferId,
        peer: SocketAddr,
        stream: S,
        settings: Arc<HandlerSettings>,
        sink: SharedSink,
    ) -> Self {
        Self {
            id,
            peer,
            stream,
            settings,
            sink,
            state: HandlerState::AwaitingIdentifier,
            destination: None,
        }
    }

    pub fn state(&self) -> &HandlerState {
        &self.state
    }

    /// Receive one file and report the outcome to the sink.
    ///
    /// The connection is dropped when this returns, whatever the outcome.
    pub async fn run(mut self) -> Result<ReceivedFile, TransferError> {
        let result = self.receive().await;
        match &result {
            Ok(file) => {
                self.transition(HandlerState::Complete);
                tracing::info!(
                    id = %self.id,
                    peer = %self.peer,
                    name = %file.derived_name,
                    bytes = file.bytes_written,
                    path = %file.destination_path.display(),
                    "file received"
                );
                self.sink.emit(TransferEvent::Completed {
                    id: self.id,
                    path: file.destination_path.clone(),
                    bytes: file.bytes_written,
                });
            }
            Err(e) => {
                self.transition(HandlerState::Failed);
                tracing::warn!(id = %self.id, peer = %self.peer, error = %e, "receive failed");
                self.sink
                    .emit(TransferEvent::failed(self.id, self.destination.as_deref(), e));
            }
        }
        result
    }

    async fn receive(&mut self) -> Result<ReceivedFile, TransferError> {
        let io_timeout = self.settings.io_timeout;

        let identifier = within(
            io_timeout,
            "reading identifier",
            wire::read_identifier(&mut self.stream),
        )
        .await?;
        let derived_name = naming::base_name(&identifier);
        tracing::debug!(id = %self.id, identifier, derived_name, "identifier received");
        self.transition(HandlerState::AwaitingSize);

        let expected = within(io_timeout, "reading size", wire::read_size(&mut self.stream)).await?;

        let (destination_path, file) =
            naming::create_destination(&self.settings.destination_dir, self.id.seq, &derived_name)
                .await?;
        self.destination = Some(destination_path.clone());
        self.transition(HandlerState::ReceivingPayload {
            expected,
            received: 0,
        });
        self.sink.emit(TransferEvent::Started {
            id: self.id,
            name: derived_name.clone(),
            path: destination_path.clone(),
            peer: self.peer.to_string(),
            total_bytes: expected,
        });

        match self.receive_payload(file, &destination_path, expected).await {
            Ok(bytes_written) => Ok(ReceivedFile {
                id: self.id,
                derived_name,
                destination_path,
                bytes_written,
            }),
            Err(e) => {
                // Partial data is never presented as a received file.
                if let Err(rm) = tokio::fs::remove_file(&destination_path).await {
                    tracing::warn!(
                        path = %destination_path.display(),
                        error = %rm,
                        "failed to remove partial file"
                    );
                }
                Err(e)
            }
        }
    }

    async fn receive_payload(
        &mut self,
        mut file: File,
        path: &Path,
        expected: u64,
    ) -> Result<u64, TransferError> {
        let io_timeout = self.settings.io_timeout;
        let storage = |e: std::io::Error| TransferError::Storage {
            path: path.to_path_buf(),
            source: e,
        };

        let mut progress = Progress::new(expected);
        if let Some(percent) = progress.start() {
            self.emit_progress(percent, 0);
        }

        let mut buf = vec![0u8; self.settings.chunk_size.max(1)];
        while !progress.is_complete() {
            let want = progress.next_read_len(buf.len());
            let stream = &mut self.stream;
            let chunk = &mut buf[..want];
            let n = within(io_timeout, "reading payload", async move {
                stream
                    .read(chunk)
                    .await
                    .map_err(|e| TransferError::ConnectionReset { source: e })
            })
            .await?;

            if n == 0 {
                return Err(TransferError::TruncatedTransfer {
                    expected,
                    received: progress.done(),
                });
            }

            file.write_all(&buf[..n]).await.map_err(storage)?;
            let moved = progress.advance(n);
            self.state = HandlerState::ReceivingPayload {
                expected,
                received: progress.done(),
            };
            if let Some(percent) = moved {
                self.emit_progress(percent, progress.done());
            }
        }

        file.flush().await.map_err(storage)?;
        file.sync_all().await.map_err(storage)?;
        Ok(progress.done())
    }

    fn emit_progress(&self, percent: u8, bytes: u64) {
        self.sink.emit(TransferEvent::Progress {
            id: self.id,
            percent,
            bytes,
        });
    }

    fn transition(&mut self, next: HandlerState) {
        tracing::trace!(id = %self.id, from = ?self.state, to = ?next, "handler state");
        self.state = next;
    }
}
