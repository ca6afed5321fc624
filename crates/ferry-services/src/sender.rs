//! Outbound transfers: one file, one connection.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use ferry_core::config::FerryConfig;
use ferry_core::wire::{self, DEFAULT_CHUNK_SIZE, MAX_IDENTIFIER_LEN};
use ferry_core::TransferError;

use crate::deadline::within;
use crate::event::{SharedSink, TransferEvent, TransferId};
use crate::naming;
use crate::progress::Progress;

#[derive(Debug, Clone)]
pub struct SenderConfig {
    pub chunk_size: usize,
    pub connect_timeout: Option<Duration>,
    pub io_timeout: Option<Duration>,
    /// 0 = unlimited.
    pub max_concurrent_sends: usize,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            connect_timeout: Some(Duration::from_secs(10)),
            io_timeout: Some(Duration::from_secs(30)),
            max_concurrent_sends: 0,
        }
    }
}

impl From<&FerryConfig> for SenderConfig {
    fn from(config: &FerryConfig) -> Self {
        Self {
            chunk_size: config.transfer.chunk_size,
            connect_timeout: config.transfer.connect_timeout(),
            io_timeout: config.transfer.io_timeout(),
            max_concurrent_sends: config.transfer.max_concurrent_sends,
        }
    }
}

/// One file to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub source_path: PathBuf,
    pub target_address: String,
    pub target_port: u16,
}

impl TransferRequest {
    pub fn new(
        source_path: impl Into<PathBuf>,
        target_address: impl Into<String>,
        target_port: u16,
    ) -> Self {
        Self {
            source_path: source_path.into(),
            target_address: target_address.into(),
            target_port,
        }
    }

    /// `host:port`, with bare IPv6 literals bracketed.
    pub fn target(&self) -> String {
        let host = self.target_address.trim();
        if host.contains(':') && !host.starts_with('[') {
            format!("[{host}]:{}", self.target_port)
        } else {
            format!("{host}:{}", self.target_port)
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SendReport {
    pub id: TransferId,
    pub source_path: PathBuf,
    pub target: String,
    pub bytes_sent: u64,
}

/// Sends files. Cheap to clone; clones share the concurrency limit.
#[derive(Clone)]
pub struct Sender {
    config: Arc<SenderConfig>,
    sink: SharedSink,
    limiter: Option<Arc<Semaphore>>,
}

impl Sender {
    pub fn new(config: SenderConfig, sink: SharedSink) -> Self {
        let limiter = match config.max_concurrent_sends {
            0 => None,
            n => Some(Arc::new(Semaphore::new(n))),
        };
        Self {
            config: Arc::new(config),
            sink,
            limiter,
        }
    }

    /// Send one file and wait for the outcome.
    pub async fn send(&self, request: TransferRequest) -> Result<SendReport, TransferError> {
        self.send_as(TransferId::next_outgoing(), request).await
    }

    /// Convenience for [`Sender::send`].
    pub async fn send_file(
        &self,
        path: impl Into<PathBuf>,
        host: &str,
        port: u16,
    ) -> Result<SendReport, TransferError> {
        self.send(TransferRequest::new(path, host, port)).await
    }

    /// Send in the background. The id is known immediately so the caller
    /// can match it against events.
    pub fn spawn(
        &self,
        request: TransferRequest,
    ) -> (TransferId, JoinHandle<Result<SendReport, TransferError>>) {
        let id = TransferId::next_outgoing();
        let sender = self.clone();
        let task = tokio::spawn(async move { sender.send_as(id, request).await });
        (id, task)
    }

    async fn send_as(
        &self,
        id: TransferId,
        request: TransferRequest,
    ) -> Result<SendReport, TransferError> {
        let _permit = match &self.limiter {
            Some(limiter) => limiter.clone().acquire_owned().await.ok(),
            None => None,
        };

        let target = request.target();
        match self.transfer(id, &request, &target).await {
            Ok(bytes_sent) => {
                tracing::info!(%id, %target, bytes_sent, path = %request.source_path.display(), "file sent");
                self.sink.emit(TransferEvent::Completed {
                    id,
                    path: request.source_path.clone(),
                    bytes: bytes_sent,
                });
                Ok(SendReport {
                    id,
                    source_path: request.source_path,
                    target,
                    bytes_sent,
                })
            }
            Err(e) => {
                tracing::warn!(%id, %target, error = %e, "send failed");
                self.sink
                    .emit(TransferEvent::failed(id, Some(&request.source_path), &e));
                Err(e)
            }
        }
    }

    async fn transfer(
        &self,
        id: TransferId,
        request: &TransferRequest,
        target: &str,
    ) -> Result<u64, TransferError> {
        let path = &request.source_path;
        let unreadable = |e: io::Error| TransferError::FileNotReadable {
            path: path.clone(),
            source: e,
        };

        if request.target_address.trim().is_empty() {
            return Err(TransferError::InvalidTarget {
                target: target.to_string(),
            });
        }

        // Open before connecting so a bad path never touches the network.
        let mut file = File::open(path).await.map_err(unreadable)?;
        let meta = file.metadata().await.map_err(unreadable)?;
        if !meta.is_file() {
            return Err(unreadable(io::Error::new(
                io::ErrorKind::InvalidInput,
                "not a regular file",
            )));
        }
        let size = meta.len();
        let identifier = identifier_for(path).await;
        let header = wire::encode_header(&identifier, size)?;

        let mut stream = within(self.config.connect_timeout, "connecting", async {
            TcpStream::connect(target)
                .await
                .map_err(|e| TransferError::ConnectionRefused {
                    addr: target.to_string(),
                    source: e,
                })
        })
        .await?;
        tracing::debug!(%id, %target, identifier, size, "connected");

        self.sink.emit(TransferEvent::Started {
            id,
            name: naming::base_name(&identifier),
            path: path.clone(),
            peer: target.to_string(),
            total_bytes: size,
        });

        let io_timeout = self.config.io_timeout;
        write_all(&mut stream, &header, io_timeout).await?;

        let mut progress = Progress::new(size);
        if let Some(percent) = progress.start() {
            self.emit_progress(id, percent, 0);
        }

        let mut buf = vec![0u8; self.config.chunk_size.max(1)];
        while !progress.is_complete() {
            let want = progress.next_read_len(buf.len());
            let n = file.read(&mut buf[..want]).await.map_err(unreadable)?;
            if n == 0 {
                return Err(unreadable(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("file shrank to {} of {size} bytes while sending", progress.done()),
                )));
            }

            write_all(&mut stream, &buf[..n], io_timeout).await?;
            if let Some(percent) = progress.advance(n) {
                self.emit_progress(id, percent, progress.done());
            }
        }

        within(io_timeout, "closing connection", async {
            stream
                .shutdown()
                .await
                .map_err(|e| TransferError::ConnectionReset { source: e })
        })
        .await?;
        Ok(progress.done())
    }

    fn emit_progress(&self, id: TransferId, percent: u8, bytes: u64) {
        self.sink.emit(TransferEvent::Progress { id, percent, bytes });
    }
}

async fn write_all(
    stream: &mut TcpStream,
    data: &[u8],
    io_timeout: Option<Duration>,
) -> Result<(), TransferError> {
    within(io_timeout, "writing", async {
        stream
            .write_all(data)
            .await
            .map_err(|e| TransferError::ConnectionReset { source: e })
    })
    .await
}

/// Absolute source path, falling back to the bare file name when the path
/// cannot be resolved or does not fit in an identifier frame.
async fn identifier_for(path: &Path) -> String {
    let full = tokio::fs::canonicalize(path)
        .await
        .unwrap_or_else(|_| path.to_path_buf())
        .to_string_lossy()
        .into_owned();
    if !full.is_empty() && full.len() <= MAX_IDENTIFIER_LEN {
        return full;
    }
    match path.file_name() {
        Some(name) => {
            let name = name.to_string_lossy();
            let mut end = name.len().min(MAX_IDENTIFIER_LEN);
            while !name.is_char_boundary(end) {
                end -= 1;
            }
            name[..end].to_string()
        }
        None => naming::FALLBACK_NAME.to_string(),
    }
}
