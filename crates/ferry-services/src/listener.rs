//! Inbound transfer listener.
//!
//! Binds the port up front so a busy port is reported before any handle
//! exists, then runs the accept loop on its own task. Every accepted
//! connection goes to the worker pool; the loop itself never reads from a
//! socket.

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use ferry_core::config::FerryConfig;
use ferry_core::wire::{DEFAULT_CHUNK_SIZE, DEFAULT_PORT};
use ferry_core::TransferError;

use crate::event::{SharedSink, TransferEvent, TransferId};
use crate::handler::{ConnectionHandler, HandlerSettings};
use crate::pool::{PoolStats, WorkerPool};

/// First pause after a failed accept. Doubles while failures continue.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// Ceiling for the growing accept backoff.
const MAX_ACCEPT_BACKOFF: Duration = Duration::from_secs(1);

/// Consecutive unrecognised accept failures tolerated before the loop gives
/// up. Resource exhaustion and per-connection errors never count.
const MAX_CONSECUTIVE_ACCEPT_ERRORS: u32 = 64;

#[derive(Debug, Clone)]
pub struct ListenerConfig {
    pub bind_addr: String,
    pub destination_dir: PathBuf,
    pub workers: usize,
    /// 0 = unbounded.
    pub queue_limit: usize,
    pub chunk_size: usize,
    pub io_timeout: Option<Duration>,
}

impl ListenerConfig {
    /// Listen on all interfaces at `port`, writing into the current directory.
    pub fn new(port: u16) -> Self {
        Self {
            bind_addr: format!("0.0.0.0:{port}"),
            ..Self::default()
        }
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_addr: format!("0.0.0.0:{DEFAULT_PORT}"),
            destination_dir: PathBuf::from("."),
            workers: 5,
            queue_limit: 0,
            chunk_size: DEFAULT_CHUNK_SIZE,
            io_timeout: Some(Duration::from_secs(30)),
        }
    }
}

impl From<&FerryConfig> for ListenerConfig {
    fn from(config: &FerryConfig) -> Self {
        Self {
            bind_addr: config.listen_addr(),
            destination_dir: config.receiver.destination_dir.clone(),
            workers: config.receiver.workers,
            queue_limit: config.receiver.queue_limit,
            chunk_size: config.transfer.chunk_size,
            io_timeout: config.transfer.io_timeout(),
        }
    }
}

/// Entry point for receiving files.
pub struct Listener;

impl Listener {
    /// Bind and start accepting.
    ///
    /// Fails with `Bind` if the address is taken and with `Storage` if the
    /// destination directory cannot be created. Both are reported before a
    /// handle is returned.
    pub async fn start(
        config: ListenerConfig,
        sink: SharedSink,
    ) -> Result<ListenerHandle, TransferError> {
        let socket = TcpListener::bind(&config.bind_addr)
            .await
            .map_err(|e| TransferError::Bind {
                addr: config.bind_addr.clone(),
                source: e,
            })?;
        let local_addr = socket.local_addr().map_err(|e| TransferError::Bind {
            addr: config.bind_addr.clone(),
            source: e,
        })?;

        tokio::fs::create_dir_all(&config.destination_dir)
            .await
            .map_err(|e| TransferError::Storage {
                path: config.destination_dir.clone(),
                source: e,
            })?;

        let pool = WorkerPool::new(config.workers, config.queue_limit);
        let stats = pool.stats();
        let (running_tx, running_rx) = watch::channel(true);
        let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);

        let accept_loop = AcceptLoop {
            socket,
            local_addr,
            pool,
            settings: Arc::new(HandlerSettings {
                destination_dir: config.destination_dir.clone(),
                chunk_size: config.chunk_size,
                io_timeout: config.io_timeout,
            }),
            sink,
            running: running_tx,
            shutdown: shutdown_rx,
        };

        tracing::info!(
            %local_addr,
            workers = stats.capacity(),
            queue_limit = config.queue_limit,
            destination = %config.destination_dir.display(),
            "listener started"
        );

        Ok(ListenerHandle {
            local_addr,
            stats,
            running: running_rx,
            shutdown: shutdown_tx,
            task: tokio::spawn(accept_loop.run()),
        })
    }
}

/// Control over a running listener. Dropping it stops the listener the same
/// way `stop` does, without waiting for the drain.
pub struct ListenerHandle {
    local_addr: SocketAddr,
    stats: Arc<PoolStats>,
    running: watch::Receiver<bool>,
    shutdown: broadcast::Sender<()>,
    task: JoinHandle<io::Result<()>>,
}

impl ListenerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// False once the accept loop has ended, for whatever reason. Clears
    /// before queued and running handlers have drained.
    pub fn is_running(&self) -> bool {
        *self.running.borrow()
    }

    /// Resolves once the accept loop has ended. Does not ask it to.
    pub async fn stopped(&self) {
        let mut running = self.running.clone();
        // Err means the loop is gone, which is just as stopped.
        let _ = running.wait_for(|running| !*running).await;
    }

    pub fn pool_stats(&self) -> Arc<PoolStats> {
        self.stats.clone()
    }

    /// Stop accepting, let queued and in-flight handlers finish, then return.
    pub async fn stop(self) -> io::Result<()> {
        // Err only means the loop already ended on its own.
        let _ = self.shutdown.send(());
        Self::join(self.task).await
    }

    /// Wait for the accept loop to end without asking it to. Returns the
    /// fatal socket error, if that is what ended it.
    pub async fn wait(self) -> io::Result<()> {
        let Self { shutdown, task, .. } = self;
        let result = Self::join(task).await;
        drop(shutdown);
        result
    }

    async fn join(task: JoinHandle<io::Result<()>>) -> io::Result<()> {
        task.await.map_err(io::Error::other)?
    }
}

struct AcceptLoop {
    socket: TcpListener,
    local_addr: SocketAddr,
    pool: WorkerPool,
    settings: Arc<HandlerSettings>,
    sink: SharedSink,
    running: watch::Sender<bool>,
    shutdown: broadcast::Receiver<()>,
}

impl AcceptLoop {
    async fn run(self) -> io::Result<()> {
        let AcceptLoop {
            socket,
            local_addr,
            mut pool,
            settings,
            sink,
            running,
            mut shutdown,
        } = self;

        let mut consecutive_errors = 0u32;
        let mut backoff = ACCEPT_BACKOFF;

        let result = loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!(%local_addr, "listener shutting down");
                    break Ok(());
                }

                accepted = socket.accept() => match accepted {
                    Ok((stream, peer)) => {
                        consecutive_errors = 0;
                        backoff = ACCEPT_BACKOFF;
                        dispatch(&mut pool, stream, peer, &settings, &sink);
                    }
                    Err(e) => match AcceptFailure::classify(&e) {
                        AcceptFailure::Connection => {
                            tracing::debug!(error = %e, "connection dropped before accept");
                        }
                        AcceptFailure::Exhausted => {
                            // Queued handlers hold descriptors and will give them back.
                            tracing::warn!(error = %e, backoff_ms = backoff.as_millis() as u64, "accept starved of resources");
                            tokio::time::sleep(backoff).await;
                            backoff = (backoff * 2).min(MAX_ACCEPT_BACKOFF);
                        }
                        AcceptFailure::Other if consecutive_errors < MAX_CONSECUTIVE_ACCEPT_ERRORS => {
                            consecutive_errors += 1;
                            tracing::warn!(error = %e, consecutive_errors, "accept failed");
                            tokio::time::sleep(ACCEPT_BACKOFF).await;
                        }
                        AcceptFailure::Other | AcceptFailure::Fatal => {
                            tracing::error!(error = %e, "accept loop terminated");
                            break Err(e);
                        }
                    },
                }
            }
        };

        // Close the socket first so nothing new queues up behind the drain.
        drop(socket);
        running.send_replace(false);
        pool.shutdown().await;

        sink.emit(TransferEvent::ListenerStopped {
            local_addr,
            error: result.as_ref().err().map(|e| e.to_string()),
        });
        result
    }
}

fn dispatch(
    pool: &mut WorkerPool,
    stream: TcpStream,
    peer: SocketAddr,
    settings: &Arc<HandlerSettings>,
    sink: &SharedSink,
) {
    let id = TransferId::next_incoming();
    tracing::info!(%id, %peer, "connection accepted");

    let handler = ConnectionHandler::new(id, peer, stream, settings.clone(), sink.clone());
    let submitted = pool.submit(async move {
        // Outcome already reported to the sink by the handler.
        let _ = handler.run().await;
    });

    if let Err(e) = submitted {
        // The rejected job owned the stream, so the peer sees the close.
        tracing::warn!(%id, %peer, error = %e, "connection rejected");
        sink.emit(TransferEvent::failed(id, None, &e));
    }
}

/// How the accept loop treats a failed `accept`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AcceptFailure {
    /// The pending connection died before we took it. Nothing to wait for.
    Connection,
    /// Out of descriptors, buffers or memory. Clears as handlers finish, so
    /// retried with a growing pause for as long as it lasts.
    Exhausted,
    /// The listening socket itself is unusable.
    Fatal,
    /// Anything unrecognised. Retried, but only so many times in a row.
    Other,
}

impl AcceptFailure {
    fn classify(e: &io::Error) -> Self {
        if is_exhaustion(e) {
            return Self::Exhausted;
        }
        match e.kind() {
            io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut => Self::Connection,
            io::ErrorKind::OutOfMemory => Self::Exhausted,
            io::ErrorKind::InvalidInput
            | io::ErrorKind::NotConnected
            | io::ErrorKind::Unsupported => Self::Fatal,
            _ => Self::Other,
        }
    }
}

#[cfg(unix)]
fn is_exhaustion(e: &io::Error) -> bool {
    matches!(
        e.raw_os_error(),
        Some(libc::EMFILE | libc::ENFILE | libc::ENOBUFS | libc::ENOMEM)
    )
}

#[cfg(not(unix))]
fn is_exhaustion(_e: &io::Error) -> bool {
    false
}
