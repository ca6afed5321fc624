//! HTTP API handlers, exposing daemon state as JSON.

pub mod status;
pub mod transfers;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use ferry_services::{PoolStats, Sender, TransferRegistry};

#[derive(Clone)]
pub struct ApiState {
    pub registry: TransferRegistry,
    pub sender: Sender,
    pub listen_addr: SocketAddr,
    pub destination_dir: PathBuf,
    pub pool: Arc<PoolStats>,
    /// Broadcast to every part of the daemon when shutdown is requested.
    pub shutdown_tx: tokio::sync::broadcast::Sender<()>,
}

pub use status::{handle_shutdown, handle_status};
pub use transfers::{handle_send, handle_transfers};
