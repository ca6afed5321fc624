//! Transfer machinery: sending, listening, per-connection receive, and the
//! event plumbing that reports on all of it.

mod deadline;

pub mod event;
pub mod handler;
pub mod listener;
pub mod naming;
pub mod pool;
pub mod progress;
pub mod registry;
pub mod sender;

pub use event::{
    ChannelSink, Direction, EventSink, FanoutSink, LogSink, NoopSink, SharedSink, TransferEvent,
    TransferId,
};
pub use handler::{ConnectionHandler, HandlerSettings, HandlerState, ReceivedFile};
pub use listener::{Listener, ListenerConfig, ListenerHandle};
pub use pool::{PoolStats, WorkerPool};
pub use registry::{RecordState, TransferCounts, TransferRecord, TransferRegistry};
pub use sender::{SendReport, Sender, SenderConfig, TransferRequest};
