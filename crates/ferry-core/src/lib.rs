//! ferry-core: wire format, error types and configuration.
//! All other Ferry crates depend on this one.

pub mod config;
pub mod error;
pub mod wire;

pub use error::{ErrorKind, TransferError};
pub use wire::WireError;
