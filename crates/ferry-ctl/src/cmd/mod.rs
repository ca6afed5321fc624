//! CLI command modules.

pub mod http;
pub mod listen;
pub mod progress;
pub mod send;
pub mod status;
