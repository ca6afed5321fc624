//! Ferry wire format.
//!
//! One TCP connection carries exactly one file, as three frames in order:
//!
//!   identifier : u32 big-endian length, then that many UTF-8 bytes
//!                (the sender's path for the file)
//!   size       : u64 big-endian payload length in bytes
//!   payload    : exactly `size` raw bytes
//!
//! There is no version byte, trailer or checksum. The payload byte count on
//! the wire always equals the size frame; a receiver that sees end-of-stream
//! earlier must treat the transfer as truncated.

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::TransferError;

// ── Constants ─────────────────────────────────────────────────────────────────

/// Default TCP port for the listener.
pub const DEFAULT_PORT: u16 = 6789;

/// Default payload chunk size used by both sides.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Width of the identifier length prefix.
pub const IDENTIFIER_PREFIX_LEN: usize = 4;

/// Width of the size frame.
pub const SIZE_FRAME_LEN: usize = 8;

/// Longest identifier a receiver accepts. Anything larger is treated as a
/// malformed frame rather than allocated.
pub const MAX_IDENTIFIER_LEN: usize = 4096;

/// Which frame a wire error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame {
    Identifier,
    Size,
}

impl std::fmt::Display for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Frame::Identifier => f.write_str("identifier"),
            Frame::Size => f.write_str("size"),
        }
    }
}

// ── Encoding ──────────────────────────────────────────────────────────────────

/// Encode the identifier and size frames into one buffer.
///
/// The payload is streamed separately by the caller.
pub fn encode_header(identifier: &str, size: u64) -> Result<Bytes, WireError> {
    let id = identifier.as_bytes();
    if id.is_empty() {
        return Err(WireError::EmptyIdentifier);
    }
    if id.len() > MAX_IDENTIFIER_LEN {
        return Err(WireError::IdentifierTooLong(id.len()));
    }

    let mut buf = BytesMut::with_capacity(IDENTIFIER_PREFIX_LEN + id.len() + SIZE_FRAME_LEN);
    buf.put_u32(id.len() as u32);
    buf.put_slice(id);
    buf.put_u64(size);
    Ok(buf.freeze())
}

// ── Decoding ──────────────────────────────────────────────────────────────────

/// Read the identifier frame.
///
/// End-of-stream inside the frame is a malformed frame; any other I/O error
/// means the peer went away.
pub async fn read_identifier<R>(reader: &mut R) -> Result<String, TransferError>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; IDENTIFIER_PREFIX_LEN];
    reader
        .read_exact(&mut len_buf)
        .await
        .map_err(|e| TransferError::from_frame_read(Frame::Identifier, e))?;
    let len = u32::from_be_bytes(len_buf) as usize;

    if len == 0 {
        return Err(WireError::EmptyIdentifier.into());
    }
    if len > MAX_IDENTIFIER_LEN {
        return Err(WireError::IdentifierTooLong(len).into());
    }

    let mut id_buf = vec![0u8; len];
    reader
        .read_exact(&mut id_buf)
        .await
        .map_err(|e| TransferError::from_frame_read(Frame::Identifier, e))?;

    String::from_utf8(id_buf).map_err(|_| WireError::InvalidUtf8.into())
}

/// Read the size frame.
pub async fn read_size<R>(reader: &mut R) -> Result<u64, TransferError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; SIZE_FRAME_LEN];
    reader
        .read_exact(&mut buf)
        .await
        .map_err(|e| TransferError::from_frame_read(Frame::Size, e))?;
    Ok(u64::from_be_bytes(buf))
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors that can arise when interpreting wire-format data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("identifier is empty")]
    EmptyIdentifier,

    #[error("identifier length {0} exceeds maximum {}", MAX_IDENTIFIER_LEN)]
    IdentifierTooLong(usize),

    #[error("identifier is not valid UTF-8")]
    InvalidUtf8,

    #[error("stream ended inside the {0} frame")]
    UnexpectedEof(Frame),
}

// ── Tests ─────────────────────────────────────────────────────────────────────
