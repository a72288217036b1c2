//! Protocol error types.

use thiserror::Error;

/// Errors that can occur during the handshake or while encoding and decoding
/// frames.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid magic number {0:#x}")]
    InvalidMagic(u32),

    #[error("unknown codec type {0:?}")]
    UnknownCodec(String),

    #[error("connection closed by peer")]
    Eof,

    #[error("invalid UTF-8 in frame")]
    InvalidUtf8,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("MsgPack encode error: {0}")]
    MsgpackEncode(#[from] rmp_serde::encode::Error),

    #[error("MsgPack decode error: {0}")]
    MsgpackDecode(#[from] rmp_serde::decode::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    /// Whether this error means the peer went away rather than misbehaved.
    pub fn is_eof(&self) -> bool {
        matches!(self, ProtocolError::Eof)
    }
}
