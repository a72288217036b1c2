//! # wirecall-protocol
//!
//! Wire protocol implementation for wirecall.
//!
//! This crate provides:
//! - The one-time connection handshake ([`ConnectOptions`]) and its fixed,
//!   codec-independent JSON-line encoding
//! - The per-request/response [`Header`] type
//! - The pluggable [`Codec`] capability and the [`CodecRegistry`]
//! - MessagePack and line-delimited JSON codec implementations

pub mod codec;
pub mod error;
pub mod handshake;
pub mod header;
pub mod json;
pub mod msgpack;

pub use codec::{Codec, CodecCtor, CodecRegistry};
pub use error::ProtocolError;
pub use handshake::{ConnectOptions, MAGIC_NUMBER};
pub use header::Header;
pub use json::JsonCodec;
pub use msgpack::MsgpackCodec;

/// Codec negotiated when the client does not ask for anything else.
pub const DEFAULT_CODEC: &str = "msgpack";

/// Default port for a wirecall server.
pub const DEFAULT_PORT: u16 = 7390;
