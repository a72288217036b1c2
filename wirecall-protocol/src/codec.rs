//! The pluggable codec capability and its registry.

use crate::error::ProtocolError;
use crate::header::Header;
use bytes::BytesMut;
use serde_json::Value;
use std::collections::HashMap;

/// Turns buffered wire bytes into typed header/body values and values back
/// into contiguous outgoing frames.
///
/// Codecs are sans-io: the connection owns the socket and the read buffer,
/// feeds incoming bytes into the buffer, and calls [`decode_header`] and
/// [`decode_body`] in strict alternation. The encodings are self-describing
/// with no outer length prefix, so skipping a body decode after a header
/// decode desynchronizes the stream for every subsequent frame.
///
/// [`decode_header`]: Codec::decode_header
/// [`decode_body`]: Codec::decode_body
pub trait Codec: Send + Sync {
    /// Registry name of this codec.
    fn name(&self) -> &'static str;

    /// Serializes `header` then `body` back-to-back as one frame.
    ///
    /// The caller writes the returned buffer with a single `write_all`, so
    /// the two encoded values reach the peer as one contiguous unit.
    fn encode_frame(&self, header: &Header, body: &Value) -> Result<BytesMut, ProtocolError>;

    /// Decodes the next frame's header, consuming exactly its bytes.
    ///
    /// `Ok(None)` means the frame is still in flight and more bytes are
    /// needed. `Err` means the stream is malformed and the decode cursor can
    /// no longer be trusted.
    fn decode_header(&self, buf: &mut BytesMut) -> Result<Option<Header>, ProtocolError>;

    /// Decodes the body value that follows a decoded header.
    ///
    /// Must be called exactly once after every successful `decode_header`
    /// and before the next one.
    fn decode_body(&self, buf: &mut BytesMut) -> Result<Option<Value>, ProtocolError>;
}

/// Constructor for one codec instance, registered under its name.
pub type CodecCtor = fn() -> Box<dyn Codec>;

/// Maps codec names to constructors.
///
/// Built once at process start and shared read-only afterwards, so lookups
/// need no locking.
pub struct CodecRegistry {
    codecs: HashMap<String, CodecCtor>,
}

impl CodecRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            codecs: HashMap::new(),
        }
    }

    /// Creates a registry with the built-in codecs registered.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(crate::msgpack::NAME, || Box::new(crate::MsgpackCodec));
        registry.register(crate::json::NAME, || Box::new(crate::JsonCodec));
        registry
    }

    /// Registers a codec constructor under `name`. A later registration of
    /// the same name replaces the earlier one.
    pub fn register(&mut self, name: impl Into<String>, ctor: CodecCtor) {
        self.codecs.insert(name.into(), ctor);
    }

    /// Looks up the constructor for `name`.
    pub fn lookup(&self, name: &str) -> Option<CodecCtor> {
        self.codecs.get(name).copied()
    }

    /// Constructs a codec instance for `name`.
    pub fn create(&self, name: &str) -> Result<Box<dyn Codec>, ProtocolError> {
        self.lookup(name)
            .map(|ctor| ctor())
            .ok_or_else(|| ProtocolError::UnknownCodec(name.to_string()))
    }

    /// Registered codec names.
    pub fn names(&self) -> Vec<&str> {
        self.codecs.keys().map(String::as_str).collect()
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
