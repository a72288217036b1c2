//! Connection handshake.
//!
//! A client opens every connection with one [`ConnectOptions`] value encoded
//! as a single JSON line. The line has to be decodable before any codec has
//! been agreed on, so its encoding is fixed and codec-independent. Bytes
//! after the terminating newline belong to the negotiated codec and are left
//! in the read buffer.

use crate::error::ProtocolError;
use bytes::BytesMut;
use serde::{Deserialize, Serialize};

/// Marks a connection as speaking the wirecall protocol. Checked first so
/// foreign traffic is rejected cheaply.
pub const MAGIC_NUMBER: u32 = 0x3bef5c;

/// One-time handshake record: the magic number plus the codec the client
/// wants for the rest of the connection.
///
/// Sent exactly once per connection and discarded after codec selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectOptions {
    pub magic_number: u32,
    pub codec_type: String,
}

impl ConnectOptions {
    pub fn new(codec_type: impl Into<String>) -> Self {
        Self {
            magic_number: MAGIC_NUMBER,
            codec_type: codec_type.into(),
        }
    }

    /// Checks the magic number.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        if self.magic_number != MAGIC_NUMBER {
            return Err(ProtocolError::InvalidMagic(self.magic_number));
        }
        Ok(())
    }
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self::new(crate::DEFAULT_CODEC)
    }
}

/// Encodes the handshake as a JSON line.
pub fn encode(opts: &ConnectOptions) -> Result<Vec<u8>, ProtocolError> {
    let mut bytes = serde_json::to_vec(opts)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Attempts to decode one handshake line from the buffer.
///
/// Returns `Ok(None)` until a full line has arrived. On success the line is
/// consumed; any bytes that followed it stay in the buffer for the codec.
pub fn decode(buf: &mut BytesMut) -> Result<Option<ConnectOptions>, ProtocolError> {
    let Some(pos) = buf.iter().position(|&b| b == b'\n') else {
        return Ok(None);
    };
    let line = buf.split_to(pos + 1);
    let text = std::str::from_utf8(&line[..pos]).map_err(|_| ProtocolError::InvalidUtf8)?;
    let opts: ConnectOptions = serde_json::from_str(text)?;
    Ok(Some(opts))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handshake_roundtrip() {
        let opts = ConnectOptions::new("msgpack");
        let encoded = encode(&opts).unwrap();

        let mut buf = BytesMut::from(&encoded[..]);
        let decoded = decode(&mut buf).unwrap().unwrap();

        assert_eq!(decoded, opts);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_partial_line() {
        let mut buf = BytesMut::from(&br#"{"magic_number":3927"#[..]);
        assert!(decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(br#"900,"codec_type":"json"}"#);
        assert!(decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(b"\n");
        let opts = decode(&mut buf).unwrap().unwrap();
        assert_eq!(opts.magic_number, MAGIC_NUMBER);
        assert_eq!(opts.codec_type, "json");
    }

    #[test]
    fn test_trailing_bytes_left_for_codec() {
        let opts = ConnectOptions::default();
        let mut encoded = encode(&opts).unwrap();
        encoded.extend_from_slice(b"codec bytes");

        let mut buf = BytesMut::from(&encoded[..]);
        decode(&mut buf).unwrap().unwrap();

        assert_eq!(&buf[..], b"codec bytes");
    }

    #[test]
    fn test_validate_magic() {
        let good = ConnectOptions::default();
        assert!(good.validate().is_ok());

        let bad = ConnectOptions {
            magic_number: 0x1,
            codec_type: "msgpack".to_string(),
        };
        assert!(matches!(
            bad.validate(),
            Err(ProtocolError::InvalidMagic(0x1))
        ));
    }

    #[test]
    fn test_malformed_line() {
        let mut buf = BytesMut::from(&b"not json at all\n"[..]);
        assert!(decode(&mut buf).is_err());
    }

    #[test]
    fn test_invalid_utf8() {
        let mut buf = BytesMut::from(&[0xFF, 0xFE, b'\n'][..]);
        assert!(matches!(decode(&mut buf), Err(ProtocolError::InvalidUtf8)));
    }
}
