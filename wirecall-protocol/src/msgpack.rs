//! MessagePack codec.
//!
//! The default wire codec: each frame is the header value immediately
//! followed by the body value, both as self-describing MessagePack. There is
//! no outer length prefix, which is exactly why header and body must be
//! decoded in strict alternation.
//!
//! Encoding uses `to_vec_named` so structs travel as maps with field names,
//! not positional arrays; that keeps the stream decodable by any
//! MessagePack implementation.

use crate::codec::Codec;
use crate::error::ProtocolError;
use crate::header::Header;
use bytes::{Buf, BytesMut};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::io::Read;

pub(crate) const NAME: &str = "msgpack";

/// Self-describing MessagePack framing.
pub struct MsgpackCodec;

impl Codec for MsgpackCodec {
    fn name(&self) -> &'static str {
        NAME
    }

    fn encode_frame(&self, header: &Header, body: &Value) -> Result<BytesMut, ProtocolError> {
        let mut frame = BytesMut::new();
        frame.extend_from_slice(&rmp_serde::to_vec_named(header)?);
        frame.extend_from_slice(&rmp_serde::to_vec_named(body)?);
        Ok(frame)
    }

    fn decode_header(&self, buf: &mut BytesMut) -> Result<Option<Header>, ProtocolError> {
        decode_value(buf)
    }

    fn decode_body(&self, buf: &mut BytesMut) -> Result<Option<Value>, ProtocolError> {
        decode_value(buf)
    }
}

/// Reader that counts how many bytes a decode pulled, so the buffer can be
/// advanced by exactly that much on success.
struct TrackingReader<'a> {
    data: &'a [u8],
    consumed: usize,
}

impl Read for TrackingReader<'_> {
    fn read(&mut self, out: &mut [u8]) -> std::io::Result<usize> {
        let n = Read::read(&mut self.data, out)?;
        self.consumed += n;
        Ok(n)
    }
}

/// Decodes one self-describing value off the front of `buf`.
///
/// On success the consumed bytes are removed from the buffer. A decode that
/// ran off the end of the buffer reports `Ok(None)` and leaves the buffer
/// untouched so it can be retried once more bytes arrive. Any other failure
/// leaves the buffer untouched too; the cursor position is then unknown to
/// the caller, which is what makes malformed frames fatal to the stream.
fn decode_value<T: DeserializeOwned>(buf: &mut BytesMut) -> Result<Option<T>, ProtocolError> {
    let mut reader = TrackingReader {
        data: &buf[..],
        consumed: 0,
    };
    let result = {
        let mut de = rmp_serde::Deserializer::new(&mut reader);
        T::deserialize(&mut de)
    };
    match result {
        Ok(value) => {
            let consumed = reader.consumed;
            buf.advance(consumed);
            Ok(Some(value))
        }
        Err(e) if is_truncated(&e) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn is_truncated(err: &rmp_serde::decode::Error) -> bool {
    use rmp_serde::decode::Error;
    match err {
        Error::InvalidMarkerRead(io) | Error::InvalidDataRead(io) => {
            io.kind() == std::io::ErrorKind::UnexpectedEof
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn roundtrip(header: &Header, body: &Value) -> (Header, Value) {
        let codec = MsgpackCodec;
        let mut buf = codec.encode_frame(header, body).unwrap();
        let decoded_header = codec.decode_header(&mut buf).unwrap().unwrap();
        let decoded_body = codec.decode_body(&mut buf).unwrap().unwrap();
        assert!(buf.is_empty());
        (decoded_header, decoded_body)
    }

    #[test]
    fn test_frame_roundtrip() {
        let header = Header::new("Foo.Sum", 42);
        let body = json!("ping");

        let (h, b) = roundtrip(&header, &body);
        assert_eq!(h, header);
        assert_eq!(b, body);
    }

    #[test]
    fn test_structured_body_roundtrip() {
        let header = Header::new("Arith.Mul", 3);
        let body = json!({"a": 7, "b": [1, 2, 3], "c": {"nested": true}, "d": null});

        let (h, b) = roundtrip(&header, &body);
        assert_eq!(h.seq, 3);
        assert_eq!(b, body);
    }

    #[test]
    fn test_error_header_roundtrip() {
        let mut header = Header::new("Foo.Sum", 9);
        header.set_error("no such method");

        let (h, _) = roundtrip(&header, &Value::Null);
        assert_eq!(h.error, "no such method");
    }

    #[test]
    fn test_partial_frame_decoding() {
        let codec = MsgpackCodec;
        let frame = codec
            .encode_frame(&Header::new("Foo.Sum", 1), &json!("hello"))
            .unwrap();

        let mut buf = BytesMut::new();

        // Feed the frame a few bytes at a time; the decoder reports "need
        // more" without consuming anything until the header is whole.
        let mut fed = 0;
        let header = loop {
            match codec.decode_header(&mut buf).unwrap() {
                Some(h) => break h,
                None => {
                    assert!(fed < frame.len(), "decoder never completed");
                    let next = (fed + 3).min(frame.len());
                    buf.extend_from_slice(&frame[fed..next]);
                    fed = next;
                }
            }
        };
        assert_eq!(header.service_method, "Foo.Sum");

        let body = loop {
            match codec.decode_body(&mut buf).unwrap() {
                Some(b) => break b,
                None => {
                    assert!(fed < frame.len(), "decoder never completed");
                    let next = (fed + 3).min(frame.len());
                    buf.extend_from_slice(&frame[fed..next]);
                    fed = next;
                }
            }
        };
        assert_eq!(body, json!("hello"));
    }

    #[test]
    fn test_multiple_frames_in_buffer() {
        let codec = MsgpackCodec;
        let mut buf = BytesMut::new();
        for seq in 0..3u64 {
            let frame = codec
                .encode_frame(&Header::new("Foo.Sum", seq), &json!(format!("req {seq}")))
                .unwrap();
            buf.extend_from_slice(&frame);
        }

        for seq in 0..3u64 {
            let header = codec.decode_header(&mut buf).unwrap().unwrap();
            let body = codec.decode_body(&mut buf).unwrap().unwrap();
            assert_eq!(header.seq, seq);
            assert_eq!(body, json!(format!("req {seq}")));
        }
        assert!(buf.is_empty());
    }

    #[test]
    fn test_malformed_header_is_an_error() {
        let codec = MsgpackCodec;
        // A msgpack integer where a header map is expected.
        let mut buf = BytesMut::from(&[0x07u8][..]);
        assert!(codec.decode_header(&mut buf).is_err());
    }

    #[test]
    fn test_binary_body_rejected() {
        let codec = MsgpackCodec;
        // bin8 payloads have no JSON value representation.
        let mut buf = BytesMut::from(&[0xc4u8, 0x02, 0xde, 0xad][..]);
        assert!(codec.decode_body(&mut buf).is_err());
    }

    #[test]
    fn test_empty_buffer_needs_more() {
        let codec = MsgpackCodec;
        let mut buf = BytesMut::new();
        assert!(codec.decode_header(&mut buf).unwrap().is_none());
    }

    proptest! {
        #[test]
        fn prop_frame_roundtrip(
            method in "[A-Za-z][A-Za-z0-9]{0,11}\\.[A-Za-z][A-Za-z0-9]{0,11}",
            seq in any::<u64>(),
            body in "\\PC*",
        ) {
            let header = Header::new(method, seq);
            let body = json!(body);
            let (h, b) = roundtrip(&header, &body);
            prop_assert_eq!(h, header);
            prop_assert_eq!(b, body);
        }
    }
}
