//! Line-delimited JSON codec.
//!
//! Debug-friendly alternative to the MessagePack codec: every header and
//! body value is one `\n`-terminated JSON line. A malformed line is consumed
//! before its parse error surfaces, so the cursor stays aligned on the next
//! value and a bad body does not poison the rest of the stream.

use crate::codec::Codec;
use crate::error::ProtocolError;
use crate::header::Header;
use bytes::BytesMut;
use serde::de::DeserializeOwned;
use serde_json::Value;

pub(crate) const NAME: &str = "json";

/// Line-delimited JSON framing.
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn name(&self) -> &'static str {
        NAME
    }

    fn encode_frame(&self, header: &Header, body: &Value) -> Result<BytesMut, ProtocolError> {
        let mut frame = BytesMut::new();
        frame.extend_from_slice(&serde_json::to_vec(header)?);
        frame.extend_from_slice(b"\n");
        frame.extend_from_slice(&serde_json::to_vec(body)?);
        frame.extend_from_slice(b"\n");
        Ok(frame)
    }

    fn decode_header(&self, buf: &mut BytesMut) -> Result<Option<Header>, ProtocolError> {
        decode_line(buf)
    }

    fn decode_body(&self, buf: &mut BytesMut) -> Result<Option<Value>, ProtocolError> {
        decode_line(buf)
    }
}

fn decode_line<T: DeserializeOwned>(buf: &mut BytesMut) -> Result<Option<T>, ProtocolError> {
    let Some(pos) = buf.iter().position(|&b| b == b'\n') else {
        return Ok(None);
    };
    let line = buf.split_to(pos + 1);
    let text = std::str::from_utf8(&line[..pos]).map_err(|_| ProtocolError::InvalidUtf8)?;
    Ok(Some(serde_json::from_str(text)?))
}
