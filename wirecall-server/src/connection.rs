//! Per-connection protocol state machine.
//!
//! Every accepted stream walks four phases: handshaking (one codec-neutral
//! options line), serving (one sequential reader fanning requests out to
//! concurrent tasks), draining (wait for every dispatched request to finish
//! its response), closed (write side released).
//!
//! Frame decoding is inherently ordered and never parallelized; responses
//! may complete in any order, but each frame write happens under the send
//! lock, so interleaved bytes on the wire are impossible.

use crate::error::ServerError;
use crate::server::ServerStats;
use crate::service::Service;
use bytes::BytesMut;
use serde_json::Value;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinSet;
use wirecall_protocol::{handshake, Codec, CodecRegistry, Header, ProtocolError, MAGIC_NUMBER};

/// Socket read chunk size.
const READ_BUFFER_SIZE: usize = 8 * 1024;

/// Placeholder reply body for requests that could not produce a real one.
fn invalid_request() -> Value {
    Value::Null
}

/// Serves one connection to completion.
///
/// Handshake failures close the connection without a single byte written
/// back: no codec has been agreed yet, so no error frame could be written
/// safely. Once a codec is selected, every request that reaches dispatch
/// gets exactly one response before the stream is released.
pub async fn serve_connection<S>(
    stream: S,
    peer: &str,
    registry: &CodecRegistry,
    service: Arc<dyn Service>,
    stats: Arc<ServerStats>,
    shutdown: broadcast::Receiver<()>,
) -> Result<(), ServerError>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (mut reader, writer) = tokio::io::split(stream);
    let mut buf = BytesMut::with_capacity(READ_BUFFER_SIZE);
    let mut chunk = [0u8; READ_BUFFER_SIZE];

    // Handshaking: one ConnectOptions line in the fixed encoding, consumed
    // exactly once and discarded after codec selection.
    let opts = loop {
        match handshake::decode(&mut buf) {
            Ok(Some(opts)) => break opts,
            Ok(None) => {}
            Err(e) => {
                tracing::warn!("[{peer}] bad handshake: {e}");
                return Ok(());
            }
        }
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            tracing::debug!("[{peer}] closed before handshake");
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    if opts.magic_number != MAGIC_NUMBER {
        tracing::warn!("[{peer}] invalid magic number {:#x}", opts.magic_number);
        return Ok(());
    }
    let codec: Arc<dyn Codec> = match registry.create(&opts.codec_type) {
        Ok(codec) => Arc::from(codec),
        Err(e) => {
            tracing::warn!("[{peer}] {e}");
            return Ok(());
        }
    };
    tracing::debug!("[{peer}] handshake complete, codec={}", codec.name());

    serve_codec(reader, writer, buf, codec, service, stats, peer, shutdown).await
}

/// Serving, draining and closing: the request loop on an agreed codec.
#[allow(clippy::too_many_arguments)]
async fn serve_codec<S>(
    mut reader: ReadHalf<S>,
    writer: WriteHalf<S>,
    mut buf: BytesMut,
    codec: Arc<dyn Codec>,
    service: Arc<dyn Service>,
    stats: Arc<ServerStats>,
    peer: &str,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<(), ServerError>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let writer = Arc::new(Mutex::new(writer));
    let mut chunk = [0u8; READ_BUFFER_SIZE];
    let mut workers: JoinSet<()> = JoinSet::new();
    let mut result = Ok(());

    'serve: loop {
        // Decode one header, reading the socket while the codec reports
        // "need more". Stream-level failures here are unrecoverable: a
        // malformed header leaves the decode cursor in an unknown position,
        // so the stream itself is untrustworthy from that point on.
        let header = loop {
            match codec.decode_header(&mut buf) {
                Ok(Some(header)) => break header,
                Ok(None) => {}
                Err(e) => {
                    tracing::debug!("[{peer}] header decode failed: {e}");
                    result = Err(e.into());
                    break 'serve;
                }
            }
            tokio::select! {
                read = reader.read(&mut chunk) => match read {
                    Ok(0) => {
                        if !buf.is_empty() {
                            tracing::debug!("[{peer}] stream ended mid-frame");
                        }
                        break 'serve;
                    }
                    Ok(n) => buf.extend_from_slice(&chunk[..n]),
                    Err(e) => {
                        tracing::debug!("[{peer}] read error: {e}");
                        result = Err(e.into());
                        break 'serve;
                    }
                },
                _ = shutdown.recv() => {
                    tracing::debug!("[{peer}] shutdown signal received");
                    break 'serve;
                }
            }
        };

        // The header is consumed, so the peer is owed exactly one response
        // for this seq. The body read is always attempted; a body that
        // fails to decode is answered with an error frame rather than
        // dropped, because the cursor is still usable on the line-oriented
        // paths and the correlation must not be lost.
        let body = loop {
            match codec.decode_body(&mut buf) {
                Ok(Some(value)) => break Ok(value),
                Ok(None) => {}
                Err(e) => break Err(e),
            }
            match reader.read(&mut chunk).await {
                Ok(0) => {
                    tracing::debug!("[{peer}] stream ended mid-body (seq={})", header.seq);
                    result = Err(ProtocolError::Eof.into());
                    break 'serve;
                }
                Ok(n) => buf.extend_from_slice(&chunk[..n]),
                Err(e) => {
                    tracing::debug!("[{peer}] read error: {e}");
                    result = Err(e.into());
                    break 'serve;
                }
            }
        };

        stats.requests_total.fetch_add(1, Ordering::Relaxed);
        workers.spawn(handle_request(
            codec.clone(),
            writer.clone(),
            service.clone(),
            header,
            body,
            peer.to_string(),
        ));
    }

    // Draining: every dispatched request finishes its response write before
    // the stream is released, so a write after close cannot happen.
    while workers.join_next().await.is_some() {}

    // Closed: release the write side.
    let mut writer = writer.lock().await;
    let _ = writer.shutdown().await;
    tracing::debug!("[{peer}] connection closed");
    result
}

/// Computes and writes one response. Runs as its own task, concurrently
/// with the reader and with sibling requests.
async fn handle_request<W>(
    codec: Arc<dyn Codec>,
    writer: Arc<Mutex<W>>,
    service: Arc<dyn Service>,
    mut header: Header,
    body: Result<Value, ProtocolError>,
    peer: String,
) where
    W: AsyncWrite + Send + Unpin,
{
    let reply = match body {
        Ok(argv) => match service.call(&header.service_method, argv).await {
            Ok(replyv) => replyv,
            Err(e) => {
                header.set_error(&e);
                invalid_request()
            }
        },
        // A bad body still gets a correlated response on the same seq; the
        // service never sees the request.
        Err(e) => {
            header.set_error(format!("invalid request body: {e}"));
            invalid_request()
        }
    };

    let frame = match codec.encode_frame(&header, &reply) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::error!("[{peer}] encode response failed (seq={}): {e}", header.seq);
            let mut writer = writer.lock().await;
            let _ = writer.shutdown().await;
            return;
        }
    };

    // Send lock: the frame reaches the wire as one contiguous unit, and
    // concurrent completions cannot interleave.
    let mut writer = writer.lock().await;
    if let Err(e) = writer.write_all(&frame).await {
        tracing::error!("[{peer}] write response failed (seq={}): {e}", header.seq);
        let _ = writer.shutdown().await;
    }
}
