//! RPC Module
//!
//! How the client reaches the storage daemons: the request/response
//! protocol, the [`Transport`] seam with an in-process and a TCP
//! implementation, and the [`Forwarder`] that turns file-level calls into
//! per-daemon requests.

mod forward;
mod local;
pub mod protocol;
mod tcp;

pub use forward::Forwarder;
pub use local::LocalTransport;
pub use protocol::{
    ChunkData, ChunkRead, ChunkStat, ChunkWrite, FrameHeader, Request, Response, MAX_FRAME_SIZE,
};
pub use tcp::TcpTransport;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::placement::DaemonId;

/// Body codec tag: bincode bytes follow as-is
const CODEC_RAW: u8 = 0;
/// Body codec tag: LZ4 block with prepended size
const CODEC_LZ4: u8 = 1;
/// Bodies smaller than this are never compressed
const COMPRESS_THRESHOLD: usize = 4096;

/// Request/response channel to the configured daemons
#[async_trait]
pub trait Transport: Send + Sync {
    /// Number of daemons reachable through this transport
    fn num_daemons(&self) -> usize;

    /// Send one request to daemon `target` and wait for its reply.
    ///
    /// Error replies are returned as `Ok(Response::Error { .. })`; only
    /// failures to reach the daemon are `Err`.
    async fn call(&self, target: DaemonId, request: Request) -> Result<Response>;
}

/// Encode a message body, compressing it when asked and worthwhile
pub fn encode_body<T: Serialize>(message: &T, compress: bool) -> Result<Vec<u8>> {
    let raw = bincode::serialize(message)?;
    let mut body = Vec::with_capacity(raw.len() + 1);
    if compress && raw.len() >= COMPRESS_THRESHOLD {
        body.push(CODEC_LZ4);
        body.extend_from_slice(&lz4_flex::compress_prepend_size(&raw));
    } else {
        body.push(CODEC_RAW);
        body.extend_from_slice(&raw);
    }
    Ok(body)
}

/// Decode a body produced by [`encode_body`]
pub fn decode_body<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    match body.split_first() {
        Some((&CODEC_RAW, rest)) => Ok(bincode::deserialize(rest)?),
        Some((&CODEC_LZ4, rest)) => {
            let raw = lz4_flex::decompress_size_prepended(rest)
                .map_err(|e| Error::Network(format!("Corrupt compressed message: {}", e)))?;
            Ok(bincode::deserialize(&raw)?)
        }
        Some((tag, _)) => Err(Error::Network(format!("Unknown message codec {}", tag))),
        None => Err(Error::Network("Empty message body".into())),
    }
}

/// Read a framed message from a reader
pub async fn read_message<T, R>(reader: &mut R) -> Result<T>
where
    T: DeserializeOwned,
    R: tokio::io::AsyncRead + Unpin,
{
    use tokio::io::AsyncReadExt;

    // Read header
    let mut header_bytes = [0u8; FrameHeader::SIZE];
    reader.read_exact(&mut header_bytes).await?;
    let header = FrameHeader::from_bytes(&header_bytes);
    if header.length as usize > MAX_FRAME_SIZE {
        return Err(Error::Network(format!(
            "Frame of {} bytes exceeds the {} byte limit",
            header.length, MAX_FRAME_SIZE
        )));
    }

    // Read body
    let mut body = vec![0u8; header.length as usize];
    reader.read_exact(&mut body).await?;

    // Verify checksum
    if crc32fast::hash(&body) != header.checksum {
        return Err(Error::Network("Message checksum mismatch".into()));
    }

    decode_body(&body)
}

/// Write a framed message to a writer
pub async fn write_message<T, W>(writer: &mut W, message: &T, compress: bool) -> Result<()>
where
    T: Serialize,
    W: tokio::io::AsyncWrite + Unpin,
{
    use tokio::io::AsyncWriteExt;

    let body = encode_body(message, compress)?;
    let header = FrameHeader::new(&body)?;

    writer.write_all(&header.to_bytes()).await?;
    writer.write_all(&body).await?;
    writer.flush().await?;

    Ok(())
}
