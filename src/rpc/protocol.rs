//! Daemon Protocol
//!
//! Requests a client sends to a storage daemon and the matching replies.

use serde::{Deserialize, Serialize};

use crate::error::{Error, ErrorKind, Result};
use crate::metadata::{DirEntry, ExtendedDirEntry, MetadataEntry};

/// One chunk-local write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkWrite {
    pub chunk_id: u64,
    /// Offset inside the chunk
    pub offset: u64,
    pub data: Vec<u8>,
}

/// One chunk-local read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRead {
    pub chunk_id: u64,
    /// Offset inside the chunk
    pub offset: u64,
    pub len: u64,
}

/// Bytes returned for one [`ChunkRead`]; shorter than requested when the
/// chunk holds less data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkData {
    pub chunk_id: u64,
    pub data: Vec<u8>,
}

/// Chunk capacity of one daemon, or of the whole cluster once merged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChunkStat {
    pub chunk_size: u64,
    pub chunk_total: u64,
    pub chunk_free: u64,
}

/// Client to daemon requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Request {
    /// Liveness check
    Ping,

    // ========== Metadata ==========
    /// Insert an entry, failing if the path exists
    CreateMetadata { path: String, entry: MetadataEntry },

    /// Fetch an entry
    StatMetadata { path: String },

    /// Delete an entry and any local chunks of the path
    RemoveMetadata { path: String },

    /// Replace an entry, optionally moving it to a new key
    UpdateMetadata {
        old_path: String,
        new_path: String,
        entry: MetadataEntry,
    },

    /// Grow the recorded size, reserving an offset for appends
    IncreaseSize {
        path: String,
        io_size: u64,
        offset: u64,
        append: bool,
    },

    /// Lower the recorded size
    DecreaseSize { path: String, size: u64 },

    /// First-level children of a directory
    GetDirents { dir: String },

    /// First-level children with size and change time
    GetDirentsExtended { dir: String },

    // ========== Data ==========
    /// Write chunk pieces
    WriteChunks { path: String, chunks: Vec<ChunkWrite> },

    /// Read chunk pieces
    ReadChunks { path: String, chunks: Vec<ChunkRead> },

    /// Cut chunk `chunk_id` to `keep_bytes` (dropping it when 0) and drop
    /// every later chunk
    TruncateChunks {
        path: String,
        chunk_id: u64,
        keep_bytes: u64,
    },

    /// Drop every chunk of a path
    RemoveChunks { path: String },

    /// Report chunk capacity
    ChunkStat,
}

/// Daemon to client replies
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Response {
    Ok,
    Pong { node_id: String },
    Metadata(MetadataEntry),
    /// Reserved offset for a size increase
    Offset(Option<u64>),
    Dirents(Vec<DirEntry>),
    ExtendedDirents(Vec<ExtendedDirEntry>),
    /// Bytes written
    Written(u64),
    Data(Vec<ChunkData>),
    ChunkStat(ChunkStat),
    Error { kind: ErrorKind, message: String },
}

impl Request {
    pub fn serialize(&self) -> std::result::Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    pub fn deserialize(bytes: &[u8]) -> std::result::Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }

    /// Get the request type name (for logging)
    pub fn type_name(&self) -> &'static str {
        match self {
            Request::Ping => "Ping",
            Request::CreateMetadata { .. } => "CreateMetadata",
            Request::StatMetadata { .. } => "StatMetadata",
            Request::RemoveMetadata { .. } => "RemoveMetadata",
            Request::UpdateMetadata { .. } => "UpdateMetadata",
            Request::IncreaseSize { .. } => "IncreaseSize",
            Request::DecreaseSize { .. } => "DecreaseSize",
            Request::GetDirents { .. } => "GetDirents",
            Request::GetDirentsExtended { .. } => "GetDirentsExtended",
            Request::WriteChunks { .. } => "WriteChunks",
            Request::ReadChunks { .. } => "ReadChunks",
            Request::TruncateChunks { .. } => "TruncateChunks",
            Request::RemoveChunks { .. } => "RemoveChunks",
            Request::ChunkStat => "ChunkStat",
        }
    }
}

impl Response {
    pub fn serialize(&self) -> std::result::Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    pub fn deserialize(bytes: &[u8]) -> std::result::Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }

    /// Wrap a handler error for the wire
    pub fn from_error(err: &Error) -> Self {
        Response::Error {
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    /// Turn an error reply back into an `Err`
    pub fn into_result(self) -> Result<Response> {
        match self {
            Response::Error { kind, message } => Err(Error::from_kind(kind, message)),
            other => Ok(other),
        }
    }

    /// Get the response type name (for logging)
    pub fn type_name(&self) -> &'static str {
        match self {
            Response::Ok => "Ok",
            Response::Pong { .. } => "Pong",
            Response::Metadata(_) => "Metadata",
            Response::Offset(_) => "Offset",
            Response::Dirents(_) => "Dirents",
            Response::ExtendedDirents(_) => "ExtendedDirents",
            Response::Written(_) => "Written",
            Response::Data(_) => "Data",
            Response::ChunkStat(_) => "ChunkStat",
            Response::Error { .. } => "Error",
        }
    }
}

/// Largest message body accepted in either direction
pub const MAX_FRAME_SIZE: usize = 1 << 30;

/// Body length as carried in a frame header, if it is within the limit
pub fn frame_length(len: usize) -> Result<u32> {
    if len > MAX_FRAME_SIZE {
        return Err(Error::Network(format!(
            "Message body of {} bytes exceeds the {} byte frame limit",
            len, MAX_FRAME_SIZE
        )));
    }
    u32::try_from(len).map_err(|_| Error::Network(format!("Message body of {} bytes", len)))
}

/// Frame header for length-prefixed messages
#[derive(Debug, Clone, Copy)]
pub struct FrameHeader {
    /// Body length
    pub length: u32,
    /// Body checksum
    pub checksum: u32,
}

impl FrameHeader {
    /// Header size in bytes
    pub const SIZE: usize = 8;

    /// Create a new frame header; fails for bodies over [`MAX_FRAME_SIZE`]
    pub fn new(data: &[u8]) -> Result<Self> {
        Ok(Self {
            length: frame_length(data.len())?,
            checksum: crc32fast::hash(data),
        })
    }

    /// Serialize header to bytes
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..4].copy_from_slice(&self.length.to_le_bytes());
        bytes[4..8].copy_from_slice(&self.checksum.to_le_bytes());
        bytes
    }

    /// Deserialize header from bytes
    pub fn from_bytes(bytes: &[u8; Self::SIZE]) -> Self {
        let [l0, l1, l2, l3, c0, c1, c2, c3] = *bytes;
        Self {
            length: u32::from_le_bytes([l0, l1, l2, l3]),
            checksum: u32::from_le_bytes([c0, c1, c2, c3]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::S_IFREG;

    #[test]
    fn test_request_serialization() {
        let request = Request::WriteChunks {
            path: "/out/ckpt.0".into(),
            chunks: vec![ChunkWrite {
                chunk_id: 3,
                offset: 17,
                data: b"payload".to_vec(),
            }],
        };

        let bytes = request.serialize().unwrap();
        match Request::deserialize(&bytes).unwrap() {
            Request::WriteChunks { path, chunks } => {
                assert_eq!(path, "/out/ckpt.0");
                assert_eq!(chunks[0].chunk_id, 3);
                assert_eq!(chunks[0].data, b"payload");
            }
            other => panic!("unexpected {}", other.type_name()),
        }
    }

    #[test]
    fn test_error_reply_becomes_err() {
        let reply = Response::from_error(&Error::NotFound("/gone".into()));
        let err = reply.into_result().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let ok = Response::Metadata(MetadataEntry::new(S_IFREG | 0o644));
        assert!(ok.into_result().is_ok());
    }

    #[test]
    fn test_frame_header() {
        let data = b"test message data";
        let header = FrameHeader::new(data).unwrap();
        let restored = FrameHeader::from_bytes(&header.to_bytes());

        assert_eq!(header.length, restored.length);
        assert_eq!(header.checksum, restored.checksum);
    }

    #[test]
    fn test_frame_length_limit() {
        assert_eq!(frame_length(17).unwrap(), 17);
        assert_eq!(frame_length(MAX_FRAME_SIZE).unwrap() as usize, MAX_FRAME_SIZE);
        assert!(matches!(frame_length(MAX_FRAME_SIZE + 1), Err(Error::Network(_))));
        assert!(frame_length(5 << 30).is_err());
    }
}
