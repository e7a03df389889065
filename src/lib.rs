//! BurstFS - Distributed Burst-Buffer File System
//!
//! A client coordination core that maps POSIX-style file operations onto a
//! set of storage daemons. File data is cut into chunks, every chunk is
//! routed to a daemon by hashing, and per-path metadata lives in a
//! key-value store spread over the same daemons.
//!
//! # Architecture
//!
//! - [`layout`]: offset to chunk id arithmetic, flat or progressive
//! - [`placement`]: deterministic routing of chunks and metadata to daemons
//! - [`metadata`]: the metadata entry and the store contract the daemons
//!   implement, with in-memory and SQLite backends
//! - [`daemon`]: the storage daemon answering forwarded requests
//! - [`rpc`]: request protocol, transports, and the forwarding layer
//! - [`client`]: the file operation coordinator and a blocking POSIX facade
//!
//! # Features
//!
//! - Atomic append offsets reserved by the metadata store
//! - Rename through forwarding entries, including cycle collapse
//! - Best-effort replicas for metadata and data with read retries
//! - Progressive file layout with growing stripe sizes

pub mod client;
pub mod config;
pub mod daemon;
pub mod error;
pub mod layout;
pub mod metadata;
pub mod placement;
pub mod rpc;

pub use config::BurstConfig;
pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::client::{Context, Coordinator, PosixClient};
    pub use crate::config::BurstConfig;
    pub use crate::daemon::{Daemon, DaemonServer};
    pub use crate::error::{Error, ErrorKind, Result};
    pub use crate::layout::ChunkLayout;
    pub use crate::metadata::{MetadataEntry, MetadataStore};
    pub use crate::placement::ChunkPlacement;
    pub use crate::rpc::{Forwarder, LocalTransport, TcpTransport, Transport};
}
