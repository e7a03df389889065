//! Storage Daemon
//!
//! Server half of every forwarded call. A daemon owns one metadata store
//! and one chunk storage and answers [`Request`]s with [`Response`]s; it
//! knows nothing about layouts, placement, or replicas.

mod server;
mod storage;

pub use server::DaemonServer;
pub use storage::ChunkStorage;

use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::BurstConfig;
use crate::error::{Error, Result};
use crate::metadata::{self, MetadataEntry, MetadataStore, S_IFDIR};
use crate::rpc::{ChunkData, Request, Response};

/// Storage daemon request handler
pub struct Daemon {
    node_id: String,
    store: Arc<dyn MetadataStore>,
    chunks: ChunkStorage,
}

impl Daemon {
    /// Create a daemon and make sure the root directory entry exists
    pub fn new(node_id: String, store: Arc<dyn MetadataStore>, chunks: ChunkStorage) -> Result<Self> {
        match store.put_if_absent("/", &MetadataEntry::new(S_IFDIR | 0o777)) {
            Ok(()) | Err(Error::AlreadyExists(_)) => {}
            Err(e) => return Err(e),
        }

        Ok(Self {
            node_id,
            store,
            chunks,
        })
    }

    /// Create a daemon from configuration
    pub fn from_config(config: &BurstConfig) -> Result<Self> {
        let store = metadata::open_store(config)?;
        let chunks = ChunkStorage::new(
            config.chunk_dir(),
            config.chunk_layout().min_chunk_size(),
            config.node.capacity_chunks,
        )?;
        Self::new(config.node.id.clone(), store, chunks)
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Handle one request. Failures become [`Response::Error`].
    pub fn handle(&self, request: Request) -> Response {
        let name = request.type_name();
        match self.dispatch(request) {
            Ok(response) => response,
            Err(e) => {
                debug!("{} failed on {}: {}", name, self.node_id, e);
                Response::from_error(&e)
            }
        }
    }

    fn dispatch(&self, request: Request) -> Result<Response> {
        match request {
            Request::Ping => Ok(Response::Pong {
                node_id: self.node_id.clone(),
            }),

            Request::CreateMetadata { path, entry } => {
                self.store.put_if_absent(&path, &entry)?;
                Ok(Response::Ok)
            }

            Request::StatMetadata { path } => Ok(Response::Metadata(self.store.get(&path)?)),

            Request::RemoveMetadata { path } => {
                let entry = self.store.get(&path)?;
                self.store.remove(&path)?;
                if entry.is_regular() {
                    if let Err(e) = self.chunks.remove_chunks(&path) {
                        warn!("Could not drop local chunks of removed file {}: {}", path, e);
                    }
                }
                Ok(Response::Metadata(entry))
            }

            Request::UpdateMetadata {
                old_path,
                new_path,
                entry,
            } => {
                self.store.update(&old_path, &new_path, &entry)?;
                Ok(Response::Ok)
            }

            Request::IncreaseSize {
                path,
                io_size,
                offset,
                append,
            } => Ok(Response::Offset(
                self.store.increase_size(&path, io_size, offset, append)?,
            )),

            Request::DecreaseSize { path, size } => {
                self.store.decrease_size(&path, size)?;
                Ok(Response::Ok)
            }

            Request::GetDirents { dir } => Ok(Response::Dirents(self.store.get_dirents(&dir)?)),

            Request::GetDirentsExtended { dir } => Ok(Response::ExtendedDirents(
                self.store.get_dirents_extended(&dir)?,
            )),

            Request::WriteChunks { path, chunks } => {
                let mut written = 0;
                for chunk in &chunks {
                    written += self
                        .chunks
                        .write_chunk(&path, chunk.chunk_id, chunk.offset, &chunk.data)?;
                }
                Ok(Response::Written(written))
            }

            Request::ReadChunks { path, chunks } => {
                let mut data = Vec::with_capacity(chunks.len());
                for chunk in chunks {
                    data.push(ChunkData {
                        chunk_id: chunk.chunk_id,
                        data: self
                            .chunks
                            .read_chunk(&path, chunk.chunk_id, chunk.offset, chunk.len)?,
                    });
                }
                Ok(Response::Data(data))
            }

            Request::TruncateChunks {
                path,
                chunk_id,
                keep_bytes,
            } => {
                self.chunks.truncate_chunks(&path, chunk_id, keep_bytes)?;
                Ok(Response::Ok)
            }

            Request::RemoveChunks { path } => {
                self.chunks.remove_chunks(&path)?;
                Ok(Response::Ok)
            }

            Request::ChunkStat => Ok(Response::ChunkStat(self.chunks.stat()?)),
        }
    }
}
