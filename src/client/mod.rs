//! Client Coordinator
//!
//! Implements POSIX-style file operations on top of the [`Forwarder`]:
//! open/create/remove/rename/truncate, reads and writes with replica
//! handling, stat, and directory listings. All process-wide state lives in
//! an explicit [`Context`] shared by every [`Coordinator`] clone.

mod dir;
mod file_ops;
mod handles;
mod io;
mod posix;
mod stat;

pub use dir::DirentFormat;
pub use handles::{FileMap, OpenDirectory, OpenFile, OpenHandle};
pub use posix::{errno, PosixClient};
pub use stat::{FileStat, FileStatx, FsStats};

use std::sync::Arc;

use crate::config::{BurstConfig, FeatureConfig};
use crate::error::{Error, Result};
use crate::metadata::MetadataEntry;
use crate::rpc::{Forwarder, Transport};

/// Upper bound on symlink and rename hops followed while resolving a path
const MAX_HOPS: usize = 40;

/// Process-wide client state
pub struct Context {
    features: FeatureConfig,
    forwarder: Forwarder,
    files: FileMap,
}

impl Context {
    /// Build the client state for the daemons behind `transport`
    pub fn new(config: &BurstConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        let daemons = transport.num_daemons();
        if daemons == 0 {
            return Err(Error::Config("no daemons configured".into()));
        }
        if config.cluster.replicas as usize >= daemons {
            return Err(Error::Config(format!(
                "{} replicas need more than {} daemons",
                config.cluster.replicas, daemons
            )));
        }

        Ok(Self {
            features: config.features.clone(),
            forwarder: Forwarder::new(transport, config.chunk_layout(), config.cluster.replicas),
            files: FileMap::new(config.client.fd_base),
        })
    }

    pub fn features(&self) -> &FeatureConfig {
        &self.features
    }

    pub fn forwarder(&self) -> &Forwarder {
        &self.forwarder
    }

    pub fn files(&self) -> &FileMap {
        &self.files
    }
}

/// File operation coordinator
#[derive(Clone)]
pub struct Coordinator {
    ctx: Arc<Context>,
}

impl Coordinator {
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }

    /// Coordinator for the daemons behind `transport`
    pub fn with_transport(config: &BurstConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        Ok(Self::new(Arc::new(Context::new(config, transport)?)))
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    fn forwarder(&self) -> &Forwarder {
        &self.ctx.forwarder
    }

    fn features(&self) -> &FeatureConfig {
        &self.ctx.features
    }

    fn files(&self) -> &FileMap {
        &self.ctx.files
    }

    fn replicas(&self) -> u32 {
        self.ctx.forwarder.replicas()
    }

    /// Resolve `path` to the path its data is stored under.
    ///
    /// Symlinks are followed when `follow_links` is set. A tombstone at the
    /// start is not found; from there rename forwarding pointers are
    /// walked until an entry without a target.
    pub(crate) async fn resolve(&self, path: &str, follow_links: bool) -> Result<(String, MetadataEntry)> {
        let mut current = path.to_string();
        let mut entry = self.forwarder().get_metadata(&current).await?;

        let mut links = 0;
        while follow_links && self.features().symlinks && entry.is_link() {
            links += 1;
            if links > MAX_HOPS {
                return Err(Error::SymlinkLoop(path.to_string()));
            }
            current = entry.target_path.clone();
            entry = self.forwarder().get_metadata(&current).await?;
        }

        if entry.is_tombstone() {
            return Err(Error::NotFound(path.to_string()));
        }
        if !self.features().rename {
            return Ok((current, entry));
        }

        let mut hops = 0;
        while entry.is_renamed() {
            hops += 1;
            if hops > MAX_HOPS || entry.target_path == current {
                return Err(Error::SymlinkLoop(path.to_string()));
            }
            current = entry.target_path.clone();
            entry = self.forwarder().get_metadata(&current).await?;
        }
        Ok((current, entry))
    }

    /// Paths of every hop behind a renamed entry, ending with the path the
    /// data lives under
    async fn rename_chain(&self, entry: &MetadataEntry) -> Result<Vec<String>> {
        let mut chain = Vec::new();
        let mut next = entry.target_path.clone();
        while !next.is_empty() {
            if chain.len() >= MAX_HOPS || chain.contains(&next) {
                break;
            }
            let hop = self.forwarder().get_metadata(&next).await?;
            chain.push(next);
            next = if hop.is_renamed() { hop.target_path } else { String::new() };
        }
        Ok(chain)
    }

    /// Fail unless the parent of `path` is an existing directory
    async fn check_parent(&self, path: &str) -> Result<()> {
        let parent = parent_of(path);
        if parent == "/" {
            return Ok(());
        }
        let (_, entry) = self.resolve(parent, true).await?;
        if !entry.is_dir() {
            return Err(Error::NotADirectory(parent.to_string()));
        }
        Ok(())
    }
}

/// Parent directory of an absolute path
pub(crate) fn parent_of(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) | None => "/",
        Some(idx) => &trimmed[..idx],
    }
}

/// `dir/name` without doubling the slash under the root
pub(crate) fn join_path(dir: &str, name: &str) -> String {
    if dir.ends_with('/') {
        format!("{}{}", dir, name)
    } else {
        format!("{}/{}", dir, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parent_of() {
        assert_eq!(parent_of("/a"), "/");
        assert_eq!(parent_of("/a/b"), "/a");
        assert_eq!(parent_of("/a/b/"), "/a");
        assert_eq!(parent_of("/"), "/");
    }

    #[test]
    fn test_join_path() {
        assert_eq!(join_path("/", "x"), "/x");
        assert_eq!(join_path("/d", "x"), "/d/x");
    }
}
