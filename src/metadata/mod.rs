//! Metadata Module
//!
//! The per-path metadata record and the key-value contract the daemons
//! expose for it. Keys are absolute paths.

mod entry;
mod memory;
mod sqlite;

pub use entry::{
    DirEntry, ExtendedDirEntry, FileType, MetadataEntry, S_IFDIR, S_IFLNK, S_IFMT, S_IFREG,
    TOMBSTONE,
};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use std::sync::Arc;

use crate::config::{BurstConfig, MetadataBackend};
use crate::error::Result;

/// Metadata key-value contract.
///
/// Every mutation is atomic with respect to other calls on the same store.
/// Missing keys fail with `Error::NotFound`, conflicting inserts with
/// `Error::AlreadyExists`.
pub trait MetadataStore: Send + Sync {
    /// Fetch the entry for `path`
    fn get(&self, path: &str) -> Result<MetadataEntry>;

    /// Insert or overwrite the entry for `path`
    fn put(&self, path: &str, entry: &MetadataEntry) -> Result<()>;

    /// Insert the entry only if `path` has none
    fn put_if_absent(&self, path: &str, entry: &MetadataEntry) -> Result<()>;

    /// Delete the entry for `path`
    fn remove(&self, path: &str) -> Result<()>;

    fn exists(&self, path: &str) -> Result<bool>;

    /// Replace the entry stored under `old_path` with `entry` stored under
    /// `new_path`, dropping the old key when the two differ
    fn update(&self, old_path: &str, new_path: &str, entry: &MetadataEntry) -> Result<()>;

    /// Grow the recorded size after a write of `io_size` bytes.
    ///
    /// Without `append` the size becomes `max(size, offset + io_size)` and
    /// `offset` is returned. With `append` the current size is returned as
    /// the reserved starting offset and the size grows by `io_size` in the
    /// same atomic step. `None` means no starting offset could be computed.
    fn increase_size(
        &self,
        path: &str,
        io_size: u64,
        offset: u64,
        append: bool,
    ) -> Result<Option<u64>>;

    /// Set the recorded size to `size`
    fn decrease_size(&self, path: &str, size: u64) -> Result<()>;

    /// Live first-level children of `dir`
    fn get_dirents(&self, dir: &str) -> Result<Vec<DirEntry>>;

    /// Live first-level children of `dir` with size and change time
    fn get_dirents_extended(&self, dir: &str) -> Result<Vec<ExtendedDirEntry>>;
}

/// Open the backend selected in the configuration
pub fn open_store(config: &BurstConfig) -> Result<Arc<dyn MetadataStore>> {
    match config.metadata.backend {
        MetadataBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        MetadataBackend::Sqlite => {
            std::fs::create_dir_all(&config.node.data_dir)?;
            Ok(Arc::new(SqliteStore::open(&config.metadata_path())?))
        }
    }
}

/// Key prefix shared by all children of `dir`
pub(crate) fn child_prefix(dir: &str) -> String {
    if dir.ends_with('/') {
        dir.to_string()
    } else {
        format!("{}/", dir)
    }
}

/// Name of `path` if it is a direct child under `prefix`
pub(crate) fn first_level_name<'a>(prefix: &str, path: &'a str) -> Option<&'a str> {
    let rest = path.strip_prefix(prefix)?;
    if rest.is_empty() || rest.contains('/') {
        None
    } else {
        Some(rest)
    }
}

/// Size rule shared by the backends: returns the new size and the
/// reserved offset
pub(crate) fn grown_size(current: u64, io_size: u64, offset: u64, append: bool) -> (u64, u64) {
    if append {
        (current + io_size, current)
    } else {
        (current.max(offset + io_size), offset)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_level_name() {
        assert_eq!(first_level_name("/d/", "/d/x"), Some("x"));
        assert_eq!(first_level_name("/d/", "/d/x/y"), None);
        assert_eq!(first_level_name("/d/", "/d/"), None);
        assert_eq!(first_level_name("/d/", "/dx"), None);
        assert_eq!(child_prefix("/"), "/");
        assert_eq!(child_prefix("/d"), "/d/");
    }
}
