//! stat, statx and statfs

use serde::Serialize;

use super::Coordinator;
use crate::error::Result;
use crate::metadata::MetadataEntry;
use crate::placement::inode_of;

/// Name length limit reported by statfs
const NAME_MAX: u64 = 255;

/// Result of `stat`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileStat {
    pub ino: u64,
    pub mode: u32,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    pub blksize: u64,
    pub blocks: u64,
    pub atime: i64,
    pub mtime: i64,
    pub ctime: i64,
}

/// Result of `statx`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileStatx {
    /// Fields the caller may rely on; always zero as none are guaranteed
    pub mask: u32,
    pub attributes: u64,
    pub attributes_mask: u64,
    pub ino: u64,
    pub mode: u32,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    pub blksize: u64,
    pub blocks: u64,
    pub atime: i64,
    pub btime: i64,
    pub ctime: i64,
    pub mtime: i64,
}

/// Result of `statfs`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FsStats {
    pub bsize: u64,
    pub frsize: u64,
    pub blocks: u64,
    pub bfree: u64,
    pub bavail: u64,
    pub files: u64,
    pub ffree: u64,
    pub namelen: u64,
}

impl FileStat {
    fn from_entry(path: &str, entry: &MetadataEntry, blksize: u64) -> Self {
        Self {
            ino: inode_of(path),
            mode: entry.mode,
            nlink: entry.link_count,
            uid: entry.uid,
            gid: entry.gid,
            size: entry.size,
            blksize,
            blocks: entry.blocks.max(0) as u64,
            atime: entry.atime,
            mtime: entry.mtime,
            ctime: entry.ctime,
        }
    }
}

impl From<FileStat> for FileStatx {
    fn from(st: FileStat) -> Self {
        Self {
            mask: 0,
            attributes: 0,
            attributes_mask: 0,
            ino: st.ino,
            mode: st.mode,
            nlink: st.nlink,
            uid: st.uid,
            gid: st.gid,
            size: st.size,
            blksize: st.blksize,
            blocks: st.blocks,
            atime: st.atime,
            btime: st.atime,
            ctime: st.ctime,
            mtime: st.mtime,
        }
    }
}

impl Coordinator {
    /// Attributes of `path`. Size and timestamps come from the end of any
    /// rename chain.
    pub async fn stat(&self, path: &str, follow_links: bool) -> Result<FileStat> {
        let (_, entry) = self.resolve(path, follow_links).await?;
        let blksize = self.forwarder().layout().min_chunk_size();
        Ok(FileStat::from_entry(path, &entry, blksize))
    }

    /// Extended attributes of `path`; the result mask is always empty
    pub async fn statx(&self, path: &str, follow_links: bool) -> Result<FileStatx> {
        Ok(self.stat(path, follow_links).await?.into())
    }

    /// File system capacity in chunks
    pub async fn statfs(&self) -> Result<FsStats> {
        let chunks = self.forwarder().chunk_stat().await?;
        Ok(FsStats {
            bsize: chunks.chunk_size,
            frsize: chunks.chunk_size,
            blocks: chunks.chunk_total,
            bfree: chunks.chunk_free,
            bavail: chunks.chunk_free,
            files: 0,
            ffree: 0,
            namelen: NAME_MAX,
        })
    }
}
