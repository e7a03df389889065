//! Metadata entry model

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Block count marking an entry superseded by a rename
pub const TOMBSTONE: i64 = -1;

/// File type bits
pub const S_IFMT: u32 = libc::S_IFMT as u32;
pub const S_IFREG: u32 = libc::S_IFREG as u32;
pub const S_IFDIR: u32 = libc::S_IFDIR as u32;
pub const S_IFLNK: u32 = libc::S_IFLNK as u32;

/// Metadata record for one path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataEntry {
    /// File type and permission bits
    pub mode: u32,
    /// Logical file size in bytes
    pub size: u64,
    /// Block usage, or [`TOMBSTONE`] after a rename
    pub blocks: i64,
    /// Symlink target or rename forwarding pointer, empty otherwise
    pub target_path: String,
    pub uid: u32,
    pub gid: u32,
    pub link_count: u32,
    /// Timestamps in seconds since the epoch
    pub atime: i64,
    pub mtime: i64,
    pub ctime: i64,
}

impl MetadataEntry {
    /// New entry with the given mode, owned by the calling process
    pub fn new(mode: u32) -> Self {
        let now = Utc::now().timestamp();
        // SAFETY: getuid/getgid never fail
        let (uid, gid) = unsafe { (libc::getuid(), libc::getgid()) };
        Self {
            mode,
            size: 0,
            blocks: 0,
            target_path: String::new(),
            uid,
            gid,
            link_count: 1,
            atime: now,
            mtime: now,
            ctime: now,
        }
    }

    /// New symbolic link pointing at `target`
    pub fn symlink(target: &str) -> Self {
        let mut entry = Self::new(S_IFLNK | 0o777);
        entry.target_path = target.to_string();
        entry
    }

    pub fn is_dir(&self) -> bool {
        self.mode & S_IFMT == S_IFDIR
    }

    pub fn is_regular(&self) -> bool {
        self.mode & S_IFMT == S_IFREG
    }

    pub fn is_link(&self) -> bool {
        self.mode & S_IFMT == S_IFLNK
    }

    /// Superseded by a rename
    pub fn is_tombstone(&self) -> bool {
        self.blocks == TOMBSTONE
    }

    /// Points at another entry through a rename
    pub fn is_renamed(&self) -> bool {
        !self.is_link() && !self.target_path.is_empty()
    }

    /// Listing classification
    pub fn file_type(&self) -> FileType {
        if self.is_dir() {
            FileType::Directory
        } else if self.is_link() {
            FileType::Symlink
        } else {
            FileType::Regular
        }
    }

    pub fn serialize(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }
}

/// Entry type reported by directory listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FileType {
    Regular,
    Directory,
    Symlink,
}

impl FileType {
    /// `d_type` value used in dirent records
    pub fn d_type(self) -> u8 {
        match self {
            FileType::Regular => libc::DT_REG,
            FileType::Directory => libc::DT_DIR,
            FileType::Symlink => libc::DT_LNK,
        }
    }
}

/// First-level directory entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    pub name: String,
    pub file_type: FileType,
}

/// Directory entry with size and change time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtendedDirEntry {
    pub name: String,
    pub file_type: FileType,
    pub size: u64,
    pub ctime: i64,
}
