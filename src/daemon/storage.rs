//! Chunk storage
//!
//! One directory per file path under the base directory, one file per
//! chunk id inside it. Only the chunks this daemon was chosen for exist
//! here, so a path's directory is usually sparse.

use std::ffi::CString;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::Result;
use crate::rpc::ChunkStat;

/// File-per-chunk storage
pub struct ChunkStorage {
    /// Base directory for chunk files
    base_dir: PathBuf,

    /// Nominal chunk size reported in statistics
    chunk_size: u64,

    /// Advertised capacity in chunks (0 = derive from free disk space)
    capacity_chunks: u64,
}

impl ChunkStorage {
    /// Create a new chunk storage
    pub fn new(base_dir: PathBuf, chunk_size: u64, capacity_chunks: u64) -> Result<Self> {
        fs::create_dir_all(&base_dir)?;

        Ok(Self {
            base_dir,
            chunk_size,
            capacity_chunks,
        })
    }

    /// Directory holding the chunks of `path`
    fn file_dir(&self, path: &str) -> PathBuf {
        let mut escaped = String::with_capacity(path.len() + 8);
        for c in path.chars() {
            match c {
                '%' => escaped.push_str("%25"),
                '/' => escaped.push_str("%2F"),
                other => escaped.push(other),
            }
        }
        self.base_dir.join(escaped)
    }

    fn chunk_path(&self, path: &str, chunk_id: u64) -> PathBuf {
        self.file_dir(path).join(chunk_id.to_string())
    }

    /// Write `data` at `offset` inside a chunk, creating it as needed
    pub fn write_chunk(&self, path: &str, chunk_id: u64, offset: u64, data: &[u8]) -> Result<u64> {
        let dir = self.file_dir(path);
        fs::create_dir_all(&dir)?;

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(dir.join(chunk_id.to_string()))?;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)?;

        debug!("Wrote {} bytes to chunk {} of {} at {}", data.len(), chunk_id, path, offset);
        Ok(data.len() as u64)
    }

    /// Read up to `len` bytes at `offset` inside a chunk.
    ///
    /// A missing chunk or a read past its end yields fewer bytes, never an
    /// error.
    pub fn read_chunk(&self, path: &str, chunk_id: u64, offset: u64, len: u64) -> Result<Vec<u8>> {
        let mut file = match File::open(self.chunk_path(path, chunk_id)) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        file.seek(SeekFrom::Start(offset))?;
        let mut data = Vec::with_capacity(len as usize);
        file.take(len).read_to_end(&mut data)?;
        Ok(data)
    }

    /// Cut chunk `chunk_id` to `keep_bytes` and drop all later chunks.
    /// With `keep_bytes == 0` the chunk itself is dropped too.
    pub fn truncate_chunks(&self, path: &str, chunk_id: u64, keep_bytes: u64) -> Result<()> {
        let dir = self.file_dir(path);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        for entry in entries {
            let entry = entry?;
            let Some(id) = entry.file_name().to_str().and_then(|n| n.parse::<u64>().ok()) else {
                continue;
            };

            if id > chunk_id || (id == chunk_id && keep_bytes == 0) {
                fs::remove_file(entry.path())?;
            } else if id == chunk_id {
                let file = OpenOptions::new().write(true).open(entry.path())?;
                if file.metadata()?.len() > keep_bytes {
                    file.set_len(keep_bytes)?;
                }
            }
        }

        debug!("Truncated {} at chunk {} (+{} bytes)", path, chunk_id, keep_bytes);
        Ok(())
    }

    /// Drop every chunk of `path`
    pub fn remove_chunks(&self, path: &str) -> Result<()> {
        match fs::remove_dir_all(self.file_dir(path)) {
            Ok(()) => {
                debug!("Removed chunks of {}", path);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Number of chunk files currently stored
    pub fn used_chunks(&self) -> Result<u64> {
        let mut used = 0;
        for dir in fs::read_dir(&self.base_dir)? {
            let dir = dir?;
            if dir.file_type()?.is_dir() {
                used += fs::read_dir(dir.path())?.count() as u64;
            }
        }
        Ok(used)
    }

    /// Capacity statistics
    pub fn stat(&self) -> Result<ChunkStat> {
        if self.capacity_chunks > 0 {
            let used = self.used_chunks()?;
            return Ok(ChunkStat {
                chunk_size: self.chunk_size,
                chunk_total: self.capacity_chunks,
                chunk_free: self.capacity_chunks.saturating_sub(used),
            });
        }

        let (total_bytes, free_bytes) = disk_space(&self.base_dir)?;
        Ok(ChunkStat {
            chunk_size: self.chunk_size,
            chunk_total: total_bytes / self.chunk_size,
            chunk_free: free_bytes / self.chunk_size,
        })
    }
}

/// Total and available bytes of the file system holding `dir`
fn disk_space(dir: &Path) -> Result<(u64, u64)> {
    let c_path = CString::new(dir.as_os_str().as_bytes())
        .map_err(|e| crate::Error::InvalidArgument(e.to_string()))?;
    // SAFETY: statvfs only writes into the zeroed struct we own
    let mut stats: libc::statvfs = unsafe { std::mem::zeroed() };
    if unsafe { libc::statvfs(c_path.as_ptr(), &mut stats) } != 0 {
        return Err(std::io::Error::last_os_error().into());
    }
    let frsize = stats.f_frsize as u64;
    Ok((stats.f_blocks as u64 * frsize, stats.f_bavail as u64 * frsize))
}
