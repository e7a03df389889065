//! Namespace operations: open, create, remove, rename, truncate, seek,
//! descriptor management and symlinks

use std::sync::Arc;

use tracing::{debug, warn};

use super::{Coordinator, OpenFile, OpenHandle};
use crate::error::{Error, Result};
use crate::metadata::{MetadataEntry, S_IFDIR, S_IFMT, S_IFREG};

/// Largest zero block written at once when a truncate grows a file
const ZERO_FILL_BLOCK: u64 = 8 * 1024 * 1024;

fn is_write_intent(flags: i32) -> bool {
    let mode = flags & libc::O_ACCMODE;
    mode == libc::O_WRONLY || mode == libc::O_RDWR
}

impl Coordinator {
    /// Open `path` and return a descriptor
    pub async fn open(&self, path: &str, mode: u32, flags: i32) -> Result<i32> {
        if flags & libc::O_PATH != 0 {
            return Err(Error::NotSupported(format!("O_PATH on {}", path)));
        }

        if flags & libc::O_CREAT != 0 {
            if flags & libc::O_DIRECTORY != 0 {
                return Err(Error::NotSupported(format!("O_CREAT with O_DIRECTORY on {}", path)));
            }
            match self.create(path, (mode & !S_IFMT) | S_IFREG).await {
                Ok(()) => {
                    let file = OpenFile::new(path, flags);
                    return Ok(self.files().add(OpenHandle::File(Arc::new(file))));
                }
                // Lenient: without O_EXCL an existing file is opened instead
                Err(Error::AlreadyExists(_)) if flags & libc::O_EXCL == 0 => {
                    debug!("{} exists, opening it", path);
                }
                Err(e) => return Err(e),
            }
        }

        if flags & libc::O_NOFOLLOW != 0 && self.features().symlinks {
            let entry = self.forwarder().get_metadata(path).await?;
            if entry.is_link() {
                return Err(Error::SymlinkLoop(path.to_string()));
            }
        }

        let (data_path, entry) = self.resolve(path, true).await?;
        if entry.is_dir() {
            return self.opendir(&data_path).await;
        }
        if flags & libc::O_DIRECTORY != 0 {
            return Err(Error::NotADirectory(path.to_string()));
        }

        if flags & libc::O_TRUNC != 0 && is_write_intent(flags) && entry.size > 0 {
            self.shrink(&data_path, entry.size, 0).await?;
        }

        let file = OpenFile::new(data_path, flags);
        Ok(self.files().add(OpenHandle::File(Arc::new(file))))
    }

    /// Create a file or directory entry on every metadata copy.
    ///
    /// Succeeds if any copy was created; otherwise reports the first error.
    pub async fn create(&self, path: &str, mode: u32) -> Result<()> {
        let mode = match mode & S_IFMT {
            0 => mode | S_IFREG,
            S_IFREG | S_IFDIR => mode,
            t if t == libc::S_IFCHR as u32
                || t == libc::S_IFBLK as u32
                || t == libc::S_IFIFO as u32
                || t == libc::S_IFSOCK as u32 =>
            {
                return Err(Error::NotSupported(format!("special file type {:o} for {}", t, path)));
            }
            t => return Err(Error::InvalidArgument(format!("file type {:o} for {}", t, path))),
        };

        if self.features().create_check_parents {
            self.check_parent(path).await?;
        }

        let entry = MetadataEntry::new(mode);
        let mut created = false;
        let mut first_err = None;
        for copy in 0..=self.replicas() {
            match self.forwarder().create(path, &entry, copy).await {
                Ok(()) => created = true,
                Err(e) => {
                    if copy > 0 {
                        warn!("Creating copy {} of {} failed: {}", copy, path, e);
                    }
                    first_err.get_or_insert(e);
                }
            }
        }

        match (created, first_err) {
            (true, _) => Ok(()),
            (false, Some(e)) => Err(e),
            (false, None) => Err(Error::RemoteIo(path.to_string())),
        }
    }

    /// Create a directory
    pub async fn mkdir(&self, path: &str, mode: u32) -> Result<()> {
        self.create(path, S_IFDIR | (mode & !S_IFMT)).await
    }

    /// Check that `path` exists
    pub async fn access(&self, path: &str, follow_links: bool) -> Result<()> {
        self.resolve(path, follow_links).await.map(|_| ())
    }

    /// Remove a file or symlink.
    ///
    /// For a renamed file, the entries along the rename chain go first so
    /// the data under the original path is deleted along with the name.
    pub async fn remove(&self, path: &str) -> Result<()> {
        let entry = self.forwarder().get_metadata(path).await?;
        if entry.is_dir() {
            return Err(Error::IsADirectory(path.to_string()));
        }
        if entry.is_tombstone() {
            return Err(Error::NotFound(path.to_string()));
        }

        if self.features().rename && entry.is_renamed() {
            for hop in self.rename_chain(&entry).await?.iter().rev() {
                debug!("Removing {} behind {}", hop, path);
                self.forwarder().remove(hop).await?;
            }
        }

        self.forwarder().remove(path).await.map(|_| ())
    }

    /// Rename `old_path` to `new_path`.
    ///
    /// The destination must not exist, with one exception: renaming a file
    /// back onto the tombstone it came from revives that entry and drops
    /// the forwarding one.
    pub async fn rename(&self, old_path: &str, new_path: &str) -> Result<()> {
        if !self.features().rename {
            return Err(Error::NotSupported(format!("rename of {}", old_path)));
        }

        let old_entry = self.forwarder().get_metadata(old_path).await?;
        if old_entry.is_tombstone() {
            return Err(Error::NotFound(old_path.to_string()));
        }
        if old_entry.is_dir() {
            return Err(Error::NotSupported(format!("rename of directory {}", old_path)));
        }
        if old_entry.is_link() {
            return Err(Error::NotSupported(format!("rename of symlink {}", old_path)));
        }
        if old_path == new_path {
            return Ok(());
        }

        match self.forwarder().get_metadata(new_path).await {
            Ok(existing) => {
                let chain = if old_entry.is_renamed() {
                    self.rename_chain(&old_entry).await?
                } else {
                    Vec::new()
                };
                let position = chain.iter().position(|hop| hop == new_path);
                let position = match position {
                    Some(position) if existing.is_tombstone() => position,
                    _ => return Err(Error::AlreadyExists(new_path.to_string())),
                };

                debug!("Collapsing rename cycle {} -> {}", old_path, new_path);
                let mut revived = existing;
                revived.blocks = 0;
                self.forwarder().update_metadentry(new_path, &revived).await?;

                for hop in &chain[..position] {
                    self.forwarder().remove(hop).await?;
                }
                self.forwarder().remove(old_path).await.map(|_| ())
            }
            Err(Error::NotFound(_)) => {
                if self.features().create_check_parents {
                    self.check_parent(new_path).await?;
                }
                self.forwarder().rename(old_path, new_path, &old_entry).await
            }
            Err(e) => Err(e),
        }
    }

    /// Set the size of `path` to `length`.
    ///
    /// Shrinking lowers the recorded size before dropping data; growing
    /// writes zeros from the old end.
    pub async fn truncate(&self, path: &str, length: i64) -> Result<()> {
        if length < 0 {
            return Err(Error::InvalidArgument(format!("negative length {} for {}", length, path)));
        }
        let new_size = length as u64;

        let (data_path, entry) = self.resolve(path, true).await?;
        if entry.is_dir() {
            return Err(Error::IsADirectory(path.to_string()));
        }

        if new_size < entry.size {
            return self.shrink(&data_path, entry.size, new_size).await;
        }
        if new_size == entry.size {
            return Ok(());
        }

        // The data path may be a rename tombstone, so open it directly
        let file = OpenFile::new(data_path, libc::O_WRONLY);
        let fd = self.files().add(OpenHandle::File(Arc::new(file)));
        let grown = self.zero_fill(fd, new_size - entry.size).await;
        self.close(fd)?;
        grown
    }

    async fn zero_fill(&self, fd: i32, count: u64) -> Result<()> {
        self.lseek(fd, 0, libc::SEEK_END).await?;
        let zeros = vec![0u8; count.min(ZERO_FILL_BLOCK) as usize];
        let mut remaining = count;
        while remaining > 0 {
            let chunk = remaining.min(ZERO_FILL_BLOCK) as usize;
            let written = self.write(fd, &zeros[..chunk]).await?;
            if written < chunk {
                return Err(Error::RemoteIo(format!("short zero fill: {} of {} bytes", written, chunk)));
            }
            remaining -= chunk as u64;
        }
        Ok(())
    }

    /// Lower the size of the file stored under `data_path`, then drop the
    /// data beyond it
    async fn shrink(&self, data_path: &str, current_size: u64, new_size: u64) -> Result<()> {
        debug_assert!(new_size <= current_size);
        self.forwarder().decr_size(data_path, new_size).await?;
        self.forwarder().truncate(data_path, current_size, new_size).await
    }

    /// Move the cursor of `fd`
    pub async fn lseek(&self, fd: i32, offset: i64, whence: i32) -> Result<i64> {
        let handle = self.files().get(fd)?;
        let file = match handle {
            OpenHandle::File(file) => file,
            OpenHandle::Dir(dir) => {
                if whence != libc::SEEK_SET || offset < 0 {
                    return Err(Error::InvalidArgument(format!("seek on directory {}", dir.path())));
                }
                dir.set_pos(offset as usize);
                return Ok(dir.pos() as i64);
            }
        };

        let new_pos = match whence {
            libc::SEEK_SET => offset,
            libc::SEEK_CUR => file.pos() as i64 + offset,
            libc::SEEK_END => {
                let entry = self.forwarder().get_metadata(file.path()).await?;
                entry.size as i64 + offset
            }
            _ => {
                return Err(Error::InvalidArgument(format!("whence {} on {}", whence, file.path())));
            }
        };

        if new_pos < 0 {
            return Err(Error::InvalidArgument(format!(
                "seek to {} on {}",
                new_pos,
                file.path()
            )));
        }
        file.set_pos(new_pos as u64);
        Ok(new_pos)
    }

    pub fn dup(&self, fd: i32) -> Result<i32> {
        self.files().dup(fd)
    }

    pub fn dup2(&self, old_fd: i32, new_fd: i32) -> Result<i32> {
        self.files().dup2(old_fd, new_fd)
    }

    pub fn close(&self, fd: i32) -> Result<()> {
        self.files().remove(fd)
    }

    /// Create a symlink at `path` pointing to `target`
    pub async fn mk_symlink(&self, path: &str, target: &str) -> Result<()> {
        if !self.features().symlinks {
            return Err(Error::NotSupported(format!("symlink {}", path)));
        }
        let (_, target_entry) = self.resolve(target, false).await?;
        if target_entry.is_dir() {
            return Err(Error::NotSupported(format!("symlink to directory {}", target)));
        }
        if self.features().create_check_parents {
            self.check_parent(path).await?;
        }

        let entry = MetadataEntry::symlink(target);
        let mut created = false;
        let mut first_err = None;
        for copy in 0..=self.replicas() {
            match self.forwarder().create(path, &entry, copy).await {
                Ok(()) => created = true,
                Err(e) => {
                    first_err.get_or_insert(e);
                }
            }
        }
        match (created, first_err) {
            (true, _) => Ok(()),
            (false, Some(e)) => Err(e),
            (false, None) => Err(Error::RemoteIo(path.to_string())),
        }
    }

    /// Target of the symlink at `path`, which must fit a buffer of
    /// `bufsize` bytes including the terminating NUL
    pub async fn readlink(&self, path: &str, bufsize: usize) -> Result<String> {
        if !self.features().symlinks {
            return Err(Error::NotSupported(format!("readlink {}", path)));
        }
        let entry = self.forwarder().get_metadata(path).await?;
        if !entry.is_link() {
            return Err(Error::InvalidArgument(format!("{} is not a symlink", path)));
        }
        if entry.target_path.len() + 1 > bufsize {
            return Err(Error::NameTooLong(format!(
                "link target of {} needs {} bytes",
                path,
                entry.target_path.len() + 1
            )));
        }
        Ok(entry.target_path)
    }
}
