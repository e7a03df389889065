//! Directory operations and dirent packing

use std::sync::Arc;

use super::{join_path, Coordinator, OpenDirectory, OpenHandle};
use crate::error::{Error, Result};
use crate::metadata::{DirEntry, ExtendedDirEntry, FileType};
use crate::placement::{inode_of, DaemonId};

/// Record layout produced by `getdents`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirentFormat {
    /// `struct linux_dirent`: ino, off, reclen, name, NUL, padding, d_type
    /// in the record's last byte
    Legacy,
    /// `struct linux_dirent64`: ino, off, reclen, d_type, name, NUL, padding
    Dirent64,
}

/// Bytes before the name: d_ino (8), d_off (8), d_reclen (2)
const HEADER_LEN: usize = 18;

impl DirentFormat {
    /// Record length for a name of `name_len` bytes, 8-byte aligned
    pub fn record_len(self, name_len: usize) -> usize {
        let raw = match self {
            // name, NUL and the trailing d_type byte
            DirentFormat::Legacy => HEADER_LEN + name_len + 2,
            // d_type, name and NUL
            DirentFormat::Dirent64 => HEADER_LEN + 1 + name_len + 1,
        };
        (raw + 7) & !7
    }

    fn encode(self, record: &mut [u8], ino: u64, off: i64, name: &[u8], d_type: u8) {
        let reclen = record.len() as u16;
        record.fill(0);
        record[0..8].copy_from_slice(&ino.to_ne_bytes());
        record[8..16].copy_from_slice(&off.to_ne_bytes());
        record[16..18].copy_from_slice(&reclen.to_ne_bytes());
        match self {
            DirentFormat::Legacy => {
                record[HEADER_LEN..HEADER_LEN + name.len()].copy_from_slice(name);
                let last = record.len() - 1;
                record[last] = d_type;
            }
            DirentFormat::Dirent64 => {
                record[HEADER_LEN] = d_type;
                record[HEADER_LEN + 1..HEADER_LEN + 1 + name.len()].copy_from_slice(name);
            }
        }
    }
}

impl Coordinator {
    /// Open a directory, taking a snapshot of its entries
    pub async fn opendir(&self, path: &str) -> Result<i32> {
        let (dir_path, entry) = self.resolve(path, true).await?;
        if !entry.is_dir() {
            return Err(Error::NotADirectory(path.to_string()));
        }

        let mut entries = vec![
            DirEntry {
                name: ".".into(),
                file_type: FileType::Directory,
            },
            DirEntry {
                name: "..".into(),
                file_type: FileType::Directory,
            },
        ];
        entries.extend(self.forwarder().get_dirents(&dir_path).await?);

        let dir = OpenDirectory::new(dir_path, entries);
        Ok(self.files().add(OpenHandle::Dir(Arc::new(dir))))
    }

    /// Remove an empty directory
    pub async fn rmdir(&self, path: &str) -> Result<()> {
        if path == "/" {
            return Err(Error::InvalidArgument("cannot remove the root directory".into()));
        }
        let entry = self.forwarder().get_metadata(path).await?;
        if entry.is_tombstone() {
            return Err(Error::NotFound(path.to_string()));
        }
        if !entry.is_dir() {
            return Err(Error::NotADirectory(path.to_string()));
        }
        if !self.forwarder().get_dirents(path).await?.is_empty() {
            return Err(Error::NotEmpty(path.to_string()));
        }
        self.forwarder().remove(path).await.map(|_| ())
    }

    /// Pack `struct linux_dirent` records into `buf`
    pub fn getdents(&self, fd: i32, buf: &mut [u8]) -> Result<usize> {
        self.pack_dirents(fd, buf, DirentFormat::Legacy)
    }

    /// Pack `struct linux_dirent64` records into `buf`
    pub fn getdents64(&self, fd: i32, buf: &mut [u8]) -> Result<usize> {
        self.pack_dirents(fd, buf, DirentFormat::Dirent64)
    }

    /// Pack as many records as fit, starting at the directory cursor.
    ///
    /// Returns 0 once the snapshot is exhausted; fails when not even one
    /// record fits.
    pub fn pack_dirents(&self, fd: i32, buf: &mut [u8], format: DirentFormat) -> Result<usize> {
        let dir = self.files().get_dir(fd)?;
        let mut pos = dir.pos();
        let mut written = 0;

        while let Some(entry) = dir.entries().get(pos) {
            let name = entry.name.as_bytes();
            let reclen = format.record_len(name.len());
            if written + reclen > buf.len() {
                if written == 0 {
                    return Err(Error::InvalidArgument(format!(
                        "dirent buffer of {} bytes too small",
                        buf.len()
                    )));
                }
                break;
            }

            let ino = inode_of(&join_path(dir.path(), &entry.name));
            format.encode(
                &mut buf[written..written + reclen],
                ino,
                (pos + 1) as i64,
                name,
                entry.file_type.d_type(),
            );
            written += reclen;
            pos += 1;
        }

        dir.set_pos(pos);
        Ok(written)
    }

    /// Entries of `path` stored on one daemon, with sizes and change times
    pub async fn get_single_server_dir(&self, path: &str, server: DaemonId) -> Result<Vec<ExtendedDirEntry>> {
        if server >= self.forwarder().num_daemons() {
            return Err(Error::InvalidArgument(format!("no daemon {}", server)));
        }
        self.forwarder().get_dirents_single(path, server).await
    }

    /// Live entries of `path` merged from every daemon
    pub async fn list_dir(&self, path: &str) -> Result<Vec<DirEntry>> {
        let (dir_path, entry) = self.resolve(path, true).await?;
        if !entry.is_dir() {
            return Err(Error::NotADirectory(path.to_string()));
        }
        self.forwarder().get_dirents(&dir_path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_lengths_are_aligned() {
        assert_eq!(DirentFormat::Legacy.record_len(1), 24);
        assert_eq!(DirentFormat::Legacy.record_len(4), 24);
        assert_eq!(DirentFormat::Legacy.record_len(5), 32);
        assert_eq!(DirentFormat::Dirent64.record_len(1), 24);
        assert_eq!(DirentFormat::Dirent64.record_len(4), 24);
        assert_eq!(DirentFormat::Dirent64.record_len(5), 32);
    }

    #[test]
    fn test_dirent64_layout() {
        let mut record = vec![0xFFu8; DirentFormat::Dirent64.record_len(3)];
        DirentFormat::Dirent64.encode(&mut record, 7, 2, b"abc", libc::DT_REG);
        assert_eq!(u64::from_ne_bytes(record[0..8].try_into().unwrap()), 7);
        assert_eq!(i64::from_ne_bytes(record[8..16].try_into().unwrap()), 2);
        assert_eq!(u16::from_ne_bytes(record[16..18].try_into().unwrap()), 24);
        assert_eq!(record[18], libc::DT_REG);
        assert_eq!(&record[19..22], b"abc");
        assert_eq!(record[22], 0);
    }

    #[test]
    fn test_legacy_layout_puts_type_last() {
        let mut record = vec![0xFFu8; DirentFormat::Legacy.record_len(3)];
        DirentFormat::Legacy.encode(&mut record, 1, 1, b"xyz", libc::DT_DIR);
        assert_eq!(&record[18..21], b"xyz");
        assert_eq!(record[21], 0);
        assert_eq!(record[23], libc::DT_DIR);
    }
}
