//! Open file and directory handles, and the descriptor table

use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{Error, Result};
use crate::metadata::DirEntry;

/// State of one open regular file
#[derive(Debug)]
pub struct OpenFile {
    /// Path the file data is stored under (rename chains already resolved)
    path: String,
    flags: i32,
    pos: AtomicU64,
}

impl OpenFile {
    pub fn new(path: impl Into<String>, flags: i32) -> Self {
        Self {
            path: path.into(),
            flags,
            pos: AtomicU64::new(0),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_append(&self) -> bool {
        self.flags & libc::O_APPEND != 0
    }

    pub fn is_writable(&self) -> bool {
        let mode = self.flags & libc::O_ACCMODE;
        mode == libc::O_WRONLY || mode == libc::O_RDWR
    }

    pub fn is_readable(&self) -> bool {
        self.flags & libc::O_ACCMODE != libc::O_WRONLY
    }

    pub fn pos(&self) -> u64 {
        self.pos.load(Ordering::SeqCst)
    }

    pub fn set_pos(&self, pos: u64) {
        self.pos.store(pos, Ordering::SeqCst);
    }
}

/// Open directory: a listing snapshot taken at open time and a cursor
#[derive(Debug)]
pub struct OpenDirectory {
    path: String,
    entries: Vec<DirEntry>,
    pos: AtomicUsize,
}

impl OpenDirectory {
    pub fn new(path: impl Into<String>, entries: Vec<DirEntry>) -> Self {
        Self {
            path: path.into(),
            entries,
            pos: AtomicUsize::new(0),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn entries(&self) -> &[DirEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Index of the next entry to hand out
    pub fn pos(&self) -> usize {
        self.pos.load(Ordering::SeqCst)
    }

    pub fn set_pos(&self, pos: usize) {
        self.pos.store(pos.min(self.entries.len()), Ordering::SeqCst);
    }
}

/// What a descriptor refers to. Duplicated descriptors share the handle.
#[derive(Debug, Clone)]
pub enum OpenHandle {
    File(Arc<OpenFile>),
    Dir(Arc<OpenDirectory>),
}

impl OpenHandle {
    pub fn path(&self) -> &str {
        match self {
            OpenHandle::File(file) => file.path(),
            OpenHandle::Dir(dir) => dir.path(),
        }
    }
}

/// Descriptor table
pub struct FileMap {
    handles: RwLock<HashMap<i32, OpenHandle>>,
    next_fd: AtomicI32,
    fd_base: i32,
}

impl FileMap {
    /// Table handing out descriptors from `fd_base` upwards
    pub fn new(fd_base: i32) -> Self {
        Self {
            handles: RwLock::new(HashMap::new()),
            next_fd: AtomicI32::new(fd_base),
            fd_base,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<i32, OpenHandle>> {
        self.handles.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<i32, OpenHandle>> {
        self.handles.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a handle under a fresh descriptor
    pub fn add(&self, handle: OpenHandle) -> i32 {
        let mut handles = self.write();
        loop {
            let fd = self.next_fd.fetch_add(1, Ordering::SeqCst);
            if fd < self.fd_base {
                // wrapped around
                self.next_fd.store(self.fd_base, Ordering::SeqCst);
                continue;
            }
            if !handles.contains_key(&fd) {
                handles.insert(fd, handle);
                return fd;
            }
        }
    }

    pub fn get(&self, fd: i32) -> Result<OpenHandle> {
        self.read().get(&fd).cloned().ok_or(Error::BadDescriptor(fd))
    }

    /// Regular file behind `fd`
    pub fn get_file(&self, fd: i32) -> Result<Arc<OpenFile>> {
        match self.get(fd)? {
            OpenHandle::File(file) => Ok(file),
            OpenHandle::Dir(dir) => Err(Error::IsADirectory(dir.path().to_string())),
        }
    }

    /// Directory behind `fd`
    pub fn get_dir(&self, fd: i32) -> Result<Arc<OpenDirectory>> {
        match self.get(fd)? {
            OpenHandle::Dir(dir) => Ok(dir),
            OpenHandle::File(file) => Err(Error::NotADirectory(file.path().to_string())),
        }
    }

    /// Forget `fd`
    pub fn remove(&self, fd: i32) -> Result<()> {
        self.write().remove(&fd).map(|_| ()).ok_or(Error::BadDescriptor(fd))
    }

    /// New descriptor sharing the handle (and cursor) of `fd`
    pub fn dup(&self, fd: i32) -> Result<i32> {
        let handle = self.get(fd)?;
        Ok(self.add(handle))
    }

    /// Make `new_fd` refer to the handle of `old_fd`, replacing whatever
    /// `new_fd` referred to
    pub fn dup2(&self, old_fd: i32, new_fd: i32) -> Result<i32> {
        if new_fd < 0 {
            return Err(Error::BadDescriptor(new_fd));
        }
        let mut handles = self.write();
        let handle = handles.get(&old_fd).cloned().ok_or(Error::BadDescriptor(old_fd))?;
        if old_fd != new_fd {
            handles.insert(new_fd, handle);
        }
        Ok(new_fd)
    }

    /// Number of open descriptors
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::FileType;

    #[test]
    fn test_descriptors_start_at_base() {
        let map = FileMap::new(100_000);
        let fd = map.add(OpenHandle::File(Arc::new(OpenFile::new("/a", libc::O_RDONLY))));
        assert_eq!(fd, 100_000);
        assert_eq!(map.add(OpenHandle::File(Arc::new(OpenFile::new("/b", 0)))), 100_001);
        assert!(matches!(map.get(5), Err(Error::BadDescriptor(5))));
    }

    #[test]
    fn test_dup_shares_cursor() {
        let map = FileMap::new(10);
        let fd = map.add(OpenHandle::File(Arc::new(OpenFile::new("/a", libc::O_RDWR))));
        let copy = map.dup(fd).unwrap();
        assert_ne!(fd, copy);

        map.get_file(fd).unwrap().set_pos(42);
        assert_eq!(map.get_file(copy).unwrap().pos(), 42);

        assert_eq!(map.len(), 2);

        map.remove(fd).unwrap();
        assert!(map.get_file(copy).is_ok());
        assert!(map.remove(fd).is_err());

        map.remove(copy).unwrap();
        assert!(map.is_empty());
    }

    #[test]
    fn test_dup2_replaces_target() {
        let map = FileMap::new(10);
        let a = map.add(OpenHandle::File(Arc::new(OpenFile::new("/a", 0))));
        let b = map.add(OpenHandle::File(Arc::new(OpenFile::new("/b", 0))));

        assert_eq!(map.dup2(a, b).unwrap(), b);
        assert_eq!(map.get(b).unwrap().path(), "/a");
        assert_eq!(map.dup2(a, a).unwrap(), a);
        assert!(map.dup2(999, a).is_err());
    }

    #[test]
    fn test_handle_kind_checks() {
        let map = FileMap::new(10);
        let entries = vec![DirEntry {
            name: "x".into(),
            file_type: FileType::Regular,
        }];
        let fd = map.add(OpenHandle::Dir(Arc::new(OpenDirectory::new("/d", entries))));
        assert!(matches!(map.get_file(fd), Err(Error::IsADirectory(_))));
        assert_eq!(map.get_dir(fd).unwrap().len(), 1);
    }

    #[test]
    fn test_access_mode_flags() {
        let file = OpenFile::new("/f", libc::O_WRONLY | libc::O_APPEND);
        assert!(file.is_writable());
        assert!(!file.is_readable());
        assert!(file.is_append());
        assert!(!OpenFile::new("/f", libc::O_RDONLY).is_writable());
    }
}
