//! Syscall-shaped facade
//!
//! Every call blocks the calling thread until the coordinator is done and
//! follows the POSIX convention: a non-negative result on success, `-1`
//! with [`errno`] set on failure.

use std::cell::Cell;
use std::future::Future;
use std::sync::Arc;

use tokio::runtime::Runtime;

use super::{Coordinator, FileStat, FileStatx, FsStats};
use crate::config::BurstConfig;
use crate::error::{Error, Result};
use crate::rpc::{TcpTransport, Transport};

thread_local! {
    static ERRNO: Cell<i32> = const { Cell::new(0) };
}

/// Error code of the last failed call on this thread
pub fn errno() -> i32 {
    ERRNO.with(Cell::get)
}

fn set_errno(err: &Error) {
    ERRNO.with(|cell| cell.set(err.to_errno()));
}

/// Blocking client with POSIX return conventions
pub struct PosixClient {
    runtime: Runtime,
    coordinator: Coordinator,
}

impl PosixClient {
    /// Client for the daemons behind `transport`
    pub fn new(config: &BurstConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("burstfs-client")
            .build()?;
        let coordinator = Coordinator::with_transport(config, transport)?;
        Ok(Self { runtime, coordinator })
    }

    /// Client talking to the configured daemons over TCP
    pub fn connect(config: &BurstConfig) -> Result<Self> {
        Self::new(config, Arc::new(TcpTransport::from_config(config)))
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    fn run<T, F>(&self, fut: F) -> Option<T>
    where
        F: Future<Output = Result<T>>,
    {
        check(self.runtime.block_on(fut))
    }

    pub fn open(&self, path: &str, flags: i32, mode: u32) -> i32 {
        self.run(self.coordinator.open(path, mode, flags)).unwrap_or(-1)
    }

    pub fn creat(&self, path: &str, mode: u32) -> i32 {
        self.open(path, libc::O_CREAT | libc::O_WRONLY | libc::O_TRUNC, mode)
    }

    pub fn close(&self, fd: i32) -> i32 {
        check(self.coordinator.close(fd)).map_or(-1, |_| 0)
    }

    pub fn unlink(&self, path: &str) -> i32 {
        self.run(self.coordinator.remove(path)).map_or(-1, |_| 0)
    }

    /// Existence check; permission bits in `mask` are not enforced
    pub fn access(&self, path: &str, _mask: i32) -> i32 {
        self.run(self.coordinator.access(path, true)).map_or(-1, |_| 0)
    }

    pub fn stat(&self, path: &str, out: &mut FileStat) -> i32 {
        self.stat_inner(path, true, out)
    }

    pub fn lstat(&self, path: &str, out: &mut FileStat) -> i32 {
        self.stat_inner(path, false, out)
    }

    fn stat_inner(&self, path: &str, follow_links: bool, out: &mut FileStat) -> i32 {
        match self.run(self.coordinator.stat(path, follow_links)) {
            Some(st) => {
                *out = st;
                0
            }
            None => -1,
        }
    }

    pub fn statx(&self, path: &str, flags: i32, out: &mut FileStatx) -> i32 {
        let follow = flags & libc::AT_SYMLINK_NOFOLLOW == 0;
        match self.run(self.coordinator.statx(path, follow)) {
            Some(st) => {
                *out = st;
                0
            }
            None => -1,
        }
    }

    pub fn statfs(&self, out: &mut FsStats) -> i32 {
        match self.run(self.coordinator.statfs()) {
            Some(st) => {
                *out = st;
                0
            }
            None => -1,
        }
    }

    pub fn lseek(&self, fd: i32, offset: i64, whence: i32) -> i64 {
        self.run(self.coordinator.lseek(fd, offset, whence)).unwrap_or(-1)
    }

    pub fn truncate(&self, path: &str, length: i64) -> i32 {
        self.run(self.coordinator.truncate(path, length)).map_or(-1, |_| 0)
    }

    pub fn dup(&self, fd: i32) -> i32 {
        check(self.coordinator.dup(fd)).unwrap_or(-1)
    }

    pub fn dup2(&self, old_fd: i32, new_fd: i32) -> i32 {
        check(self.coordinator.dup2(old_fd, new_fd)).unwrap_or(-1)
    }

    pub fn pwrite(&self, fd: i32, buf: &[u8], offset: i64) -> isize {
        self.run(self.coordinator.pwrite(fd, buf, offset)).map_or(-1, |n| n as isize)
    }

    pub fn write(&self, fd: i32, buf: &[u8]) -> isize {
        self.run(self.coordinator.write(fd, buf)).map_or(-1, |n| n as isize)
    }

    pub fn pwritev(&self, fd: i32, iov: &[&[u8]], offset: i64) -> isize {
        self.run(self.coordinator.pwritev(fd, iov, offset)).map_or(-1, |n| n as isize)
    }

    pub fn writev(&self, fd: i32, iov: &[&[u8]]) -> isize {
        self.run(self.coordinator.writev(fd, iov)).map_or(-1, |n| n as isize)
    }

    pub fn pread(&self, fd: i32, buf: &mut [u8], offset: i64) -> isize {
        self.run(self.coordinator.pread(fd, buf, offset)).map_or(-1, |n| n as isize)
    }

    pub fn read(&self, fd: i32, buf: &mut [u8]) -> isize {
        self.run(self.coordinator.read(fd, buf)).map_or(-1, |n| n as isize)
    }

    pub fn preadv(&self, fd: i32, iov: &mut [&mut [u8]], offset: i64) -> isize {
        self.run(self.coordinator.preadv(fd, iov, offset)).map_or(-1, |n| n as isize)
    }

    pub fn readv(&self, fd: i32, iov: &mut [&mut [u8]]) -> isize {
        self.run(self.coordinator.readv(fd, iov)).map_or(-1, |n| n as isize)
    }

    pub fn opendir(&self, path: &str) -> i32 {
        self.run(self.coordinator.opendir(path)).unwrap_or(-1)
    }

    pub fn mkdir(&self, path: &str, mode: u32) -> i32 {
        self.run(self.coordinator.mkdir(path, mode)).map_or(-1, |_| 0)
    }

    pub fn rmdir(&self, path: &str) -> i32 {
        self.run(self.coordinator.rmdir(path)).map_or(-1, |_| 0)
    }

    pub fn getdents(&self, fd: i32, buf: &mut [u8]) -> i32 {
        check(self.coordinator.getdents(fd, buf)).map_or(-1, |n| n as i32)
    }

    pub fn getdents64(&self, fd: i32, buf: &mut [u8]) -> i32 {
        check(self.coordinator.getdents64(fd, buf)).map_or(-1, |n| n as i32)
    }

    pub fn rename(&self, old_path: &str, new_path: &str) -> i32 {
        self.run(self.coordinator.rename(old_path, new_path)).map_or(-1, |_| 0)
    }

    pub fn symlink(&self, target: &str, link_path: &str) -> i32 {
        self.run(self.coordinator.mk_symlink(link_path, target)).map_or(-1, |_| 0)
    }

    /// Copy the link target into `buf`, without a terminating NUL
    pub fn readlink(&self, path: &str, buf: &mut [u8]) -> isize {
        match self.run(self.coordinator.readlink(path, buf.len())) {
            Some(target) => {
                let bytes = target.as_bytes();
                buf[..bytes.len()].copy_from_slice(bytes);
                bytes.len() as isize
            }
            None => -1,
        }
    }
}

/// Record the errno of a failure and drop the error
fn check<T>(result: Result<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            set_errno(&e);
            None
        }
    }
}
