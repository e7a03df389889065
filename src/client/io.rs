//! Reads and writes, positional and vectored

use std::collections::HashSet;

use tracing::{error, warn};

use super::{Coordinator, OpenFile};
use crate::error::{Error, Result};

impl Coordinator {
    /// Write `buf` at `offset` without moving the cursor
    pub async fn pwrite(&self, fd: i32, buf: &[u8], offset: i64) -> Result<usize> {
        let file = self.writable_file(fd)?;
        let offset = non_negative(offset, file.path())?;
        self.pwrite_file(&file, buf, offset, false).await
    }

    /// Write `buf` at the cursor and advance it
    pub async fn write(&self, fd: i32, buf: &[u8]) -> Result<usize> {
        let file = self.writable_file(fd)?;
        let pos = file.pos();
        self.pwrite_file(&file, buf, pos, true).await
    }

    /// Write several buffers back to back starting at `offset`
    pub async fn pwritev(&self, fd: i32, iov: &[&[u8]], offset: i64) -> Result<usize> {
        let file = self.writable_file(fd)?;
        let offset = non_negative(offset, file.path())?;
        self.write_vectored(&file, iov, Some(offset)).await
    }

    /// Write several buffers at the cursor
    pub async fn writev(&self, fd: i32, iov: &[&[u8]]) -> Result<usize> {
        let file = self.writable_file(fd)?;
        self.write_vectored(&file, iov, None).await
    }

    /// Read into `buf` from `offset` without moving the cursor
    pub async fn pread(&self, fd: i32, buf: &mut [u8], offset: i64) -> Result<usize> {
        let file = self.readable_file(fd)?;
        let offset = non_negative(offset, file.path())?;
        self.pread_file(&file, buf, offset).await
    }

    /// Read into `buf` from the cursor and advance it
    pub async fn read(&self, fd: i32, buf: &mut [u8]) -> Result<usize> {
        let file = self.readable_file(fd)?;
        let pos = file.pos();
        let n = self.pread_file(&file, buf, pos).await?;
        file.set_pos(pos + n as u64);
        Ok(n)
    }

    /// Fill several buffers back to back starting at `offset`
    pub async fn preadv(&self, fd: i32, iov: &mut [&mut [u8]], offset: i64) -> Result<usize> {
        let file = self.readable_file(fd)?;
        let offset = non_negative(offset, file.path())?;
        self.read_vectored(&file, iov, offset).await
    }

    /// Fill several buffers from the cursor
    pub async fn readv(&self, fd: i32, iov: &mut [&mut [u8]]) -> Result<usize> {
        let file = self.readable_file(fd)?;
        let pos = file.pos();
        let n = self.read_vectored(&file, iov, pos).await?;
        file.set_pos(pos + n as u64);
        Ok(n)
    }

    fn writable_file(&self, fd: i32) -> Result<std::sync::Arc<OpenFile>> {
        let file = self.files().get_file(fd)?;
        if !file.is_writable() {
            return Err(Error::BadDescriptor(fd));
        }
        Ok(file)
    }

    fn readable_file(&self, fd: i32) -> Result<std::sync::Arc<OpenFile>> {
        let file = self.files().get_file(fd)?;
        if !file.is_readable() {
            return Err(Error::BadDescriptor(fd));
        }
        Ok(file)
    }

    /// Reserve the range in metadata, then write the primary copy and the
    /// replicas.
    ///
    /// The size update comes first so readers never see a size smaller
    /// than data already placed. A failed primary is covered by the
    /// replicas' outcome.
    pub(crate) async fn pwrite_file(
        &self,
        file: &OpenFile,
        buf: &[u8],
        offset: u64,
        update_pos: bool,
    ) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let path = file.path();
        let append = file.is_append();

        let reserved = self
            .forwarder()
            .update_metadentry_size(path, buf.len() as u64, offset, append)
            .await
            .map_err(|e| {
                error!("Size update of {} failed: {}", path, e);
                e
            })?;

        let offset = if append {
            match reserved {
                Some(offset) => offset,
                None => {
                    error!("No append offset could be reserved for {}", path);
                    return Err(Error::RemoteIo(format!("append offset for {}", path)));
                }
            }
        } else {
            offset
        };

        let replicas = self.replicas();
        let written = if replicas == 0 {
            self.forwarder().write(path, buf, offset, 0..=0).await?
        } else {
            let (primary, replica) = futures::join!(
                self.forwarder().write(path, buf, offset, 0..=0),
                self.forwarder().write(path, buf, offset, 1..=replicas)
            );
            match (primary, replica) {
                (Ok(n), Ok(_)) => n,
                (Ok(n), Err(e)) => {
                    warn!("Replica write of {} at {} failed: {}", path, offset, e);
                    n
                }
                (Err(e), Ok(n)) => {
                    warn!("Primary write of {} at {} failed, replicas hold it: {}", path, offset, e);
                    n
                }
                (Err(e), Err(_)) => return Err(e),
            }
        };

        if update_pos {
            file.set_pos(offset + written);
        }
        Ok(written as usize)
    }

    /// Read with retries on other replicas.
    ///
    /// A retry only happens when the failed attempt added a daemon to the
    /// failed set, so the loop ends once every copy was tried.
    pub(crate) async fn pread_file(&self, file: &OpenFile, buf: &mut [u8], offset: u64) -> Result<usize> {
        if self.features().zero_buffer_before_read {
            buf.fill(0);
        }
        let path = file.path();
        let mut failed = HashSet::new();
        loop {
            let before = failed.len();
            match self.forwarder().read(path, buf, offset, &mut failed).await {
                Ok(n) => return Ok(n as usize),
                Err(e) if self.replicas() > 0 && e.is_retryable() && failed.len() > before => {
                    warn!("Read of {} at {} failed, retrying on replicas: {}", path, offset, e);
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn write_vectored(&self, file: &OpenFile, iov: &[&[u8]], offset: Option<u64>) -> Result<usize> {
        let mut total = 0usize;
        for buf in iov.iter().filter(|buf| !buf.is_empty()) {
            let result = match offset {
                Some(offset) => self.pwrite_file(file, buf, offset + total as u64, false).await,
                None => self.pwrite_file(file, buf, file.pos(), true).await,
            };
            match result {
                Ok(n) => {
                    total += n;
                    if n < buf.len() {
                        break;
                    }
                }
                Err(e) if total == 0 => return Err(e),
                Err(e) => {
                    warn!("Vectored write to {} stopped after {} bytes: {}", file.path(), total, e);
                    break;
                }
            }
        }
        Ok(total)
    }

    async fn read_vectored(&self, file: &OpenFile, iov: &mut [&mut [u8]], offset: u64) -> Result<usize> {
        let mut total = 0usize;
        for buf in iov.iter_mut().filter(|buf| !buf.is_empty()) {
            let want = buf.len();
            match self.pread_file(file, &mut **buf, offset + total as u64).await {
                Ok(n) => {
                    total += n;
                    if n < want {
                        break;
                    }
                }
                Err(e) if total == 0 => return Err(e),
                Err(e) => {
                    warn!("Vectored read of {} stopped after {} bytes: {}", file.path(), total, e);
                    break;
                }
            }
        }
        Ok(total)
    }
}

fn non_negative(offset: i64, path: &str) -> Result<u64> {
    u64::try_from(offset).map_err(|_| Error::InvalidArgument(format!("negative offset {} on {}", offset, path)))
}
