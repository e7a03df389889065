//! Forwarding layer
//!
//! Turns file-level calls into per-daemon requests. Metadata for a path
//! lives on `locate_metadata(path, copy)`; chunk `i` on
//! `locate_data(path, i, copy)`. Requests that go to several daemons are
//! issued together and awaited as a group.

use std::collections::{BTreeMap, HashSet};
use std::ops::RangeInclusive;
use std::sync::Arc;

use futures::future::join_all;
use rand::seq::SliceRandom;
use tracing::{debug, warn};

use super::{ChunkRead, ChunkStat, ChunkWrite, Request, Response, Transport};
use crate::error::{Error, Result};
use crate::layout::{ChunkLayout, ChunkSpan};
use crate::metadata::{DirEntry, ExtendedDirEntry, MetadataEntry, TOMBSTONE};
use crate::placement::{ChunkPlacement, DaemonId};

fn unexpected(response: &Response) -> Error {
    Error::Network(format!("Unexpected {} reply", response.type_name()))
}

/// Primary's reply, failing with the first error unless every copy
/// succeeded
fn all_ok(results: Vec<Result<Response>>, what: &str, path: &str) -> Result<Response> {
    let mut primary = None;
    for (copy, result) in results.into_iter().enumerate() {
        match result {
            Ok(response) => {
                if primary.is_none() {
                    primary = Some(response);
                }
            }
            Err(e) => {
                if copy > 0 {
                    warn!("{} of {} failed on copy {}: {}", what, path, copy, e);
                }
                return Err(e);
            }
        }
    }
    primary.ok_or_else(|| Error::RemoteIo(format!("{} of {} reached no daemon", what, path)))
}

/// First successful reply, or the first error when every copy failed
fn first_ok(results: Vec<Result<Response>>, what: &str, path: &str) -> Result<Response> {
    let mut first_err = None;
    let mut success = None;
    for (copy, result) in results.into_iter().enumerate() {
        match result {
            Ok(response) => {
                if success.is_none() {
                    success = Some(response);
                }
            }
            Err(e) => {
                if copy > 0 || !matches!(e, Error::NotFound(_)) {
                    warn!("{} of {} failed on copy {}: {}", what, path, copy, e);
                }
                first_err.get_or_insert(e);
            }
        }
    }
    match (success, first_err) {
        (Some(response), _) => Ok(response),
        (None, Some(e)) => Err(e),
        (None, None) => Err(Error::RemoteIo(format!("{} of {} reached no daemon", what, path))),
    }
}

/// Client side of every daemon operation
pub struct Forwarder {
    transport: Arc<dyn Transport>,
    layout: ChunkLayout,
    placement: ChunkPlacement,
    replicas: u32,
}

impl Forwarder {
    /// # Panics
    ///
    /// Panics if the transport has no daemons.
    pub fn new(transport: Arc<dyn Transport>, layout: ChunkLayout, replicas: u32) -> Self {
        let placement = ChunkPlacement::new(transport.num_daemons());
        Self {
            transport,
            layout,
            placement,
            replicas,
        }
    }

    pub fn layout(&self) -> &ChunkLayout {
        &self.layout
    }

    pub fn placement(&self) -> &ChunkPlacement {
        &self.placement
    }

    pub fn replicas(&self) -> u32 {
        self.replicas
    }

    pub fn num_daemons(&self) -> usize {
        self.placement.num_daemons()
    }

    /// Call one daemon and turn error replies into `Err`
    async fn call(&self, target: DaemonId, request: Request) -> Result<Response> {
        self.transport.call(target, request).await?.into_result()
    }

    /// Same request to every metadata copy of `path`, concurrently
    async fn on_metadata_copies<F>(&self, path: &str, make: F) -> Vec<Result<Response>>
    where
        F: Fn() -> Request,
    {
        let calls = (0..=self.replicas)
            .map(|copy| self.call(self.placement.locate_metadata(path, copy), make()));
        join_all(calls).await
    }

    /// Same request to every daemon, concurrently
    async fn on_all_daemons<F>(&self, make: F) -> Vec<Result<Response>>
    where
        F: Fn() -> Request,
    {
        join_all((0..self.num_daemons()).map(|target| self.call(target, make()))).await
    }

    // ========== Metadata ==========

    /// Create the entry for `path` on metadata copy `copy`
    pub async fn create(&self, path: &str, entry: &MetadataEntry, copy: u32) -> Result<()> {
        let target = self.placement.locate_metadata(path, copy);
        let request = Request::CreateMetadata {
            path: path.to_string(),
            entry: entry.clone(),
        };
        match self.call(target, request).await? {
            Response::Ok => Ok(()),
            other => Err(unexpected(&other)),
        }
    }

    /// Fetch the entry for `path` from metadata copy `copy`
    pub async fn stat(&self, path: &str, copy: u32) -> Result<MetadataEntry> {
        let target = self.placement.locate_metadata(path, copy);
        match self.call(target, Request::StatMetadata { path: path.to_string() }).await? {
            Response::Metadata(entry) => Ok(entry),
            other => Err(unexpected(&other)),
        }
    }

    /// Fetch the entry for `path`, falling back to replicas in order
    pub async fn get_metadata(&self, path: &str) -> Result<MetadataEntry> {
        let mut first_err = None;
        for copy in 0..=self.replicas {
            match self.stat(path, copy).await {
                Ok(entry) => return Ok(entry),
                Err(e) => {
                    if copy > 0 {
                        debug!("stat of {} failed on copy {}: {}", path, copy, e);
                    }
                    first_err.get_or_insert(e);
                }
            }
        }
        Err(first_err.unwrap_or_else(|| Error::NotFound(path.to_string())))
    }

    /// Remove the entry for `path` from every copy, and the file's chunks
    /// from every daemon. Returns the removed entry.
    ///
    /// Fails if any copy could not be removed.
    pub async fn remove(&self, path: &str) -> Result<MetadataEntry> {
        let results = self
            .on_metadata_copies(path, || Request::RemoveMetadata { path: path.to_string() })
            .await;
        let entry = match all_ok(results, "remove", path)? {
            Response::Metadata(entry) => entry,
            other => return Err(unexpected(&other)),
        };

        if entry.is_regular() && entry.size > 0 {
            let results = self
                .on_all_daemons(|| Request::RemoveChunks { path: path.to_string() })
                .await;
            for result in results {
                result?;
            }
        }

        Ok(entry)
    }

    /// Replace the entry for `path` on every copy; all of them must succeed
    pub async fn update_metadentry(&self, path: &str, entry: &MetadataEntry) -> Result<()> {
        let results = self
            .on_metadata_copies(path, || Request::UpdateMetadata {
                old_path: path.to_string(),
                new_path: path.to_string(),
                entry: entry.clone(),
            })
            .await;
        all_ok(results, "update", path).map(|_| ())
    }

    /// Grow the recorded size on every copy.
    ///
    /// Returns the primary's reserved offset, or a replica's when the
    /// primary failed. `None` means the store could not compute one.
    pub async fn update_metadentry_size(
        &self,
        path: &str,
        io_size: u64,
        offset: u64,
        append: bool,
    ) -> Result<Option<u64>> {
        let results = self
            .on_metadata_copies(path, || Request::IncreaseSize {
                path: path.to_string(),
                io_size,
                offset,
                append,
            })
            .await;
        match first_ok(results, "size update", path)? {
            Response::Offset(reserved) => Ok(reserved),
            other => Err(unexpected(&other)),
        }
    }

    /// Lower the recorded size on every copy; all of them must succeed
    pub async fn decr_size(&self, path: &str, size: u64) -> Result<()> {
        let results = self
            .on_metadata_copies(path, || Request::DecreaseSize {
                path: path.to_string(),
                size,
            })
            .await;
        all_ok(results, "size decrease", path).map(|_| ())
    }

    /// Rename `old_path` to `new_path`.
    ///
    /// The new entry copies the old one and points back at `old_path`,
    /// where the data stays; the old entry becomes a tombstone that keeps
    /// its own forwarding target.
    pub async fn rename(&self, old_path: &str, new_path: &str, old_entry: &MetadataEntry) -> Result<()> {
        let mut forward = old_entry.clone();
        forward.target_path = old_path.to_string();
        forward.ctime = chrono::Utc::now().timestamp();

        let mut created = None;
        let mut first_err = None;
        for copy in 0..=self.replicas {
            match self.create(new_path, &forward, copy).await {
                Ok(()) => created = Some(()),
                Err(e) => {
                    first_err.get_or_insert(e);
                }
            }
        }
        if created.is_none() {
            return Err(first_err.unwrap_or_else(|| Error::RemoteIo(new_path.to_string())));
        }

        let mut tombstone = old_entry.clone();
        tombstone.blocks = TOMBSTONE;
        self.update_metadentry(old_path, &tombstone).await
    }

    /// First-level children of `dir` across all daemons, sorted by name
    pub async fn get_dirents(&self, dir: &str) -> Result<Vec<DirEntry>> {
        let results = self
            .on_all_daemons(|| Request::GetDirents { dir: dir.to_string() })
            .await;

        let mut merged: BTreeMap<String, DirEntry> = BTreeMap::new();
        let mut failures = 0;
        let mut first_err = None;
        for (target, result) in results.into_iter().enumerate() {
            match result {
                Ok(Response::Dirents(entries)) => {
                    for entry in entries {
                        merged.entry(entry.name.clone()).or_insert(entry);
                    }
                }
                Ok(other) => return Err(unexpected(&other)),
                Err(e) => {
                    warn!("Listing {} failed on daemon {}: {}", dir, target, e);
                    failures += 1;
                    first_err.get_or_insert(e);
                }
            }
        }

        // Every entry has `replicas` extra copies, so that many daemons
        // may be missing without losing names
        if failures > self.replicas as usize {
            if let Some(e) = first_err {
                return Err(e);
            }
        }

        Ok(merged.into_values().collect())
    }

    /// Extended listing of `dir` from one daemon only
    pub async fn get_dirents_single(&self, dir: &str, target: DaemonId) -> Result<Vec<ExtendedDirEntry>> {
        match self
            .call(target, Request::GetDirentsExtended { dir: dir.to_string() })
            .await?
        {
            Response::ExtendedDirents(entries) => Ok(entries),
            other => Err(unexpected(&other)),
        }
    }

    /// Chunk capacity summed over all daemons
    pub async fn chunk_stat(&self) -> Result<ChunkStat> {
        let mut total = ChunkStat::default();
        for result in self.on_all_daemons(|| Request::ChunkStat).await {
            match result? {
                Response::ChunkStat(stat) => {
                    total.chunk_size = stat.chunk_size;
                    total.chunk_total += stat.chunk_total;
                    total.chunk_free += stat.chunk_free;
                }
                other => return Err(unexpected(&other)),
            }
        }
        Ok(total)
    }

    // ========== Data ==========

    /// Write `buf` at `offset` to the given copies (0 is the primary).
    ///
    /// Returns the bytes acknowledged per copy. Any failed daemon fails the
    /// whole call.
    pub async fn write(
        &self,
        path: &str,
        buf: &[u8],
        offset: u64,
        copies: RangeInclusive<u32>,
    ) -> Result<u64> {
        if buf.is_empty() || copies.is_empty() {
            return Ok(0);
        }
        let spans: Vec<ChunkSpan> = self.layout.chunk_spans(offset, buf.len() as u64).collect();
        let first_chunk = spans[0].chunk_id;
        let num_copies = u64::from(copies.end() - copies.start() + 1);

        let mut batches: Vec<(DaemonId, Vec<ChunkWrite>)> = Vec::new();
        for copy in copies {
            let groups = self
                .placement
                .group_by_target(path, spans.iter().map(|s| s.chunk_id), copy);
            for (target, chunk_ids) in groups {
                let writes = chunk_ids
                    .into_iter()
                    .map(|id| {
                        let span = &spans[(id - first_chunk) as usize];
                        let start = span.buf_offset as usize;
                        ChunkWrite {
                            chunk_id: id,
                            offset: span.chunk_offset,
                            data: buf[start..start + span.len as usize].to_vec(),
                        }
                    })
                    .collect();
                batches.push((target, writes));
            }
        }

        let calls = batches.into_iter().map(|(target, chunks)| async move {
            let request = Request::WriteChunks {
                path: path.to_string(),
                chunks,
            };
            (target, self.call(target, request).await)
        });

        let mut written = 0;
        let mut first_err = None;
        for (target, result) in join_all(calls).await {
            match result {
                Ok(Response::Written(n)) => written += n,
                Ok(other) => {
                    first_err.get_or_insert(unexpected(&other));
                }
                Err(e) => {
                    warn!("Chunk write of {} failed on daemon {}: {}", path, target, e);
                    first_err.get_or_insert(e);
                }
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(written / num_copies),
        }
    }

    /// Read into `buf` from `offset`.
    ///
    /// With replicas, each chunk is read from a random copy whose daemon is
    /// not in `failed`; daemons that fail are added to `failed` so a retry
    /// avoids them. Gaps inside the range are zero-filled. Returns the
    /// length up to the last byte any chunk held.
    pub async fn read(
        &self,
        path: &str,
        buf: &mut [u8],
        offset: u64,
        failed: &mut HashSet<DaemonId>,
    ) -> Result<u64> {
        if buf.is_empty() {
            return Ok(0);
        }
        let spans: Vec<ChunkSpan> = self.layout.chunk_spans(offset, buf.len() as u64).collect();
        let first_chunk = spans[0].chunk_id;

        let mut batches: Vec<(DaemonId, Vec<ChunkRead>)> = Vec::new();
        {
            let mut rng = rand::thread_rng();
            for span in &spans {
                let target = if self.replicas == 0 {
                    self.placement.locate_data(path, span.chunk_id, 0)
                } else {
                    let candidates: Vec<DaemonId> = (0..=self.replicas)
                        .map(|copy| self.placement.locate_data(path, span.chunk_id, copy))
                        .filter(|target| !failed.contains(target))
                        .collect();
                    match candidates.choose(&mut rng) {
                        Some(target) => *target,
                        None => {
                            return Err(Error::RemoteIo(format!(
                                "no reachable copy of chunk {} of {}",
                                span.chunk_id, path
                            )))
                        }
                    }
                };

                let read = ChunkRead {
                    chunk_id: span.chunk_id,
                    offset: span.chunk_offset,
                    len: span.len,
                };
                match batches.iter_mut().find(|(t, _)| *t == target) {
                    Some((_, reads)) => reads.push(read),
                    None => batches.push((target, vec![read])),
                }
            }
        }

        let calls = batches.into_iter().map(|(target, chunks)| async move {
            let request = Request::ReadChunks {
                path: path.to_string(),
                chunks,
            };
            (target, self.call(target, request).await)
        });
        let results = join_all(calls).await;

        let mut extent = 0u64;
        let mut first_err = None;
        for (target, result) in results {
            match result {
                Ok(Response::Data(pieces)) => {
                    for piece in pieces {
                        let span = &spans[(piece.chunk_id - first_chunk) as usize];
                        let start = span.buf_offset as usize;
                        let got = piece.data.len().min(span.len as usize);
                        buf[start..start + got].copy_from_slice(&piece.data[..got]);
                        buf[start + got..start + span.len as usize].fill(0);
                        if got > 0 {
                            extent = extent.max(span.buf_offset + got as u64);
                        }
                    }
                }
                Ok(other) => {
                    first_err.get_or_insert(unexpected(&other));
                }
                Err(e) => {
                    warn!("Chunk read of {} failed on daemon {}: {}", path, target, e);
                    failed.insert(target);
                    first_err.get_or_insert(e);
                }
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(extent),
        }
    }

    /// Drop file data beyond `new_size` on every daemon that may hold it
    pub async fn truncate(&self, path: &str, current_size: u64, new_size: u64) -> Result<()> {
        if new_size >= current_size {
            return Ok(());
        }
        let chunk_id = self.layout.block_index(new_size);
        let keep_bytes = new_size - self.layout.chunk_start(chunk_id);
        let last_chunk = self.layout.block_index(current_size - 1);

        let mut targets: Vec<DaemonId> = Vec::new();
        'copies: for copy in 0..=self.replicas {
            for (target, _) in self.placement.group_by_target(path, chunk_id..=last_chunk, copy) {
                if !targets.contains(&target) {
                    targets.push(target);
                    if targets.len() == self.num_daemons() {
                        break 'copies;
                    }
                }
            }
        }

        let calls = targets.into_iter().map(|target| {
            self.call(
                target,
                Request::TruncateChunks {
                    path: path.to_string(),
                    chunk_id,
                    keep_bytes,
                },
            )
        });
        for result in join_all(calls).await {
            result?;
        }
        Ok(())
    }
}
