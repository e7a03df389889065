//! In-memory metadata store

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use super::{child_prefix, first_level_name, grown_size};
use super::{DirEntry, ExtendedDirEntry, MetadataEntry, MetadataStore};
use crate::error::{Error, Result};

/// Metadata store backed by an ordered map behind one lock
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, MetadataEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, BTreeMap<String, MetadataEntry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Live first-level children, in key order
    fn children(&self, dir: &str) -> Vec<(String, MetadataEntry)> {
        let prefix = child_prefix(dir);
        let entries = self.entries();
        entries
            .range(prefix.clone()..)
            .take_while(|(path, _)| path.starts_with(&prefix))
            .filter(|(_, entry)| !entry.is_tombstone())
            .filter_map(|(path, entry)| {
                first_level_name(&prefix, path).map(|name| (name.to_string(), entry.clone()))
            })
            .collect()
    }
}

impl MetadataStore for MemoryStore {
    fn get(&self, path: &str) -> Result<MetadataEntry> {
        self.entries()
            .get(path)
            .cloned()
            .ok_or_else(|| Error::NotFound(path.to_string()))
    }

    fn put(&self, path: &str, entry: &MetadataEntry) -> Result<()> {
        self.entries().insert(path.to_string(), entry.clone());
        Ok(())
    }

    fn put_if_absent(&self, path: &str, entry: &MetadataEntry) -> Result<()> {
        let mut entries = self.entries();
        if entries.contains_key(path) {
            return Err(Error::AlreadyExists(path.to_string()));
        }
        entries.insert(path.to_string(), entry.clone());
        Ok(())
    }

    fn remove(&self, path: &str) -> Result<()> {
        self.entries()
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(path.to_string()))
    }

    fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.entries().contains_key(path))
    }

    fn update(&self, old_path: &str, new_path: &str, entry: &MetadataEntry) -> Result<()> {
        let mut entries = self.entries();
        if !entries.contains_key(old_path) {
            return Err(Error::NotFound(old_path.to_string()));
        }
        if old_path != new_path {
            entries.remove(old_path);
        }
        entries.insert(new_path.to_string(), entry.clone());
        Ok(())
    }

    fn increase_size(
        &self,
        path: &str,
        io_size: u64,
        offset: u64,
        append: bool,
    ) -> Result<Option<u64>> {
        let mut entries = self.entries();
        let entry = entries
            .get_mut(path)
            .ok_or_else(|| Error::NotFound(path.to_string()))?;
        let (size, reserved) = grown_size(entry.size, io_size, offset, append);
        entry.size = size;
        Ok(Some(reserved))
    }

    fn decrease_size(&self, path: &str, size: u64) -> Result<()> {
        let mut entries = self.entries();
        let entry = entries
            .get_mut(path)
            .ok_or_else(|| Error::NotFound(path.to_string()))?;
        entry.size = size;
        Ok(())
    }

    fn get_dirents(&self, dir: &str) -> Result<Vec<DirEntry>> {
        Ok(self
            .children(dir)
            .into_iter()
            .map(|(name, entry)| DirEntry {
                name,
                file_type: entry.file_type(),
            })
            .collect())
    }

    fn get_dirents_extended(&self, dir: &str) -> Result<Vec<ExtendedDirEntry>> {
        Ok(self
            .children(dir)
            .into_iter()
            .map(|(name, entry)| ExtendedDirEntry {
                name,
                file_type: entry.file_type(),
                size: entry.size,
                ctime: entry.ctime,
            })
            .collect())
    }
}
