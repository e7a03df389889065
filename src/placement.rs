//! Chunk and metadata placement
//!
//! Every client computes placement independently, so the hash must be
//! identical across processes, builds and platforms. The first eight bytes
//! of a SHA-256 digest give a stable, well spread 64-bit value.

use sha2::{Digest, Sha256};

/// Daemon index inside the configured daemon list
pub type DaemonId = usize;

/// Stable 64-bit hash of a string
pub fn stable_hash(key: &str) -> u64 {
    let digest = Sha256::digest(key.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}

/// Inode number reported for a path
pub fn inode_of(path: &str) -> u64 {
    stable_hash(path)
}

/// Deterministic routing of metadata and chunks to daemons
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlacement {
    num_daemons: usize,
}

impl ChunkPlacement {
    /// # Panics
    ///
    /// Panics if `num_daemons` is zero.
    pub fn new(num_daemons: usize) -> Self {
        assert!(num_daemons > 0, "placement needs at least one daemon");
        Self { num_daemons }
    }

    pub fn num_daemons(&self) -> usize {
        self.num_daemons
    }

    /// Daemon holding copy `copy` of the metadata entry for `path`
    pub fn locate_metadata(&self, path: &str, copy: u32) -> DaemonId {
        self.shift(stable_hash(path), copy)
    }

    /// Daemon holding copy `copy` of chunk `chunk_id` of `path`
    pub fn locate_data(&self, path: &str, chunk_id: u64, copy: u32) -> DaemonId {
        let key = format!("{}{}", path, chunk_id);
        self.shift(stable_hash(&key), copy)
    }

    fn shift(&self, hash: u64, copy: u32) -> DaemonId {
        let n = self.num_daemons as u64;
        ((hash % n + u64::from(copy)) % n) as DaemonId
    }

    /// Group chunk ids by the daemon holding copy `copy` of them.
    ///
    /// Daemons appear in the order their first chunk was seen and each
    /// daemon's chunk ids keep their input order.
    pub fn group_by_target<I>(&self, path: &str, chunk_ids: I, copy: u32) -> Vec<(DaemonId, Vec<u64>)>
    where
        I: IntoIterator<Item = u64>,
    {
        let mut groups: Vec<(DaemonId, Vec<u64>)> = Vec::new();
        for chunk_id in chunk_ids {
            let target = self.locate_data(path, chunk_id, copy);
            match groups.iter_mut().find(|(daemon, _)| *daemon == target) {
                Some((_, ids)) => {
                    if !ids.contains(&chunk_id) {
                        ids.push(chunk_id);
                    }
                }
                None => groups.push((target, vec![chunk_id])),
            }
        }
        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_placement_is_deterministic() {
        let a = ChunkPlacement::new(7);
        let b = ChunkPlacement::new(7);
        for chunk in 0..200 {
            assert_eq!(a.locate_data("/data/out.h5", chunk, 0), b.locate_data("/data/out.h5", chunk, 0));
        }
        assert_eq!(stable_hash("/a"), stable_hash("/a"));
        assert_ne!(stable_hash("/a"), stable_hash("/b"));
    }

    #[test]
    fn test_copies_land_on_distinct_daemons() {
        let placement = ChunkPlacement::new(4);
        for chunk in 0..100 {
            let targets: HashSet<DaemonId> =
                (0..4).map(|copy| placement.locate_data("/f", chunk, copy)).collect();
            assert_eq!(targets.len(), 4);
        }
    }

    #[test]
    fn test_spread_across_daemons() {
        let placement = ChunkPlacement::new(8);
        let mut counts = [0usize; 8];
        for chunk in 0..8000 {
            counts[placement.locate_data("/big", chunk, 0)] += 1;
        }
        for count in counts {
            assert!(count > 700 && count < 1300, "skewed placement: {:?}", counts);
        }
    }

    #[test]
    fn test_group_by_target_preserves_order() {
        let placement = ChunkPlacement::new(3);
        let chunks: Vec<u64> = (10..40).collect();
        let groups = placement.group_by_target("/g", chunks.iter().copied(), 0);

        let total: usize = groups.iter().map(|(_, ids)| ids.len()).sum();
        assert_eq!(total, chunks.len());

        let first_target = placement.locate_data("/g", 10, 0);
        assert_eq!(groups[0].0, first_target);
        assert_eq!(groups[0].1[0], 10);

        for (target, ids) in &groups {
            assert!(ids.windows(2).all(|w| w[0] < w[1]));
            assert!(ids.iter().all(|id| placement.locate_data("/g", *id, 0) == *target));
        }
    }
}
