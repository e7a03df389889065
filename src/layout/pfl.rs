//! Progressive file layout
//!
//! The file is split into components. Each component starts at a byte
//! offset and has its own stripe size; stripes usually grow with distance
//! into the file. Chunk ids stay globally unique and increasing because each
//! component carries the id of its first chunk as a prefix.

use super::arithmetic;

/// One component of a progressive layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PflComponent {
    /// First byte offset covered by the component
    pub start: u64,
    /// Stripe size inside the component
    pub stripe_size: u64,
}

impl PflComponent {
    pub fn new(start: u64, stripe_size: u64) -> Self {
        Self { start, stripe_size }
    }
}

/// Component table with precomputed chunk-id prefixes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressiveLayout {
    starts: Vec<u64>,
    stripes: Vec<u64>,
    chunk_ids: Vec<u64>,
}

impl ProgressiveLayout {
    /// Build the table.
    ///
    /// # Panics
    ///
    /// Panics if the table is empty, does not start at offset 0, has
    /// non-increasing starts, a stripe that is not a power of two, or a
    /// component that is not a whole number of its stripes long.
    pub fn new(components: &[PflComponent]) -> Self {
        assert!(!components.is_empty(), "progressive layout needs at least one component");
        assert_eq!(components[0].start, 0, "first component must start at offset 0");

        let mut starts = Vec::with_capacity(components.len());
        let mut stripes = Vec::with_capacity(components.len());
        let mut chunk_ids = Vec::with_capacity(components.len());

        for (i, component) in components.iter().enumerate() {
            assert!(
                arithmetic::is_power_of_two(component.stripe_size),
                "stripe size {} is not a power of two",
                component.stripe_size
            );

            let prefix = if i == 0 {
                0
            } else {
                let prev = &components[i - 1];
                assert!(component.start > prev.start, "component starts must strictly increase");
                let span = component.start - prev.start;
                assert_eq!(span % prev.stripe_size, 0, "component length must be a multiple of its stripe");
                chunk_ids[i - 1] + span / prev.stripe_size
            };

            starts.push(component.start);
            stripes.push(component.stripe_size);
            chunk_ids.push(prefix);
        }

        Self { starts, stripes, chunk_ids }
    }

    /// Number of components
    pub fn len(&self) -> usize {
        self.starts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.starts.is_empty()
    }

    /// Chunk id of the first chunk in component `k`
    pub fn chunk_id_prefix(&self, k: usize) -> u64 {
        self.chunk_ids[k]
    }

    /// Start offset of component `k`
    pub fn component_start(&self, k: usize) -> u64 {
        self.starts[k]
    }

    /// Last component whose start is not greater than `offset`
    pub fn component_for_offset(&self, offset: u64) -> usize {
        self.starts.partition_point(|&start| start <= offset) - 1
    }

    fn component_for_chunk(&self, chunk_id: u64) -> usize {
        self.chunk_ids.partition_point(|&id| id <= chunk_id) - 1
    }

    /// Chunk id containing `offset`
    pub fn block_index(&self, offset: u64) -> u64 {
        let k = self.component_for_offset(offset);
        self.chunk_ids[k] + arithmetic::block_index(offset - self.starts[k], self.stripes[k])
    }

    /// Number of chunks touched by `[offset, offset + size)`
    pub fn block_count(&self, offset: u64, size: u64) -> u64 {
        if size == 0 {
            return 0;
        }
        self.block_index(offset + size - 1) - self.block_index(offset) + 1
    }

    pub fn is_aligned(&self, offset: u64) -> bool {
        let k = self.component_for_offset(offset);
        arithmetic::is_aligned(offset - self.starts[k], self.stripes[k])
    }

    pub fn align_left(&self, offset: u64) -> u64 {
        let k = self.component_for_offset(offset);
        self.starts[k] + arithmetic::align_left(offset - self.starts[k], self.stripes[k])
    }

    pub fn align_right(&self, offset: u64) -> u64 {
        let k = self.component_for_offset(offset);
        self.starts[k] + arithmetic::align_right(offset - self.starts[k], self.stripes[k])
    }

    pub fn block_overrun(&self, offset: u64) -> u64 {
        let k = self.component_for_offset(offset);
        arithmetic::block_overrun(offset - self.starts[k], self.stripes[k])
    }

    pub fn block_underrun(&self, offset: u64) -> u64 {
        let k = self.component_for_offset(offset);
        arithmetic::block_underrun(offset - self.starts[k], self.stripes[k])
    }

    /// First byte offset of a chunk
    pub fn chunk_start(&self, chunk_id: u64) -> u64 {
        let k = self.component_for_chunk(chunk_id);
        self.starts[k] + (chunk_id - self.chunk_ids[k]) * self.stripes[k]
    }

    /// Nominal size of a chunk
    pub fn chunk_size(&self, chunk_id: u64) -> u64 {
        self.stripes[self.component_for_chunk(chunk_id)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    const KB: u64 = 1024;
    const MB: u64 = 1024 * 1024;

    fn default_table() -> ProgressiveLayout {
        ProgressiveLayout::new(&[
            PflComponent::new(0, 512 * KB),
            PflComponent::new(4 * MB, MB),
            PflComponent::new(8 * MB, 2 * MB),
            PflComponent::new(16 * MB, 4 * MB),
            PflComponent::new(32 * MB, 8 * MB),
            PflComponent::new(64 * MB, 16 * MB),
        ])
    }

    #[test]
    fn test_chunk_id_prefixes() {
        let pfl = default_table();
        let prefixes: Vec<u64> = (0..pfl.len()).map(|k| pfl.chunk_id_prefix(k)).collect();
        assert_eq!(prefixes, vec![0, 8, 12, 16, 20, 24]);
    }

    #[test]
    fn test_component_lookup() {
        let pfl = default_table();
        assert_eq!(pfl.component_for_offset(0), 0);
        assert_eq!(pfl.component_for_offset(4 * MB - 1), 0);
        assert_eq!(pfl.component_for_offset(4 * MB), 1);
        assert_eq!(pfl.component_for_offset(100 * MB), 5);
    }

    #[test]
    fn test_block_index_stays_inside_component_range() {
        let pfl = default_table();
        let mut rng = rand::thread_rng();
        for k in 0..pfl.len() - 1 {
            let lo = pfl.component_start(k);
            let hi = pfl.component_start(k + 1);
            for _ in 0..1000 {
                let offset = rng.gen_range(lo..hi);
                let id = pfl.block_index(offset);
                assert!(id >= pfl.chunk_id_prefix(k) && id < pfl.chunk_id_prefix(k + 1));
            }
        }
    }

    #[test]
    fn test_chunk_start_inverts_block_index() {
        let pfl = default_table();
        for id in 0..40 {
            let start = pfl.chunk_start(id);
            assert_eq!(pfl.block_index(start), id);
            assert_eq!(pfl.block_index(start + pfl.chunk_size(id) - 1), id);
            assert!(pfl.is_aligned(start));
        }
    }

    #[test]
    fn test_component_relative_helpers() {
        let pfl = default_table();
        // 4 MiB + 1.5 MiB sits in the 1 MiB component
        let offset = 4 * MB + MB + MB / 2;
        assert_eq!(pfl.align_left(offset), 5 * MB);
        assert_eq!(pfl.align_right(offset), 6 * MB);
        assert_eq!(pfl.block_overrun(offset), MB / 2);
        assert_eq!(pfl.block_underrun(offset), MB / 2);
        assert_eq!(pfl.block_count(4 * MB - 1, 2), 2);
        assert_eq!(pfl.block_count(0, 8 * MB), 12);
    }

    #[test]
    #[should_panic]
    fn test_rejects_non_power_of_two_stripe() {
        ProgressiveLayout::new(&[PflComponent::new(0, 3000)]);
    }
}
