//! Chunk Layout Module
//!
//! Converts between byte offsets and chunk ids. Two policies exist: flat
//! chunking with one fixed chunk size, and the progressive layout whose
//! stripe size depends on where in the file an offset falls.

pub mod arithmetic;
mod pfl;

pub use pfl::{PflComponent, ProgressiveLayout};

/// Chunk layout policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkLayout {
    /// Fixed-size chunks
    Flat { chunk_size: u64 },
    /// Component table with per-component stripe sizes
    Progressive(ProgressiveLayout),
}

/// The part of one chunk covered by a byte range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSpan {
    /// Chunk id
    pub chunk_id: u64,
    /// Offset inside the chunk
    pub chunk_offset: u64,
    /// Bytes covered inside this chunk
    pub len: u64,
    /// Offset of this span inside the caller's buffer
    pub buf_offset: u64,
}

impl ChunkLayout {
    /// Flat layout.
    ///
    /// # Panics
    ///
    /// Panics if `chunk_size` is not a power of two.
    pub fn flat(chunk_size: u64) -> Self {
        assert!(
            arithmetic::is_power_of_two(chunk_size),
            "chunk size {} is not a power of two",
            chunk_size
        );
        ChunkLayout::Flat { chunk_size }
    }

    /// Progressive layout, see [`ProgressiveLayout::new`] for the panics
    pub fn progressive(components: &[PflComponent]) -> Self {
        ChunkLayout::Progressive(ProgressiveLayout::new(components))
    }

    /// Chunk id containing `offset`
    pub fn block_index(&self, offset: u64) -> u64 {
        match self {
            ChunkLayout::Flat { chunk_size } => arithmetic::block_index(offset, *chunk_size),
            ChunkLayout::Progressive(pfl) => pfl.block_index(offset),
        }
    }

    /// Number of chunks touched by `[offset, offset + size)`
    pub fn block_count(&self, offset: u64, size: u64) -> u64 {
        match self {
            ChunkLayout::Flat { chunk_size } => arithmetic::block_count(offset, size, *chunk_size),
            ChunkLayout::Progressive(pfl) => pfl.block_count(offset, size),
        }
    }

    pub fn is_aligned(&self, offset: u64) -> bool {
        match self {
            ChunkLayout::Flat { chunk_size } => arithmetic::is_aligned(offset, *chunk_size),
            ChunkLayout::Progressive(pfl) => pfl.is_aligned(offset),
        }
    }

    pub fn align_left(&self, offset: u64) -> u64 {
        match self {
            ChunkLayout::Flat { chunk_size } => arithmetic::align_left(offset, *chunk_size),
            ChunkLayout::Progressive(pfl) => pfl.align_left(offset),
        }
    }

    pub fn align_right(&self, offset: u64) -> u64 {
        match self {
            ChunkLayout::Flat { chunk_size } => arithmetic::align_right(offset, *chunk_size),
            ChunkLayout::Progressive(pfl) => pfl.align_right(offset),
        }
    }

    /// Bytes since the last chunk boundary
    pub fn block_overrun(&self, offset: u64) -> u64 {
        match self {
            ChunkLayout::Flat { chunk_size } => arithmetic::block_overrun(offset, *chunk_size),
            ChunkLayout::Progressive(pfl) => pfl.block_overrun(offset),
        }
    }

    /// Bytes until the next chunk boundary
    pub fn block_underrun(&self, offset: u64) -> u64 {
        match self {
            ChunkLayout::Flat { chunk_size } => arithmetic::block_underrun(offset, *chunk_size),
            ChunkLayout::Progressive(pfl) => pfl.block_underrun(offset),
        }
    }

    /// First byte offset of a chunk
    pub fn chunk_start(&self, chunk_id: u64) -> u64 {
        match self {
            ChunkLayout::Flat { chunk_size } => chunk_id * chunk_size,
            ChunkLayout::Progressive(pfl) => pfl.chunk_start(chunk_id),
        }
    }

    /// Nominal size of a chunk
    pub fn chunk_size(&self, chunk_id: u64) -> u64 {
        match self {
            ChunkLayout::Flat { chunk_size } => *chunk_size,
            ChunkLayout::Progressive(pfl) => pfl.chunk_size(chunk_id),
        }
    }

    /// Smallest chunk size used anywhere in the layout
    pub fn min_chunk_size(&self) -> u64 {
        match self {
            ChunkLayout::Flat { chunk_size } => *chunk_size,
            ChunkLayout::Progressive(pfl) => pfl.chunk_size(0),
        }
    }

    /// Split `[offset, offset + len)` into per-chunk spans in chunk order.
    ///
    /// The first span may start inside its chunk and the last may end
    /// before the chunk boundary; every span in between covers a whole chunk.
    pub fn chunk_spans(&self, offset: u64, len: u64) -> ChunkSpans<'_> {
        ChunkSpans {
            layout: self,
            pos: offset,
            end: offset + len,
            buf_pos: 0,
        }
    }
}

/// Iterator returned by [`ChunkLayout::chunk_spans`]
pub struct ChunkSpans<'a> {
    layout: &'a ChunkLayout,
    pos: u64,
    end: u64,
    buf_pos: u64,
}

impl Iterator for ChunkSpans<'_> {
    type Item = ChunkSpan;

    fn next(&mut self) -> Option<ChunkSpan> {
        if self.pos >= self.end {
            return None;
        }
        let chunk_id = self.layout.block_index(self.pos);
        let chunk_offset = self.pos - self.layout.chunk_start(chunk_id);
        let room = self.layout.chunk_size(chunk_id) - chunk_offset;
        let len = room.min(self.end - self.pos);

        let span = ChunkSpan {
            chunk_id,
            chunk_offset,
            len,
            buf_offset: self.buf_pos,
        };
        self.pos += len;
        self.buf_pos += len;
        Some(span)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_spans() {
        let layout = ChunkLayout::flat(8);
        let spans: Vec<ChunkSpan> = layout.chunk_spans(5, 14).collect();
        assert_eq!(spans.len(), layout.block_count(5, 14) as usize);
        assert_eq!(
            spans,
            vec![
                ChunkSpan { chunk_id: 0, chunk_offset: 5, len: 3, buf_offset: 0 },
                ChunkSpan { chunk_id: 1, chunk_offset: 0, len: 8, buf_offset: 3 },
                ChunkSpan { chunk_id: 2, chunk_offset: 0, len: 3, buf_offset: 11 },
            ]
        );
    }

    #[test]
    fn test_empty_range_has_no_spans() {
        let layout = ChunkLayout::flat(4096);
        assert_eq!(layout.chunk_spans(100, 0).count(), 0);
    }

    #[test]
    fn test_progressive_spans_cross_component() {
        let layout = ChunkLayout::progressive(&[
            PflComponent::new(0, 4),
            PflComponent::new(8, 16),
        ]);
        let spans: Vec<ChunkSpan> = layout.chunk_spans(6, 12).collect();
        assert_eq!(
            spans,
            vec![
                ChunkSpan { chunk_id: 1, chunk_offset: 2, len: 2, buf_offset: 0 },
                ChunkSpan { chunk_id: 2, chunk_offset: 0, len: 10, buf_offset: 2 },
            ]
        );
        assert_eq!(layout.block_count(6, 12), 2);
        assert_eq!(layout.min_chunk_size(), 4);
    }

    #[test]
    #[should_panic]
    fn test_flat_rejects_bad_chunk_size() {
        ChunkLayout::flat(1000);
    }
}
