//! Block arithmetic for power-of-two block sizes
//!
//! All helpers take the block size explicitly and use bit masking. Passing a
//! block size that is not a power of two is a programming error and trips an
//! assertion; sizes come from validated configuration, never from requests.

/// Check whether `n` is a power of two
#[inline]
pub const fn is_power_of_two(n: u64) -> bool {
    n != 0 && (n & (n - 1)) == 0
}

/// Base-2 logarithm of a power of two
#[inline]
pub fn log2(n: u64) -> u32 {
    debug_assert!(is_power_of_two(n), "{} is not a power of two", n);
    n.trailing_zeros()
}

#[inline]
fn mask(block_size: u64) -> u64 {
    debug_assert!(is_power_of_two(block_size), "block size {} is not a power of two", block_size);
    block_size - 1
}

/// Check whether `offset` sits on a block boundary
#[inline]
pub fn is_aligned(offset: u64, block_size: u64) -> bool {
    offset & mask(block_size) == 0
}

/// Round `offset` down to the start of its block
#[inline]
pub fn align_left(offset: u64, block_size: u64) -> u64 {
    offset & !mask(block_size)
}

/// Round `offset` up to the next block boundary (unchanged if aligned)
#[inline]
pub fn align_right(offset: u64, block_size: u64) -> u64 {
    align_left(offset + mask(block_size), block_size)
}

/// Bytes between the start of the block and `offset`
#[inline]
pub fn block_overrun(offset: u64, block_size: u64) -> u64 {
    offset & mask(block_size)
}

/// Bytes between `offset` and the next block boundary, 0 if aligned
#[inline]
pub fn block_underrun(offset: u64, block_size: u64) -> u64 {
    align_right(offset, block_size) - offset
}

/// Index of the block containing `offset`
#[inline]
pub fn block_index(offset: u64, block_size: u64) -> u64 {
    align_left(offset, block_size) >> log2(block_size)
}

/// Number of blocks touched by the byte range `[offset, offset + size)`
pub fn block_count(offset: u64, size: u64, block_size: u64) -> u64 {
    if size == 0 {
        return 0;
    }
    let end = offset + size;
    let first = align_left(offset, block_size) >> log2(block_size);
    let last = align_left(end, block_size) >> log2(block_size);
    last - first + u64::from(!is_aligned(end, block_size))
}
