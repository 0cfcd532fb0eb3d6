/*
 * layout.rs
 *
 * Chunk geometry. Pure arithmetic, no memory is touched here.
 *
 *   chunk start (cache-line aligned)
 *   +-----------+---------+---------+-----+-----------+
 *   | header    | block 0 | block 1 | ... | block n-1 |
 *   +-----------+---------+---------+-----+-----------+
 *   ^header_bytes^ stride  ^ stride
 *
 * header_bytes = round_up(HEADER_SIZE, cache_line)
 * stride       = round_up(block_size, cache_line)
 * required     = header_bytes + stride * blocks_in_chunk
 *
 * Everything is computed in u64. With u32 inputs the largest possible
 * result is 2^32 * (2^32 - 1) + 2^31, which still fits.
 */

use core::fmt;

use crate::pool::Header;
use crate::stats::Counters;

/// Cache line size used when the caller has no better number.
///
/// 128 covers the adjacent-line prefetcher on x86 and the 128 byte lines
/// on Apple silicon.
pub const DEFAULT_CACHE_LINE_SIZE: u32 = 128;

/// Smallest cache line accepted by checked construction.
///
/// The header needs 8 byte alignment and every free block stores a 4 byte
/// link in its first word, so anything smaller cannot hold the layout.
pub const MIN_CACHE_LINE_SIZE: u32 = 8;

/// Bytes reserved for the embedded pool header before rounding.
///
/// Always the size of the counting header, so one buffer size works for
/// both diagnostic configurations.
pub const HEADER_SIZE: usize = core::mem::size_of::<Header<Counters>>();

/*
 * Round value up to the next multiple of align.
 *
 * align must be a power of two. Anything else produces garbage, not a
 * panic - this is a bitmask, not a division.
 */
#[inline]
pub const fn round_up(value: u64, align: u64) -> u64 {
    (value + (align - 1)) & !(align - 1)
}

/// Bytes a chunk must provide for the given geometry.
///
/// Callable before any pool exists, so the caller can size the buffer it
/// will hand to construction. Never fails.
///
/// # Precondition
///
/// `cache_line_size` must be a power of two. The rounding is a bitmask and
/// the result is meaningless otherwise.
///
/// ```rust
/// use linepool::{HEADER_SIZE, required_bytes};
///
/// let bytes = required_bytes(76, 8, 128);
/// assert_eq!(bytes % 128, 0);
/// assert!(bytes >= HEADER_SIZE as u64 + 76 * 8);
/// ```
#[inline]
pub const fn required_bytes(block_size: u32, blocks_in_chunk: u32, cache_line_size: u32) -> u64 {
    ChunkLayout::new(block_size, blocks_in_chunk, cache_line_size).required_bytes()
}

/// Geometry of one chunk: where the header ends and how far apart blocks sit.
///
/// This is the copy of the descriptor the pool keeps in its header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkLayout {
    block_size: u32,
    blocks_in_chunk: u32,
    cache_line_size: u32,
    header_bytes: u64,
    stride: u64,
}

impl ChunkLayout {
    /// Compute the layout. Same precondition as [`required_bytes`].
    #[must_use]
    pub const fn new(block_size: u32, blocks_in_chunk: u32, cache_line_size: u32) -> Self {
        let line = cache_line_size as u64;
        Self {
            block_size,
            blocks_in_chunk,
            cache_line_size,
            header_bytes: round_up(HEADER_SIZE as u64, line),
            stride: round_up(block_size as u64, line),
        }
    }

    /// Block size as requested, before rounding.
    #[inline]
    #[must_use]
    pub const fn block_size(&self) -> u32 {
        self.block_size
    }

    #[inline]
    #[must_use]
    pub const fn blocks_in_chunk(&self) -> u32 {
        self.blocks_in_chunk
    }

    #[inline]
    #[must_use]
    pub const fn cache_line_size(&self) -> u32 {
        self.cache_line_size
    }

    /// Header size rounded up to the cache line. Block 0 starts here.
    #[inline]
    #[must_use]
    pub const fn header_bytes(&self) -> u64 {
        self.header_bytes
    }

    /// Distance between consecutive blocks (block size rounded to the line).
    #[inline]
    #[must_use]
    pub const fn stride(&self) -> u64 {
        self.stride
    }

    /// Bytes covered by the blocks, header excluded.
    #[inline]
    #[must_use]
    pub const fn block_region_bytes(&self) -> u64 {
        self.stride * self.blocks_in_chunk as u64
    }

    #[inline]
    #[must_use]
    pub const fn required_bytes(&self) -> u64 {
        self.header_bytes + self.block_region_bytes()
    }

    /// Offset of block `index` from the chunk start.
    ///
    /// Does not check `index` against the block count.
    #[inline]
    #[must_use]
    pub const fn block_offset(&self, index: u32) -> u64 {
        self.header_bytes + self.stride * index as u64
    }
}

impl fmt::Display for ChunkLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} x {}B blocks (stride {}B, line {}B), header {}B, total {}B",
            self.blocks_in_chunk,
            self.block_size,
            self.stride,
            self.cache_line_size,
            self.header_bytes,
            self.required_bytes()
        )
    }
}

/* -------------------------------------------------------------------------- */
/*                              kani proofs                                   */
/* -------------------------------------------------------------------------- */

#[cfg(kani)]
mod kani_proofs {
    use super::*;

    /* pick an arbitrary power-of-two line up to 2^31 */
    fn any_line() -> u32 {
        let shift: u32 = kani::any();
        kani::assume(shift < 32);
        1u32 << shift
    }

    /*
     * round_up never goes below the input and always lands on a multiple.
     */
    #[kani::proof]
    fn verify_round_up_is_aligned_and_not_smaller() {
        let value: u32 = kani::any();
        let line = u64::from(any_line());

        let rounded = round_up(u64::from(value), line);

        kani::assert(rounded >= u64::from(value), "round_up must not shrink");
        kani::assert(rounded % line == 0, "round_up must land on a multiple");
        kani::assert(rounded - u64::from(value) < line, "round_up overshoots by less than a line");
    }

    /*
     * required_bytes covers the unrounded footprint and never wraps.
     */
    #[kani::proof]
    fn verify_required_bytes_covers_footprint() {
        let block_size: u32 = kani::any();
        let blocks: u32 = kani::any();
        let line = any_line();

        let layout = ChunkLayout::new(block_size, blocks, line);
        let unrounded = HEADER_SIZE as u128 + u128::from(block_size) * u128::from(blocks);

        kani::assert(
            u128::from(layout.required_bytes()) >= unrounded,
            "required_bytes must cover header plus raw blocks",
        );
    }

    /*
     * every block offset sits on a cache line boundary.
     */
    #[kani::proof]
    fn verify_block_offsets_are_line_aligned() {
        let block_size: u32 = kani::any();
        let blocks: u32 = kani::any();
        let index: u32 = kani::any();
        let line = any_line();
        kani::assume(index < blocks);

        let layout = ChunkLayout::new(block_size, blocks, line);

        kani::assert(
            layout.block_offset(index) % u64::from(line) == 0,
            "block offsets must be multiples of the cache line",
        );
    }
}
