/*
 * descriptor.rs
 *
 * What the caller hands to construction, and the checks a checked pool
 * runs on it. Fast pools skip validate() entirely.
 */

use crate::error::DescriptorFault;
use crate::layout::{ChunkLayout, MIN_CACHE_LINE_SIZE};

/// Construction parameters for a [`Pool`](crate::Pool).
///
/// `chunk` is borrowed for the pool's whole lifetime. The pool never frees
/// or resizes it; dropping the buffer is the caller's job, and the borrow
/// makes sure that cannot happen while a pool handle is alive.
#[derive(Debug)]
pub struct PoolDescriptor<'a> {
    /// Usable bytes per block. Rounded up to `cache_line_size`.
    pub block_size: u32,
    pub blocks_in_chunk: u32,
    /// Must be a power of two. See [`DEFAULT_CACHE_LINE_SIZE`](crate::DEFAULT_CACHE_LINE_SIZE).
    pub cache_line_size: u32,
    /// Backing memory. Start must be aligned to `cache_line_size` and the
    /// length at least [`required_bytes`](crate::required_bytes).
    pub chunk: &'a mut [u8],
}

impl<'a> PoolDescriptor<'a> {
    pub fn new(
        block_size: u32,
        blocks_in_chunk: u32,
        cache_line_size: u32,
        chunk: &'a mut [u8],
    ) -> Self {
        Self {
            block_size,
            blocks_in_chunk,
            cache_line_size,
            chunk,
        }
    }

    /// Geometry implied by the sizes. Only meaningful for a power-of-two line.
    #[inline]
    #[must_use]
    pub fn layout(&self) -> ChunkLayout {
        ChunkLayout::new(self.block_size, self.blocks_in_chunk, self.cache_line_size)
    }

    /// Check every construction precondition, in the order a caller is most
    /// likely to get them wrong.
    pub fn validate(&self) -> Result<ChunkLayout, DescriptorFault> {
        if self.block_size == 0 {
            return Err(DescriptorFault::ZeroBlockSize);
        }
        if self.blocks_in_chunk == 0 {
            return Err(DescriptorFault::ZeroBlockCount);
        }
        if !self.cache_line_size.is_power_of_two() {
            return Err(DescriptorFault::CacheLineNotPowerOfTwo(self.cache_line_size));
        }
        if self.cache_line_size < MIN_CACHE_LINE_SIZE {
            return Err(DescriptorFault::CacheLineTooSmall(self.cache_line_size));
        }

        let layout = self.layout();
        let actual = self.chunk.len() as u64;
        if actual < layout.required_bytes() {
            return Err(DescriptorFault::ChunkTooSmall {
                required: layout.required_bytes(),
                actual,
            });
        }

        let addr = self.chunk.as_ptr() as usize;
        if addr & (self.cache_line_size as usize - 1) != 0 {
            return Err(DescriptorFault::MisalignedChunk {
                addr,
                cache_line_size: self.cache_line_size,
            });
        }

        Ok(layout)
    }
}

/// Whether a pool validates its inputs.
///
/// Picked once at construction; both modes expose the same [`Pool`](crate::Pool)
/// interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Mode {
    /// Descriptor validated at construction, freed addresses range-checked.
    Checked,
    /// No validation. Precondition violations are undefined behavior.
    Fast,
}

#[cfg(test)]
mod tests {
    use super::*;

    /* u64 storage gives 8 byte alignment, enough for the 8 byte line */
    fn buffer(words: usize) -> Vec<u64> {
        vec![0u64; words]
    }

    fn bytes(buf: &mut [u64]) -> &mut [u8] {
        // SAFETY: u8 has no alignment or validity requirements; the slice
        // covers exactly the bytes of buf and borrows it mutably.
        unsafe { core::slice::from_raw_parts_mut(buf.as_mut_ptr().cast::<u8>(), buf.len() * 8) }
    }

    #[test]
    fn test_zero_block_size() {
        let mut buf = buffer(64);
        let desc = PoolDescriptor::new(0, 4, 8, bytes(&mut buf));
        assert_eq!(desc.validate(), Err(DescriptorFault::ZeroBlockSize));
    }

    #[test]
    fn test_zero_block_count() {
        let mut buf = buffer(64);
        let desc = PoolDescriptor::new(16, 0, 8, bytes(&mut buf));
        assert_eq!(desc.validate(), Err(DescriptorFault::ZeroBlockCount));
    }

    #[test]
    fn test_cache_line_not_power_of_two() {
        let mut buf = buffer(64);
        let desc = PoolDescriptor::new(16, 4, 24, bytes(&mut buf));
        assert_eq!(
            desc.validate(),
            Err(DescriptorFault::CacheLineNotPowerOfTwo(24))
        );

        let desc = PoolDescriptor::new(16, 4, 0, bytes(&mut buf));
        assert_eq!(
            desc.validate(),
            Err(DescriptorFault::CacheLineNotPowerOfTwo(0))
        );
    }

    #[test]
    fn test_cache_line_too_small() {
        let mut buf = buffer(64);
        let desc = PoolDescriptor::new(16, 4, 4, bytes(&mut buf));
        assert_eq!(desc.validate(), Err(DescriptorFault::CacheLineTooSmall(4)));
    }

    #[test]
    fn test_chunk_too_small() {
        let mut buf = buffer(4);
        let desc = PoolDescriptor::new(16, 4, 8, bytes(&mut buf));
        let required = desc.layout().required_bytes();
        assert_eq!(
            desc.validate(),
            Err(DescriptorFault::ChunkTooSmall {
                required,
                actual: 32
            })
        );
    }

    #[test]
    fn test_misaligned_chunk() {
        let mut buf = buffer(64);
        let all = bytes(&mut buf);
        /* skip one byte so the start is off the 8 byte line */
        let desc = PoolDescriptor::new(16, 4, 8, &mut all[1..]);
        assert!(matches!(
            desc.validate(),
            Err(DescriptorFault::MisalignedChunk {
                cache_line_size: 8,
                ..
            })
        ));
    }

    #[test]
    fn test_valid_descriptor_returns_layout() {
        let mut buf = buffer(64);
        let desc = PoolDescriptor::new(16, 4, 8, bytes(&mut buf));
        let layout = desc.validate().expect("descriptor should be valid");
        assert_eq!(layout.stride(), 16);
        assert_eq!(layout.blocks_in_chunk(), 4);
    }
}
