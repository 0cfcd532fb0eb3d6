/*
 * proptest.rs
 *
 * property-based tests for layout arithmetic and pool bookkeeping.
 * generates thousands of geometries and operation sequences to find
 * edge cases the hand-written tests miss.
 */

use proptest::prelude::*;
use std::collections::HashSet;
use std::ptr::NonNull;

use linepool::{
    ChunkLayout, CountingPool, DescriptorFault, HEADER_SIZE, OwnedChunk, Pool, PoolDescriptor,
    PoolError, required_bytes,
};

fn line_size() -> impl Strategy<Value = u32> {
    (3u32..=12).prop_map(|shift| 1 << shift)
}

/* ============================================================================
 * Layout Properties
 * ============================================================================ */

proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    /* required bytes cover the header and every block, and never overshoot
     * by more than one line per block plus one for the header */
    #[test]
    fn layout_required_bytes_bounds(
        size in 1u32..100_000,
        count in 1u32..100_000,
        line in line_size(),
    ) {
        let bytes = required_bytes(size, count, line);
        let floor = HEADER_SIZE as u64 + u64::from(size) * u64::from(count);
        let slack = u64::from(line) * (u64::from(count) + 1);
        prop_assert!(bytes >= floor);
        prop_assert!(bytes <= floor + slack);
        prop_assert_eq!(bytes % u64::from(line), 0);
    }

    /* every block starts on a line, after the header, and does not overlap
     * the next one */
    #[test]
    fn layout_block_offsets_aligned(
        size in 1u32..10_000,
        count in 1u32..1_000,
        line in line_size(),
        pick in any::<u32>(),
    ) {
        let layout = ChunkLayout::new(size, count, line);
        let i = pick % count;
        let offset = layout.block_offset(i);

        prop_assert_eq!(offset % u64::from(line), 0);
        prop_assert!(offset >= layout.header_bytes());
        prop_assert!(offset + u64::from(size) <= layout.required_bytes());
        if i + 1 < count {
            prop_assert!(offset + u64::from(size) <= layout.block_offset(i + 1));
        }
    }

    /* the stride is the block size rounded up, never more than a line extra */
    #[test]
    fn layout_stride_is_tight(size in 1u32..1_000_000, line in line_size()) {
        let stride = ChunkLayout::new(size, 1, line).stride();
        prop_assert!(stride >= u64::from(size));
        prop_assert!(stride < u64::from(size) + u64::from(line));
        prop_assert_eq!(stride % u64::from(line), 0);
    }

    /* a cache line that is not a power of two is always rejected, no matter
     * how big the buffer is */
    #[test]
    fn descriptor_rejects_non_power_of_two(line in 9u32..4096) {
        prop_assume!(!line.is_power_of_two());
        let mut buf = vec![0u8; 16];
        let desc = PoolDescriptor::new(64, 1, line, &mut buf);
        prop_assert_eq!(desc.validate(), Err(DescriptorFault::CacheLineNotPowerOfTwo(line)));
    }
}

/* ============================================================================
 * Pool Properties
 * ============================================================================ */

#[derive(Debug, Clone)]
enum Op {
    Alloc,
    /* free the held block at this position (modulo held count) */
    Free(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => Just(Op::Alloc),
        2 => any::<usize>().prop_map(Op::Free),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    /* under any sequential mix of operations: held + free == capacity,
     * allocate fails only when nothing is free, held blocks never repeat,
     * and the statistics count exactly the successful allocations */
    #[test]
    fn pool_conserves_blocks(
        size in 1u32..512,
        count in 1u32..64,
        line in line_size(),
        ops in prop::collection::vec(op(), 1..200),
    ) {
        let mut chunk = OwnedChunk::for_layout(&ChunkLayout::new(size, count, line)).unwrap();
        let pool: CountingPool<'_> =
            Pool::create(PoolDescriptor::new(size, count, line, chunk.as_mut_slice())).unwrap();

        let mut held: Vec<NonNull<u8>> = Vec::new();
        let mut successes = 0u64;

        for op in ops {
            match op {
                Op::Alloc => match pool.allocate() {
                    Ok(block) => {
                        prop_assert!(!held.contains(&block), "block handed out twice");
                        prop_assert!(pool.contains(block));
                        held.push(block);
                        successes += 1;
                    }
                    Err(e) => {
                        prop_assert_eq!(e, PoolError::PoolExhausted);
                        prop_assert_eq!(held.len(), count as usize);
                    }
                },
                Op::Free(i) if !held.is_empty() => {
                    let block = held.swap_remove(i % held.len());
                    // SAFETY: block came from this pool and leaves `held` here.
                    unsafe { pool.free(block).unwrap() };
                }
                Op::Free(_) => {}
            }
            prop_assert_eq!(pool.free_blocks() as usize + held.len(), count as usize);
        }

        prop_assert_eq!(pool.statistics().total_allocated_count, successes);
    }

    /* draining, refilling and draining again always yields the same set */
    #[test]
    fn pool_refill_same_block_set(
        size in 1u32..1024,
        count in 1u32..128,
        line in line_size(),
        seed in any::<u64>(),
    ) {
        let mut chunk = OwnedChunk::for_layout(&ChunkLayout::new(size, count, line)).unwrap();
        let pool: Pool<'_> =
            Pool::create(PoolDescriptor::new(size, count, line, chunk.as_mut_slice())).unwrap();

        let mut first = Vec::new();
        while let Ok(b) = pool.allocate() {
            first.push(b);
        }
        prop_assert_eq!(first.len(), count as usize);

        /* return in a scrambled order */
        let n = first.len();
        for k in 0..n {
            let j = (seed as usize).wrapping_add(k.wrapping_mul(7)) % (n - k);
            first.swap(k, k + j);
        }
        let first_set: HashSet<usize> = first.iter().map(|b| b.as_ptr() as usize).collect();
        for b in &first {
            // SAFETY: from this pool, freed once.
            unsafe { pool.free(*b).unwrap() };
        }

        let mut second = HashSet::new();
        while let Ok(b) = pool.allocate() {
            second.insert(b.as_ptr() as usize);
        }
        prop_assert_eq!(second, first_set);
    }

    /* checked free accepts exactly the block starts and nothing else */
    #[test]
    fn pool_checked_free_rejects_non_block_offsets(
        size in 1u32..256,
        count in 1u32..16,
        line in line_size(),
        offset in any::<u64>(),
    ) {
        let layout = ChunkLayout::new(size, count, line);
        let mut chunk = OwnedChunk::for_layout(&layout).unwrap();
        let base = chunk.as_slice().as_ptr() as usize;
        let pool: Pool<'_> =
            Pool::create(PoolDescriptor::new(size, count, line, chunk.as_mut_slice())).unwrap();

        let offset = offset % layout.required_bytes();
        let is_block = offset >= layout.header_bytes()
            && (offset - layout.header_bytes()) % layout.stride() == 0;
        let ptr = NonNull::new((base + offset as usize) as *mut u8).unwrap();

        prop_assert_eq!(pool.index_of(ptr).is_some(), is_block);
        if !is_block {
            // SAFETY: checked pool; a non-block address is rejected before any write.
            let err = unsafe { pool.free(ptr) }.unwrap_err();
            prop_assert_eq!(err, PoolError::InvalidBlock { addr: ptr.as_ptr() as usize });
            prop_assert_eq!(pool.free_blocks(), count);
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /* an offset strictly inside a block is never a block start, even for
     * small lines where the header ends exactly where block 0 begins */
    #[test]
    fn pool_block_interior_never_freeable(
        geometry in any::<u8>(),
        selector in any::<u8>(),
    ) {
        const COUNT: u32 = 32;
        let block_size = u32::from(geometry) + 1;
        let line = 8u32 << (geometry % 5);

        let layout = ChunkLayout::new(block_size, COUNT, line);
        let mut chunk = OwnedChunk::for_layout(&layout).unwrap();
        let base = chunk.as_slice().as_ptr() as usize;
        let pool: CountingPool<'_> =
            Pool::create(PoolDescriptor::new(block_size, COUNT, line, chunk.as_mut_slice())).unwrap();

        /* the first byte past the header is block 0 itself */
        let header_end = NonNull::new((base + layout.header_bytes() as usize) as *mut u8).unwrap();
        prop_assert_eq!(pool.index_of(header_end), Some(0));

        let k = u32::from(selector >> 2) % COUNT;
        let inside = 1 + u64::from(selector >> 2) % (layout.stride() - 1);
        let offset = (layout.block_offset(k) + inside) as usize;
        let interior = NonNull::new((base + offset) as *mut u8).unwrap();
        prop_assert_eq!(pool.index_of(interior), None);

        // SAFETY: checked pool; interior addresses are rejected before any write.
        let err = unsafe { pool.free(interior) }.unwrap_err();
        prop_assert_eq!(err, PoolError::InvalidBlock { addr: base + offset });
        prop_assert_eq!(pool.free_blocks(), COUNT);
    }
}
