/*
 * fuzz_targets/pool_ops.rs
 *
 * fuzz target for allocate/free sequences on a checked counting pool.
 * each input byte is one operation; the pool must never hand out a held
 * block, never lose one, and reject frees of addresses it does not own.
 */

#![no_main]

use libfuzzer_sys::fuzz_target;
use linepool::{ChunkLayout, CountingPool, OwnedChunk, Pool, PoolDescriptor, PoolError};
use std::ptr::NonNull;

const COUNT: u32 = 32;

fuzz_target!(|data: &[u8]| {
    let Some((&geometry, ops)) = data.split_first() else {
        return;
    };
    let block_size = u32::from(geometry) + 1;
    let line = 8u32 << (geometry % 5);

    let Some(mut chunk) = OwnedChunk::for_layout(&ChunkLayout::new(block_size, COUNT, line)) else {
        return;
    };
    let base = chunk.as_slice().as_ptr() as usize;
    let pool: CountingPool<'_> =
        match Pool::create(PoolDescriptor::new(block_size, COUNT, line, chunk.as_mut_slice())) {
            Ok(pool) => pool,
            Err(e) => panic!("valid geometry rejected: {e}"),
        };

    let mut held: Vec<NonNull<u8>> = Vec::new();
    let mut successes = 0u64;

    for &op in ops {
        match op % 4 {
            0 | 1 => match pool.allocate() {
                Ok(block) => {
                    assert!(!held.contains(&block));
                    held.push(block);
                    successes += 1;
                }
                Err(e) => {
                    assert_eq!(e, PoolError::PoolExhausted);
                    assert_eq!(held.len(), COUNT as usize);
                }
            },
            2 if !held.is_empty() => {
                let block = held.swap_remove(usize::from(op >> 2) % held.len());
                // SAFETY: block came from this pool and leaves `held` here.
                unsafe { pool.free(block).unwrap() };
            }
            _ => {
                /* strictly inside some block: never a block start */
                let layout = pool.layout();
                let k = u32::from(op >> 2) % COUNT;
                let inside = 1 + u64::from(op >> 2) % (layout.stride() - 1);
                let offset = (layout.block_offset(k) + inside) as usize;
                let bogus = NonNull::new((base + offset) as *mut u8).unwrap();
                assert_eq!(pool.index_of(bogus), None);
                // SAFETY: checked pool; interior addresses are rejected before any write.
                assert!(unsafe { pool.free(bogus) }.is_err());
            }
        }
        assert_eq!(pool.free_blocks() as usize + held.len(), COUNT as usize);
    }

    assert_eq!(pool.statistics().total_allocated_count, successes);
});
