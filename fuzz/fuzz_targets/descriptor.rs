/*
 * fuzz_targets/descriptor.rs
 *
 * fuzz target for descriptor validation and checked construction.
 * arbitrary geometry against a fixed buffer must either build a pool
 * whose every block lies inside the buffer, or fail cleanly.
 *
 * edge cases: u32::MAX sizes, cache line 0 and 1, counts that overflow
 * the buffer by one block, misaligned slices
 */

#![no_main]

use libfuzzer_sys::fuzz_target;
use linepool::{NoStats, Pool, PoolDescriptor};

#[repr(C, align(4096))]
struct Arena([u8; 64 * 1024]);

fuzz_target!(|data: &[u8]| {
    if data.len() < 14 {
        return;
    }
    let word = |i: usize| u32::from_le_bytes([data[i], data[i + 1], data[i + 2], data[i + 3]]);
    let block_size = word(0) % (1 << 16);
    let count = word(4) % 4096;
    let line = word(8);
    let skew = usize::from(u16::from_le_bytes([data[12], data[13]])) % 256;

    let mut arena = Box::new(Arena([0; 64 * 1024]));
    let chunk = &mut arena.0[skew..];
    let start = chunk.as_ptr() as usize;
    let end = start + chunk.len();

    let Ok(pool) = Pool::<NoStats>::create(PoolDescriptor::new(block_size, count, line, chunk)) else {
        return;
    };

    let mut held = Vec::new();
    while let Ok(block) = pool.allocate() {
        let addr = block.as_ptr() as usize;
        assert!(addr >= start && addr + pool.block_size() <= end);
        assert_eq!(addr % line as usize, 0);
        held.push(block);
    }
    assert_eq!(held.len(), count as usize);
    for block in held {
        // SAFETY: every block came from this pool and is freed once.
        unsafe { pool.free(block).unwrap() };
    }
});
