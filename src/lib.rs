/*
 * lib.rs
 *
 * The library is the product; the binary is a thin inspection tool on top.
 * no_std outside of tests: nothing here needs an allocator, which is the
 * point of a pool.
 */

//! # linepool
//!
//! A lock-free pool of fixed-size blocks carved out of one caller-owned,
//! cache-line aligned chunk.
//!
//! ```text
//!   chunk (caller owns it, pool borrows it)
//!   +--------+---------+---------+-----+-----------+
//!   | header | block 0 | block 1 | ... | block n-1 |
//!   +--------+---------+---------+-----+-----------+
//!       |
//!       +-- atomic head -> block k -> block j -> ... -> EMPTY
//! ```
//!
//! Every block and the header start on their own cache line, so two threads
//! holding neighbouring blocks never share a line. Allocation pops the head
//! of an intrusive Treiber stack and free pushes onto it; one compare-and-swap
//! per attempt, no locks, LIFO reuse.
//!
//! ## Quick Start
//!
//! ```rust
//! use linepool::{CountingPool, OwnedChunk, Pool, PoolDescriptor, PoolError, required_bytes};
//!
//! // size the chunk first, then own it
//! let bytes = required_bytes(76, 8, 128);
//! let mut chunk = OwnedChunk::new(bytes as usize, 128).unwrap();
//!
//! let pool: CountingPool<'_> =
//!     Pool::create(PoolDescriptor::new(76, 8, 128, chunk.as_mut_slice())).unwrap();
//!
//! let block = pool.allocate().unwrap();
//! assert_eq!(block.as_ptr() as usize % 128, 0);
//!
//! // SAFETY: block came from this pool and is returned once.
//! unsafe { pool.free(block).unwrap() };
//!
//! assert_eq!(pool.statistics().total_allocated_count, 1);
//! assert_eq!(pool.free_blocks(), 8);
//! # let _ = PoolError::PoolExhausted;
//! ```
//!
//! ## Checked and fast pools
//!
//! [`Pool::create`] validates the descriptor and range-checks every free.
//! [`Pool::create_unchecked`] skips both; broken preconditions are then
//! undefined behavior. Both return the same [`Pool`] type.
//!
//! ## Diagnostics
//!
//! `Pool<'a>` carries no counters. [`CountingPool`] (`Pool<'a, Counters>`)
//! tracks total allocations and the worst compare-and-swap retry count for
//! allocate and free, readable through [`Pool::statistics`].
//!
//! ## ABA
//!
//! The head packs a generation counter next to the block index and bumps it
//! on every swap, so a stale snapshot of a head that has since cycled back to
//! the same block cannot win. See the [`sync`] module.

#![cfg_attr(not(test), no_std)]

pub mod args;
pub mod chunk;
pub mod descriptor;
pub mod error;
pub mod layout;
pub mod pool;
pub mod stats;
pub mod sync;

pub use chunk::OwnedChunk;
pub use descriptor::{Mode, PoolDescriptor};
pub use error::{DescriptorFault, PoolError, Result};
pub use layout::{
    ChunkLayout, DEFAULT_CACHE_LINE_SIZE, HEADER_SIZE, MIN_CACHE_LINE_SIZE, required_bytes,
};
pub use pool::{CountingPool, Pool};
pub use stats::{Counters, Diagnostics, NoStats, Statistics};
