/*
 * pool.rs
 *
 * The pool itself: header placement, carving the chunk into blocks, and
 * the lock-free allocate/free pair.
 *
 * Free blocks form a singly linked LIFO through their first four bytes,
 * which hold the index of the next free block. Allocated blocks belong to
 * the caller entirely; the link is just the first word of their payload
 * until the block comes back.
 *
 * allocate: snapshot head, read its link, swap head -> link. Lost the
 * swap? loop with whatever beat us. Empty head? PoolExhausted, right away.
 *
 * free: point the block's link at the current head, swap head -> block.
 * Lost the swap? re-point and loop. The freeing thread owns the block, so
 * nobody else writes that link while we do.
 *
 * Both are lock-free, not wait-free: under sustained contention one
 * thread can keep losing while the pool as a whole makes progress.
 *
 * A popper holding a stale snapshot may read the link of a block that
 * another thread already owns and is writing to. The value it reads is
 * discarded because its swap cannot succeed against the bumped generation,
 * and the read itself never leaves the chunk since head indices are always
 * in range.
 *
 * That read is still a data race in the Rust memory model: a relaxed atomic
 * load of the link word can run concurrently with the new holder's plain
 * writes to the same bytes. Miri reports it. Every intrusive Treiber stack
 * has it; the generation tag makes the value unused, not the access legal.
 */

use core::fmt;
use core::ptr::NonNull;
use core::sync::atomic::{AtomicU32, Ordering};

use crate::descriptor::{Mode, PoolDescriptor};
use crate::error::{PoolError, Result};
use crate::layout::ChunkLayout;
use crate::stats::{Counters, Diagnostics, NoStats, Statistics};
use crate::sync::{AtomicHead, EMPTY};

/// What construction writes at the start of the chunk.
#[repr(C)]
pub(crate) struct Header<D> {
    layout: ChunkLayout,
    mode: Mode,
    head: AtomicHead,
    stats: D,
}

/// Handle to a pool living inside a caller-owned chunk.
///
/// The handle is two pointers and is `Copy`: every copy talks to the same
/// header. `'a` is the borrow of the chunk, so the buffer outlives every
/// handle.
///
/// `D` selects diagnostics: [`NoStats`] (default) or [`Counters`].
pub struct Pool<'a, D: Diagnostics = NoStats> {
    header: &'a Header<D>,
    blocks: NonNull<u8>,
}

/// A pool that keeps allocation counters.
pub type CountingPool<'a> = Pool<'a, Counters>;

// SAFETY: the handle only reaches shared state through atomics in the
// header. Block memory behind `blocks` is touched by the pool only through
// the atomic link word, and the payload belongs to whichever caller holds
// the block. Moving the handle to another thread changes none of that.
unsafe impl<D: Diagnostics> Send for Pool<'_, D> {}

// SAFETY: see Send. Every method takes &self and synchronizes through the
// atomic head; there is no non-atomic shared state in the header.
unsafe impl<D: Diagnostics> Sync for Pool<'_, D> {}

impl<D: Diagnostics> Clone for Pool<'_, D> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<D: Diagnostics> Copy for Pool<'_, D> {}

impl<'a, D: Diagnostics> Pool<'a, D> {
    /// Validate the descriptor and build a checked pool over its chunk.
    ///
    /// Frees on the returned pool are range-checked.
    pub fn create(desc: PoolDescriptor<'a>) -> Result<Self> {
        let layout = desc.validate()?;
        // SAFETY: validate() established every precondition carve() needs:
        // positive sizes, power-of-two line >= MIN_CACHE_LINE_SIZE, an aligned
        // chunk start and a chunk at least required_bytes long.
        Ok(unsafe { Self::carve(desc.chunk, layout, Mode::Checked) })
    }

    /// Build a fast pool without validating anything.
    ///
    /// Frees on the returned pool are not range-checked either.
    ///
    /// # Safety
    ///
    /// `desc` must satisfy everything [`PoolDescriptor::validate`] checks:
    /// positive block size and count, a power-of-two `cache_line_size` of at
    /// least [`MIN_CACHE_LINE_SIZE`](crate::MIN_CACHE_LINE_SIZE), a chunk
    /// start aligned to it, and a chunk of at least
    /// [`required_bytes`](crate::required_bytes).
    pub unsafe fn create_unchecked(desc: PoolDescriptor<'a>) -> Self {
        let layout = desc.layout();
        // SAFETY: forwarded from the caller's contract.
        unsafe { Self::carve(desc.chunk, layout, Mode::Fast) }
    }

    /*
     * The partitioner. Runs once, and the &mut borrow means nobody else can
     * be looking at the chunk while it does.
     *
     * Safety: layout must describe a chunk that fits, with an aligned start
     * and a line of at least 8 bytes.
     */
    #[allow(clippy::cast_possible_truncation, clippy::multiple_unsafe_ops_per_block)]
    unsafe fn carve(chunk: &'a mut [u8], layout: ChunkLayout, mode: Mode) -> Self {
        let base = chunk.as_mut_ptr();
        let stride = layout.stride() as usize;
        let count = layout.blocks_in_chunk();

        // SAFETY: header_bytes <= required_bytes <= chunk.len().
        let first = unsafe { base.add(layout.header_bytes() as usize) };

        /* block i -> block i + 1, last -> EMPTY */
        for index in 0..count - 1 {
            // SAFETY: block `index` starts inside the chunk (index < count) and
            // is aligned to the cache line, which is at least align_of AtomicU32.
            // Every bit pattern of the old bytes is fine to overwrite.
            unsafe {
                let link = first.add(index as usize * stride).cast::<AtomicU32>();
                link.write(AtomicU32::new(index + 1));
            }
        }
        // SAFETY: same as above for the last block, count - 1 < count.
        unsafe {
            let link = first.add((count - 1) as usize * stride).cast::<AtomicU32>();
            link.write(AtomicU32::new(EMPTY));
        }

        let header = base.cast::<Header<D>>();
        // SAFETY: the chunk start is aligned to a line of at least 8 bytes,
        // which covers align_of Header, and header_bytes >= size_of Header.
        unsafe {
            header.write(Header {
                layout,
                mode,
                head: AtomicHead::new(0),
                stats: D::new(),
            });
        }

        Self {
            // SAFETY: initialized just above, and the chunk stays borrowed for 'a.
            header: unsafe { &*header },
            // SAFETY: derived from a slice pointer plus an in-bounds offset.
            blocks: unsafe { NonNull::new_unchecked(first) },
        }
    }

    /// Does nothing.
    ///
    /// The chunk was never the pool's to free. Drop or reuse the buffer once
    /// the borrow ends; that is the only thing that reclaims the memory.
    #[inline]
    pub fn release(self) {}

    /// Take a block off the free list.
    ///
    /// Returns [`PoolError::PoolExhausted`] as soon as the list is seen
    /// empty; exhaustion is never retried. The block is at least
    /// [`block_size`](Self::block_size) bytes and aligned to the cache line.
    /// Its contents are whatever the previous holder left.
    pub fn allocate(&self) -> Result<NonNull<u8>> {
        let head = &self.header.head;
        let mut retries: u32 = 0;
        let mut current = head.load(Ordering::Acquire);

        loop {
            if current.is_empty() {
                return Err(PoolError::PoolExhausted);
            }

            let next = self.link(current.index).load(Ordering::Relaxed);

            match head.compare_exchange(
                current,
                current.successor(next),
                Ordering::Acquire,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => {
                    current = actual;
                    retries = retries.saturating_add(1);
                }
            }
        }

        self.header.stats.record_alloc(retries);
        Ok(self.block_ptr(current.index))
    }

    /// Put a block back on the free list.
    ///
    /// Checked pools return [`PoolError::InvalidBlock`] for an address that
    /// is not the start of one of this pool's blocks. Fast pools never fail.
    ///
    /// # Safety
    ///
    /// `block` must have come from [`allocate`](Self::allocate) on this
    /// pool and must not have been freed since. The caller gives up the
    /// block: no reads or writes through it after this call. A checked pool
    /// rejects foreign addresses but cannot tell a double free from a
    /// legitimate one.
    pub unsafe fn free(&self, block: NonNull<u8>) -> Result<()> {
        let index = match self.header.mode {
            Mode::Checked => self.index_of(block).ok_or(PoolError::InvalidBlock {
                addr: block.as_ptr() as usize,
            })?,
            Mode::Fast => self.index_unchecked(block),
        };

        let head = &self.header.head;
        let link = self.link(index);
        let mut retries: u32 = 0;
        let mut current = head.load(Ordering::Relaxed);

        loop {
            link.store(current.index, Ordering::Relaxed);

            match head.compare_exchange(
                current,
                current.successor(index),
                Ordering::Release,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(actual) => {
                    current = actual;
                    retries = retries.saturating_add(1);
                }
            }
        }

        self.header.stats.record_free(retries);
        Ok(())
    }

    /// Index of the block starting at `block`, if there is one.
    ///
    /// `None` for addresses outside the block region and for addresses
    /// inside it that are not on a block boundary.
    #[must_use]
    pub fn index_of(&self, block: NonNull<u8>) -> Option<u32> {
        let offset = (block.as_ptr() as usize).checked_sub(self.blocks.as_ptr() as usize)?;
        let stride = self.block_size();
        if offset % stride != 0 {
            return None;
        }
        let index = u32::try_from(offset / stride).ok()?;
        (index < self.capacity()).then_some(index)
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, block: NonNull<u8>) -> bool {
        self.index_of(block).is_some()
    }

    /// Number of blocks on the free list right now.
    ///
    /// Walks the list, so it is only exact when no allocate or free is in
    /// flight. Stops after `capacity` steps even if the list were corrupt.
    #[must_use]
    pub fn free_blocks(&self) -> u32 {
        let mut index = self.header.head.load(Ordering::Acquire).index;
        let mut count = 0;
        while index != EMPTY && count < self.capacity() {
            count += 1;
            index = self.link(index).load(Ordering::Relaxed);
        }
        count
    }

    /// True when the next allocate would report exhaustion.
    #[inline]
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.header.head.load(Ordering::Acquire).is_empty()
    }

    #[inline]
    #[must_use]
    pub fn capacity(&self) -> u32 {
        self.header.layout.blocks_in_chunk()
    }

    /// Usable bytes per block: the requested size rounded to the cache line.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn block_size(&self) -> usize {
        self.header.layout.stride() as usize
    }

    #[inline]
    #[must_use]
    pub fn layout(&self) -> ChunkLayout {
        self.header.layout
    }

    #[inline]
    #[must_use]
    pub fn mode(&self) -> Mode {
        self.header.mode
    }

    /* index must be < capacity */
    #[inline]
    fn block_ptr(&self, index: u32) -> NonNull<u8> {
        debug_assert!(index < self.capacity());
        // SAFETY: index < blocks_in_chunk, so the offset stays inside the
        // block region of the chunk that `blocks` was derived from.
        unsafe { self.blocks.add(index as usize * self.block_size()) }
    }

    #[inline]
    fn link(&self, index: u32) -> &AtomicU32 {
        // SAFETY: block_ptr is in bounds and line aligned (>= 4 bytes). Any
        // bit pattern is a valid AtomicU32, so reading a block a caller has
        // scribbled on yields a number, not UB on the pool's side.
        unsafe { self.block_ptr(index).cast::<AtomicU32>().as_ref() }
    }

    #[inline]
    #[allow(clippy::cast_possible_truncation)]
    fn index_unchecked(&self, block: NonNull<u8>) -> u32 {
        let offset = block.as_ptr() as usize - self.blocks.as_ptr() as usize;
        debug_assert!(offset % self.block_size() == 0, "free of a misaligned block");
        let index = (offset / self.block_size()) as u32;
        debug_assert!(index < self.capacity(), "free of a foreign block");
        index
    }
}

impl Pool<'_, Counters> {
    /// Current diagnostics. Fields are read one at a time; see
    /// [`Counters::snapshot`].
    #[must_use]
    pub fn statistics(&self) -> Statistics {
        self.header.stats.snapshot()
    }
}

impl<D: Diagnostics> fmt::Debug for Pool<'_, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("layout", &self.header.layout)
            .field("mode", &self.header.mode)
            .field("blocks", &self.blocks)
            .finish()
    }
}
