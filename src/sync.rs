/*
 * sync.rs
 *
 * The one shared word every allocate and free fights over.
 *
 * The free-list head is a u64:
 *
 *   63            32 31             0
 *   +---------------+---------------+
 *   |  generation   |  block index  |
 *   +---------------+---------------+
 *
 * index == EMPTY means the pool is exhausted. Every successful swap bumps
 * the generation, so a head that comes back to the same block index after
 * a pop/push/pop sequence no longer compares equal to a stale snapshot.
 * That closes the ABA window an untagged Treiber stack has; the only way
 * back in is a thread stalled across exactly k * 2^32 head mutations.
 *
 * No locks, no yielding. A failed compare_exchange hands back the value
 * that beat us and the caller loops with it.
 */

use core::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Index value meaning "no block".
pub const EMPTY: u32 = u32::MAX;

/// A decoded head snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Head {
    pub generation: u32,
    pub index: u32,
}

impl Head {
    #[inline]
    pub const fn new(generation: u32, index: u32) -> Self {
        Self { generation, index }
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.index == EMPTY
    }

    /// Same head with the generation moved past this one.
    #[inline]
    pub const fn successor(self, index: u32) -> Self {
        Self {
            generation: self.generation.wrapping_add(1),
            index,
        }
    }

    #[inline]
    pub const fn pack(self) -> u64 {
        ((self.generation as u64) << 32) | self.index as u64
    }

    #[inline]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn unpack(raw: u64) -> Self {
        Self {
            generation: (raw >> 32) as u32,
            index: raw as u32,
        }
    }
}

/// Generation-tagged atomic free-list head.
#[derive(Debug)]
#[repr(transparent)]
pub struct AtomicHead(AtomicU64);

impl AtomicHead {
    #[must_use]
    pub const fn new(index: u32) -> Self {
        Self(AtomicU64::new(Head::new(0, index).pack()))
    }

    #[inline]
    pub fn load(&self, order: Ordering) -> Head {
        Head::unpack(self.0.load(order))
    }

    /*
     * Strong compare_exchange: a failure always means another thread moved
     * the head, so every failure is a real retry worth counting.
     */
    #[inline]
    pub fn compare_exchange(
        &self,
        current: Head,
        new: Head,
        success: Ordering,
        failure: Ordering,
    ) -> Result<Head, Head> {
        self.0
            .compare_exchange(current.pack(), new.pack(), success, failure)
            .map(Head::unpack)
            .map_err(Head::unpack)
    }
}

/// Raise `slot` to `value` if `value` is larger.
///
/// Retries until the store commits or another thread has already recorded
/// something at least as large.
#[inline]
pub fn raise_to(slot: &AtomicU32, value: u32) {
    let mut seen = slot.load(Ordering::Relaxed);
    while value > seen {
        match slot.compare_exchange_weak(seen, value, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => break,
            Err(actual) => seen = actual,
        }
    }
}


/* -------------------------------------------------------------------------- */
/*                              kani proofs                                   */
/* -------------------------------------------------------------------------- */

#[cfg(kani)]
mod kani_proofs {
    use super::*;

    /*
     * pack/unpack is lossless for every generation and index.
     */
    #[kani::proof]
    fn verify_pack_round_trip() {
        let head = Head::new(kani::any(), kani::any());
        kani::assert(Head::unpack(head.pack()) == head, "pack must be lossless");
    }

    /*
     * a successor never packs to the same word as its predecessor, even when
     * the index is unchanged. this is what defeats ABA.
     */
    #[kani::proof]
    fn verify_successor_changes_word() {
        let head = Head::new(kani::any(), kani::any());
        let next = head.successor(head.index);
        kani::assert(next.pack() != head.pack(), "successor must differ");
    }
}
