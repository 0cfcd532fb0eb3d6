/*
 * stats.rs
 *
 * Optional allocation counters, picked by type parameter on Pool.
 *
 * NoStats is a ZST with empty inline hooks, so a plain Pool carries no
 * counter storage and issues no counter atomics. Counters pays one relaxed
 * fetch_add per allocate plus a CAS max-update whenever a call had to
 * retry harder than anything seen before.
 *
 * "Retry" means a compare_exchange on the head that lost to another
 * thread. An uncontended call records 0.
 */

use core::fmt;
use core::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crate::sync::raise_to;

mod private {
    pub trait Sealed {}
}

/// Hooks the free-list core calls after each successful operation.
///
/// Sealed: the pool layout reserves room for [`Counters`] and nothing
/// bigger.
pub trait Diagnostics: private::Sealed + Sync + Send + Sized {
    /// Fresh state, written into the header at construction.
    fn new() -> Self;

    /// One allocate committed after `retries` lost head swaps.
    fn record_alloc(&self, retries: u32);

    /// One free committed after `retries` lost head swaps.
    fn record_free(&self, retries: u32);
}

/// Diagnostics disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoStats;

impl private::Sealed for NoStats {}

impl Diagnostics for NoStats {
    #[inline(always)]
    fn new() -> Self {
        Self
    }

    #[inline(always)]
    fn record_alloc(&self, _retries: u32) {}

    #[inline(always)]
    fn record_free(&self, _retries: u32) {}
}

/// Diagnostics enabled: allocation total and worst-case contention.
#[derive(Debug, Default)]
#[repr(C)]
pub struct Counters {
    total_allocated: AtomicU64,
    alloc_worst_retries: AtomicU32,
    free_worst_retries: AtomicU32,
}

impl private::Sealed for Counters {}

impl Diagnostics for Counters {
    fn new() -> Self {
        Self::default()
    }

    #[inline]
    fn record_alloc(&self, retries: u32) {
        self.total_allocated.fetch_add(1, Ordering::Relaxed);
        raise_to(&self.alloc_worst_retries, retries);
    }

    #[inline]
    fn record_free(&self, retries: u32) {
        raise_to(&self.free_worst_retries, retries);
    }
}

impl Counters {
    /// Field-by-field relaxed read. Not atomic across fields: a snapshot
    /// taken while other threads allocate may mix old and new values.
    #[must_use]
    pub fn snapshot(&self) -> Statistics {
        Statistics {
            total_allocated_count: self.total_allocated.load(Ordering::Relaxed),
            alloc_worst_retry_count: self.alloc_worst_retries.load(Ordering::Relaxed),
            free_worst_retry_count: self.free_worst_retries.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of a counting pool's diagnostics.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Statistics {
    /// Successful allocations since construction. Never decremented.
    pub total_allocated_count: u64,
    /// Most head-swap retries any single allocate needed.
    ///
    /// Counts lost swaps, not attempts: an uncontended allocate is 0, one
    /// lost race is 1. Tools that count attempts report one more for the
    /// same history.
    pub alloc_worst_retry_count: u32,
    /// Most head-swap retries any single free needed. Lost swaps, as for
    /// [`alloc_worst_retry_count`](Self::alloc_worst_retry_count).
    pub free_worst_retry_count: u32,
}

impl fmt::Display for Statistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "allocated {} total, worst retries: alloc {}, free {}",
            self.total_allocated_count, self.alloc_worst_retry_count, self.free_worst_retry_count
        )
    }
}
