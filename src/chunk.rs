/*
 * chunk.rs
 *
 * Caller-side helper: an aligned, zeroed buffer from posix_memalign.
 *
 * The pool never calls any of this. It borrows whatever slice it is given
 * and never frees it. OwnedChunk is for callers (and our tests, fuzz
 * targets and CLI) who just want a correctly sized chunk without writing
 * the libc dance themselves.
 */

use core::ptr::NonNull;

use crate::layout::ChunkLayout;

/// Heap buffer aligned to a cache line, released with `free(3)` on drop.
#[derive(Debug)]
pub struct OwnedChunk {
    ptr: NonNull<u8>,
    len: usize,
}

// SAFETY: OwnedChunk uniquely owns its allocation, like Box<[u8]>. malloc'd
// memory may be freed from any thread.
unsafe impl Send for OwnedChunk {}

// SAFETY: shared access only hands out &[u8]; mutation needs &mut self.
unsafe impl Sync for OwnedChunk {}

impl OwnedChunk {
    /// Allocate `len` zeroed bytes aligned to `align`.
    ///
    /// Returns `None` for a zero length, a non-power-of-two alignment, or
    /// when the allocation fails.
    #[must_use]
    pub fn new(len: usize, align: usize) -> Option<Self> {
        if len == 0 || !align.is_power_of_two() {
            return None;
        }
        /* posix_memalign wants at least pointer alignment */
        let align = align.max(core::mem::size_of::<*mut libc::c_void>());

        let mut raw: *mut libc::c_void = core::ptr::null_mut();
        // SAFETY: raw is a valid out-pointer; align is a power of two and a
        // multiple of sizeof(void *), which is all posix_memalign requires.
        let rc = unsafe { libc::posix_memalign(&raw mut raw, align, len) };
        if rc != 0 {
            return None;
        }
        let ptr = NonNull::new(raw.cast::<u8>())?;

        /* hand out initialized bytes; a &mut [u8] over garbage is UB */
        // SAFETY: ptr is valid for len bytes, just allocated.
        unsafe { ptr.as_ptr().write_bytes(0, len) };

        Some(Self { ptr, len })
    }

    /// Allocate exactly `layout.required_bytes()` bytes on its cache line.
    ///
    /// `None` if the layout does not fit the address space or the cache
    /// line is not a power of two.
    #[must_use]
    pub fn for_layout(layout: &ChunkLayout) -> Option<Self> {
        let len = usize::try_from(layout.required_bytes()).ok()?;
        Self::new(len, layout.cache_line_size() as usize)
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Always false; zero-length chunks are refused at construction.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: ptr is valid and initialized for len bytes for as long as
        // self lives; the shared borrow prevents concurrent mutation.
        unsafe { core::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    #[inline]
    #[must_use]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: as above, and &mut self makes this borrow unique.
        unsafe { core::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for OwnedChunk {
    fn drop(&mut self) {
        // SAFETY: ptr came from posix_memalign and is freed exactly once.
        unsafe { libc::free(self.ptr.as_ptr().cast::<libc::c_void>()) };
    }
}
