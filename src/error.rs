/*
 * error.rs
 *
 * Three things can go wrong and only one of them happens in steady state.
 *
 * PoolExhausted      - allocate on an empty free list. Reported at once,
 *                      never retried.
 * InvalidDescriptor  - checked construction only.
 * InvalidBlock       - checked free only.
 *
 * Fast pools never produce the last two; the same mistakes are UB there.
 */

use core::fmt;

/// exit codes for the linepool CLI. scripts check these.
pub mod exit_codes {
    pub const SUCCESS: u8 = 0;
    /// probe found a broken invariant (duplicate block, lost marker, ...)
    pub const PROBE_FAILED: u8 = 1;
    /// bad arguments, invalid geometry, or the chunk could not be allocated
    pub const USAGE: u8 = 2;
}

/// Which construction precondition a descriptor broke.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorFault {
    ZeroBlockSize,
    ZeroBlockCount,
    CacheLineNotPowerOfTwo(u32),
    CacheLineTooSmall(u32),
    ChunkTooSmall { required: u64, actual: u64 },
    MisalignedChunk { addr: usize, cache_line_size: u32 },
}

impl fmt::Display for DescriptorFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroBlockSize => write!(f, "block size must be positive"),
            Self::ZeroBlockCount => write!(f, "block count must be positive"),
            Self::CacheLineNotPowerOfTwo(n) => {
                write!(f, "cache line size {n} is not a power of two")
            }
            Self::CacheLineTooSmall(n) => write!(
                f,
                "cache line size {n} is below the minimum of {}",
                crate::layout::MIN_CACHE_LINE_SIZE
            ),
            Self::ChunkTooSmall { required, actual } => {
                write!(f, "chunk holds {actual} bytes, layout needs {required}")
            }
            Self::MisalignedChunk {
                addr,
                cache_line_size,
            } => write!(
                f,
                "chunk start {addr:#x} is not aligned to the {cache_line_size} byte cache line"
            ),
        }
    }
}

/* everything a pool can report */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolError {
    InvalidDescriptor(DescriptorFault),
    PoolExhausted,
    InvalidBlock { addr: usize },
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidDescriptor(fault) => write!(f, "invalid descriptor: {fault}"),
            Self::PoolExhausted => write!(f, "pool exhausted: no free blocks"),
            Self::InvalidBlock { addr } => {
                write!(f, "invalid block: {addr:#x} is not a block of this pool")
            }
        }
    }
}

impl core::error::Error for PoolError {}

impl From<DescriptorFault> for PoolError {
    fn from(fault: DescriptorFault) -> Self {
        Self::InvalidDescriptor(fault)
    }
}

pub type Result<T> = core::result::Result<T, PoolError>;
