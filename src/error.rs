//! Typed failures for the extent cache.  The cache is a pure
//! in-memory structure: every error here is a programmer error (bad
//! input from the allocator, or a corrupt persisted snapshot), never
//! a transient runtime condition.  Callers are expected to propagate
//! these, not log-and-continue.

/// All fallible public operations on [`crate::ExtentCache`] return
/// this error type.
#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
pub enum ExtentCacheError {
    /// A `Merge` or `Build` input was not a multiple of `blocksize`.
    #[error("offset/length {value} is not aligned to blocksize {blocksize}")]
    Misaligned { value: u64, blocksize: u32 },

    /// A zero-length extent was passed to `Merge` or found in a
    /// persisted snapshot.
    #[error("extent at logical offset {logical_offset} has zero length")]
    ZeroLength { logical_offset: u64 },

    /// The extent does not fit within a single range.
    #[error(
        "extent [{logical_offset}, {end}) does not fit within one range of size {range_size}"
    )]
    CrossesRangeBoundary {
        logical_offset: u64,
        end: u64,
        range_size: u64,
    },

    /// `Merge` was asked to insert an extent that overlaps one already
    /// present in the cache.  The allocator must never hand back
    /// space that is already mapped.
    #[error(
        "new extent [{new_start}, {new_end}) overlaps existing extent [{existing_start}, {existing_end})"
    )]
    Overlap {
        new_start: u64,
        new_end: u64,
        existing_start: u64,
        existing_end: u64,
    },

    /// `Build` was given a persisted snapshot whose entries overlap,
    /// are misaligned, or are not contained in their range.
    #[error("invalid persisted input at range {range_start}: {reason}")]
    InvalidPersistedInput {
        range_start: u64,
        reason: &'static str,
    },
}

pub type Result<T> = std::result::Result<T, ExtentCacheError>;
