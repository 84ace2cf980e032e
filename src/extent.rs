//! The data model: a physical extent, the allocator's view of one,
//! and the records the cache hands back to its three collaborators
//! (the allocator, the block I/O engine, and -- via [`crate::persist`]
//! -- the metadata service).
use crate::error::{ExtentCacheError, Result};
use crate::options::AlignmentOptions;

/// One contiguous physical extent backing a contiguous logical region
/// of a single range.
///
/// # Invariants
/// `logical_offset`, `length` and `physical_offset` are all multiples
/// of the process-wide `blocksize` whenever a `PExtent` is stored in
/// an [`crate::ExtentCache`]; this type itself does not enforce that,
/// since it is also the shape the allocator hands back *before* the
/// cache has had a chance to validate it (see [`crate::ExtentCache::merge`]).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PExtent {
    pub logical_offset: u64,
    pub length: u64,
    pub physical_offset: u64,
    /// `true` if this space is allocated but has never been written:
    /// reads within it must be zero-filled without issuing I/O.
    pub unwritten: bool,
}

impl PExtent {
    #[inline]
    pub fn logical_end(&self) -> u64 {
        self.logical_offset + self.length
    }

    #[inline]
    pub fn physical_end(&self) -> u64 {
        self.physical_offset + self.length
    }

    /// Checks the structural requirements a `PExtent` must satisfy
    /// before it can be merged into, or loaded into, a cache: block
    /// alignment, nonzero length, and containment within the range
    /// starting at `range_start`.
    pub(crate) fn validate(&self, opts: &AlignmentOptions, range_start: u64) -> Result<()> {
        if self.length == 0 {
            return Err(ExtentCacheError::ZeroLength {
                logical_offset: self.logical_offset,
            });
        }
        if !opts.is_aligned(self.logical_offset) {
            return Err(ExtentCacheError::Misaligned {
                value: self.logical_offset,
                blocksize: opts.blocksize,
            });
        }
        if !opts.is_aligned(self.length) {
            return Err(ExtentCacheError::Misaligned {
                value: self.length,
                blocksize: opts.blocksize,
            });
        }
        if !opts.is_aligned(self.physical_offset) {
            return Err(ExtentCacheError::Misaligned {
                value: self.physical_offset,
                blocksize: opts.blocksize,
            });
        }
        let range_end = range_start + opts.range_size;
        if self.logical_offset < range_start || self.logical_end() > range_end {
            return Err(ExtentCacheError::CrossesRangeBoundary {
                logical_offset: self.logical_offset,
                end: self.logical_end(),
                range_size: opts.range_size,
            });
        }
        Ok(())
    }

    /// Two extents are coalescable (invariant 4 of the data model)
    /// iff `self` immediately precedes `next` both logically and
    /// physically, and they carry the same `unwritten` flag.
    pub(crate) fn coalescable_with(&self, next: &PExtent) -> bool {
        self.logical_end() == next.logical_offset
            && self.physical_end() == next.physical_offset
            && self.unwritten == next.unwritten
    }
}

/// A request for a new physical extent, handed to the allocator.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AllocInfo {
    pub logical_offset: u64,
    pub length: u64,
}

/// A segment of a write whose backing is already mapped (whether
/// written or unwritten -- the caller overwrites it; `unwritten`
/// extents are flipped to written by a subsequent `mark_written`).
#[derive(Clone, Copy, Debug)]
pub struct WritePart<'a> {
    pub logical_offset: u64,
    pub length: u64,
    pub data: &'a [u8],
}

/// A segment of a write for which no mapping exists yet.  `alloc_info`
/// is block-aligned and extended towards `preallocSize`; `padding` and
/// `write_length` describe where the caller's actual bytes sit inside
/// that aligned request.
#[derive(Clone, Copy, Debug)]
pub struct AllocPart<'a> {
    pub alloc_info: AllocInfo,
    pub padding: u64,
    pub write_length: u64,
    pub data: &'a [u8],
}

/// A segment of a read: either backed by a written extent (in which
/// case `physical_offset` is `Some` and the caller issues I/O), or a
/// hole -- unmapped, or mapped but `unwritten` -- in which case
/// `physical_offset` is `None` and the caller zero-fills `buf`.
///
/// `buf` is a raw pointer rather than a borrowed slice because
/// `divide_for_read` hands back many `ReadPart`s that each alias a
/// disjoint sub-range of one caller-supplied output buffer; the cache
/// guarantees (see [`crate::Range::divide_for_read`]) that the ranges
/// never overlap, but expressing "many disjoint `&mut [u8]` into one
/// slice" safely requires either unstable standard library APIs or
/// unsafe code at the call site -- the pointer makes that unsafety
/// explicit and keeps it in the caller's hands, same as `WritePart`
/// and `AllocPart` do for the input side.
#[derive(Clone, Copy, Debug)]
pub struct ReadPart {
    pub logical_offset: u64,
    pub length: u64,
    pub physical_offset: Option<u64>,
    pub buf: *mut u8,
}
