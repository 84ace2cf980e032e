//! The top-level `ExtentCache`: the outer range dictionary, its
//! reader/writer lock, and the public operations that decompose
//! reads/writes per range and dispatch into [`crate::Range`].
use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::error::{ExtentCacheError, Result};
use crate::extent::{AllocPart, PExtent, ReadPart, WritePart};
use crate::options;
use crate::persist::PersistedMap;
use crate::range::Range;

/// The client-side logical-to-physical extent map for a single inode.
///
/// One multiple-reader/single-writer lock guards the whole instance.
/// `divide_for_read` and `to_inode` take the shared read mode;
/// `build`, `merge` and `mark_written` take the exclusive write mode.
/// `divide_for_write` also takes the write mode: it hands the caller a
/// snapshot the caller is about to act on (issue allocations and
/// writes against), so it must observe a consistent view rather than
/// one that a concurrent mutator could invalidate mid-computation.
pub struct ExtentCache {
    ranges: RwLock<HashMap<u64, Range>>,
}

impl Default for ExtentCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtentCache {
    pub fn new() -> Self {
        ExtentCache {
            ranges: RwLock::new(HashMap::new()),
        }
    }

    /// Replaces the cache's contents with a freshly built view of
    /// `persisted` -- the inode's extent mapping as read from the
    /// metadata service.  Not additive: any prior state is discarded
    /// first, the same way a file instance re-hydrates its cache
    /// after a lease handoff.
    pub fn build(&self, persisted: &PersistedMap) -> Result<()> {
        let opts = options::get_option();
        let mut built = HashMap::with_capacity(persisted.len());

        for (&range_start, entries) in persisted {
            if range_start % opts.range_size != 0 {
                return Err(ExtentCacheError::InvalidPersistedInput {
                    range_start,
                    reason: "range key is not aligned to rangeSize",
                });
            }
            if entries.is_empty() {
                continue;
            }
            let range = Range::from_persisted(&opts, range_start, entries)?;
            built.insert(range_start, range);
        }

        debug!(ranges = built.len(), "built extent cache from persisted inode state");
        *self.ranges.write() = built;
        Ok(())
    }

    /// Splits a write at `offset` of `len` bytes into segments already
    /// backed by a mapping (`allocated`) and segments that need a new
    /// allocation (`need_alloc`).  `data` must cover exactly
    /// `[offset, offset+len)`.
    pub fn divide_for_write<'a>(
        &self,
        offset: u64,
        len: u64,
        data: &'a [u8],
    ) -> (Vec<WritePart<'a>>, Vec<AllocPart<'a>>) {
        assert_eq!(data.len() as u64, len, "data must cover exactly [offset, offset+len)");

        let opts = options::get_option();
        let guard = self.ranges.write();

        let mut allocated = Vec::new();
        let mut need_alloc = Vec::new();

        for (range_start, slice_start, slice_end) in opts.split_by_range(offset, len) {
            let slice_data = &data[(slice_start - offset) as usize..(slice_end - offset) as usize];
            let empty = Range::new();
            let range = guard.get(&range_start).unwrap_or(&empty);
            let (mut a, mut n) =
                range.divide_for_write(&opts, range_start, slice_start, slice_end, slice_data);
            allocated.append(&mut a);
            need_alloc.append(&mut n);
        }

        trace!(
            offset,
            len,
            allocated = allocated.len(),
            need_alloc = need_alloc.len(),
            "divided write"
        );
        (allocated, need_alloc)
    }

    /// Splits a read at `offset` of `len` bytes into segments backed
    /// by a written extent (`reads`, for the caller to issue I/O
    /// against) and holes (for the caller to zero-fill).  `buf` must
    /// be valid for writes covering `[offset, offset+len)`.
    pub fn divide_for_read(
        &self,
        offset: u64,
        len: u64,
        buf: &mut [u8],
    ) -> (Vec<ReadPart>, Vec<ReadPart>) {
        assert_eq!(buf.len() as u64, len, "buf must cover exactly [offset, offset+len)");

        let opts = options::get_option();
        let guard = self.ranges.read();
        let base = buf.as_mut_ptr();

        let mut reads = Vec::new();
        let mut holes = Vec::new();

        for (range_start, slice_start, slice_end) in opts.split_by_range(offset, len) {
            let empty = Range::new();
            let range = guard.get(&range_start).unwrap_or(&empty);
            // SAFETY: each range's slices are disjoint sub-ranges of
            // `[offset, offset+len)`, and `buf` is valid for writes
            // across that whole interval per the caller contract
            // above; `reads`/`holes` tile it without overlap (the
            // per-range divide_for_read guarantee), so the pointers
            // handed back never alias each other.
            let (mut r, mut h) =
                unsafe { range.divide_for_read(slice_start, slice_end, base, offset) };
            reads.append(&mut r);
            holes.append(&mut h);
        }

        trace!(offset, len, reads = reads.len(), holes = holes.len(), "divided read");
        (reads, holes)
    }

    /// Integrates a newly-allocated extent returned by the allocator.
    /// Fails if the extent is misaligned, zero-length, crosses a
    /// range boundary, or overlaps an extent already in the cache.
    pub fn merge(&self, logical_offset: u64, mut extent: PExtent) -> Result<()> {
        let opts = options::get_option();
        extent.logical_offset = logical_offset;

        let range_start = opts.range_of(logical_offset);
        extent.validate(&opts, range_start)?;

        let mut guard = self.ranges.write();
        let freshly_created = !guard.contains_key(&range_start);
        let range = guard.entry(range_start).or_insert_with(Range::new);

        let result = range.merge(extent);
        if result.is_err() && freshly_created && range.is_empty() {
            guard.remove(&range_start);
        }
        if result.is_ok() {
            debug!(logical_offset, length = extent.length, unwritten = extent.unwritten, "merged extent");
        }
        result
    }

    /// Marks `[offset, offset+len)` as written.  Bytes with no
    /// mapping are silently ignored.  Idempotent.
    pub fn mark_written(&self, offset: u64, len: u64) {
        let opts = options::get_option();
        let mut guard = self.ranges.write();

        for (range_start, slice_start, slice_end) in opts.split_by_range(offset, len) {
            if let Some(range) = guard.get_mut(&range_start) {
                range.mark_written(slice_start, slice_end);
            }
        }

        debug!(offset, len, "marked written");
    }

    /// Serializes the cache to its persisted (inode) form.  A cache
    /// built from the result via [`ExtentCache::build`] is
    /// observationally indistinguishable from this one.
    pub fn to_inode(&self) -> PersistedMap {
        let guard = self.ranges.read();
        guard
            .iter()
            .filter(|(_, range)| !range.is_empty())
            .map(|(&range_start, range)| (range_start, range.to_inode_entries()))
            .collect()
    }

    #[cfg(test)]
    pub(crate) fn range_count_for_testing(&self) -> usize {
        self.ranges.read().len()
    }

    #[cfg(test)]
    pub(crate) fn extents_for_testing(&self, range_start: u64) -> Vec<PExtent> {
        self.ranges
            .read()
            .get(&range_start)
            .map(|r| r.extents_for_testing().values().cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ext(logical_offset: u64, length: u64, physical_offset: u64, unwritten: bool) -> PExtent {
        PExtent {
            logical_offset,
            length,
            physical_offset,
            unwritten,
        }
    }

    #[test]
    fn build_then_to_inode_round_trips() {
        let cache = ExtentCache::new();
        cache.merge(0, ext(0, 4096, 1 << 20, false)).unwrap();
        cache.merge(8192, ext(8192, 4096, 2 << 20, true)).unwrap();

        let persisted = cache.to_inode();
        let rebuilt = ExtentCache::new();
        rebuilt.build(&persisted).unwrap();

        assert_eq!(rebuilt.to_inode(), persisted);
    }

    #[test]
    fn merge_rejects_misaligned_extent_and_leaves_cache_unchanged() {
        let cache = ExtentCache::new();
        let err = cache.merge(0, ext(0, 100, 0, true)).unwrap_err();
        assert!(matches!(err, ExtentCacheError::Misaligned { .. }));
        assert_eq!(cache.range_count_for_testing(), 0);
    }

    #[test]
    fn merge_overlap_does_not_leave_a_dangling_empty_range() {
        let cache = ExtentCache::new();
        let opts = options::get_option();
        // An extent that crosses the range boundary is rejected before any
        // range is created.
        let err = cache
            .merge(opts.range_size - 4096, ext(opts.range_size - 4096, 8192, 0, true))
            .unwrap_err();
        assert!(matches!(err, ExtentCacheError::CrossesRangeBoundary { .. }));
        assert_eq!(cache.range_count_for_testing(), 0);
    }

    #[test]
    fn divide_for_write_across_two_ranges() {
        let opts = options::get_option();
        let cache = ExtentCache::new();
        let offset = opts.range_size - 4096;
        let data = vec![0u8; 8192];

        let (allocated, need_alloc) = cache.divide_for_write(offset, 8192, &data);
        assert!(allocated.is_empty());
        assert_eq!(need_alloc.len(), 2);
        assert_eq!(need_alloc[0].alloc_info.logical_offset, offset);
        assert_eq!(need_alloc[1].alloc_info.logical_offset, opts.range_size);
    }

    #[test]
    fn mark_written_ignores_unmapped_bytes() {
        let cache = ExtentCache::new();
        // No panic, no error: there is nothing mapped at all.
        cache.mark_written(0, 4096);
        assert_eq!(cache.range_count_for_testing(), 0);
    }
}
