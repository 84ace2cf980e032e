//! A single 1-GiB (by default) partition of a file's logical address
//! space, and the algorithms that divide reads/writes against it,
//! merge newly-allocated extents into it, and flip pre-allocated
//! space to written.
//!
//! The inner map is a `BTreeMap<u64, PExtent>` keyed by logical
//! offset, the same predecessor/successor-lookup shape this
//! codebase's lineage uses to track non-overlapping address ranges
//! (see the overlap checks a debug address-range tracker would run
//! before registering a new mapping).
#[cfg(any(all(test, feature = "check_contracts_in_tests"), feature = "check_contracts"))]
use contracts::*;
#[cfg(not(any(all(test, feature = "check_contracts_in_tests"), feature = "check_contracts")))]
use disabled_contracts::*;

use std::collections::BTreeMap;

use crate::error::{ExtentCacheError, Result};
use crate::extent::{AllocInfo, AllocPart, PExtent, ReadPart, WritePart};
use crate::options::AlignmentOptions;
use crate::persist::PersistedExtent;

#[derive(Clone, Debug, Default)]
pub(crate) struct Range {
    extents: BTreeMap<u64, PExtent>,
}

impl Range {
    pub(crate) fn new() -> Self {
        Range {
            extents: BTreeMap::new(),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.extents.is_empty()
    }

    #[cfg(any(test, feature = "check_contracts_in_tests", feature = "check_contracts"))]
    pub(crate) fn extents_for_testing(&self) -> &BTreeMap<u64, PExtent> {
        &self.extents
    }

    /// Validates invariants 1-3 of the data model: no overlap,
    /// alignment, and containment within `[range_start,
    /// range_start+range_size)`.
    pub(crate) fn check_rep(&self, opts: &AlignmentOptions, range_start: u64) -> Result<()> {
        let mut prev_end: Option<u64> = None;
        for (&key, ext) in self.extents.iter() {
            if key != ext.logical_offset {
                return Err(ExtentCacheError::InvalidPersistedInput {
                    range_start,
                    reason: "extent stored under a key that does not match its logical_offset",
                });
            }
            ext.validate(opts, range_start)?;
            if let Some(prev_end) = prev_end {
                if ext.logical_offset < prev_end {
                    return Err(ExtentCacheError::Overlap {
                        new_start: ext.logical_offset,
                        new_end: ext.logical_end(),
                        existing_start: 0,
                        existing_end: prev_end,
                    });
                }
            }
            prev_end = Some(ext.logical_end());
        }
        Ok(())
    }

    /// Loads a range from its persisted form.  Trusted to already be
    /// canonical (no re-merging is performed), but invariants 1-3 are
    /// validated and any violation is refused.
    pub(crate) fn from_persisted(
        opts: &AlignmentOptions,
        range_start: u64,
        entries: &[PersistedExtent],
    ) -> Result<Self> {
        let mut extents = BTreeMap::new();
        for e in entries {
            let ext = PExtent {
                logical_offset: e.fs_offset,
                length: e.length,
                physical_offset: e.volume_offset,
                unwritten: !e.is_written,
            };
            if extents.insert(ext.logical_offset, ext).is_some() {
                return Err(ExtentCacheError::InvalidPersistedInput {
                    range_start,
                    reason: "duplicate logical offset in persisted entries",
                });
            }
        }
        let range = Range { extents };
        range.check_rep(opts, range_start)?;
        Ok(range)
    }

    pub(crate) fn to_inode_entries(&self) -> Vec<PersistedExtent> {
        self.extents
            .values()
            .map(|e| PersistedExtent {
                fs_offset: e.logical_offset,
                length: e.length,
                volume_offset: e.physical_offset,
                isused: true,
                is_written: !e.unwritten,
            })
            .collect()
    }

    /// The immediate predecessor and successor of `offset`: the
    /// highest-keyed entry strictly below `offset`, and the
    /// lowest-keyed entry at or above `offset`.
    fn neighbors(&self, offset: u64) -> (Option<PExtent>, Option<PExtent>) {
        let pred = self.extents.range(..offset).next_back().map(|(_, v)| *v);
        let succ = self.extents.range(offset..).next().map(|(_, v)| *v);
        (pred, succ)
    }

    /// `true` iff the stored extents are ordered, pairwise disjoint,
    /// and no two adjacent ones satisfy the coalescing predicate of
    /// invariant 4 -- i.e. the range is in canonical form.
    fn is_canonical(&self) -> bool {
        let mut prev: Option<PExtent> = None;
        for (&key, ext) in self.extents.iter() {
            if key != ext.logical_offset {
                return false;
            }
            if let Some(p) = prev {
                if p.logical_end() > ext.logical_offset || p.coalescable_with(ext) {
                    return false;
                }
            }
            prev = Some(*ext);
        }
        true
    }

    /// Integrates a newly-allocated, block-aligned extent that the
    /// caller has already confirmed lies within this single range.
    #[invariant(self.is_canonical(), "extents stay ordered, disjoint and maximally coalesced")]
    #[ensures(ret.is_ok() -> self.is_canonical(), "a successful merge leaves the range canonical")]
    pub(crate) fn merge(&mut self, mut extent: PExtent) -> Result<()> {
        let (pred, succ) = self.neighbors(extent.logical_offset);

        if let Some(p) = pred {
            if p.logical_end() > extent.logical_offset {
                return Err(ExtentCacheError::Overlap {
                    new_start: extent.logical_offset,
                    new_end: extent.logical_end(),
                    existing_start: p.logical_offset,
                    existing_end: p.logical_end(),
                });
            }
        }
        if let Some(s) = succ {
            if extent.logical_end() > s.logical_offset {
                return Err(ExtentCacheError::Overlap {
                    new_start: extent.logical_offset,
                    new_end: extent.logical_end(),
                    existing_start: s.logical_offset,
                    existing_end: s.logical_end(),
                });
            }
        }

        if let Some(p) = pred {
            if p.coalescable_with(&extent) {
                self.extents.remove(&p.logical_offset);
                extent = PExtent {
                    logical_offset: p.logical_offset,
                    length: p.length + extent.length,
                    physical_offset: p.physical_offset,
                    unwritten: p.unwritten,
                };
            }
        }
        if let Some(s) = succ {
            if extent.coalescable_with(&s) {
                self.extents.remove(&s.logical_offset);
                extent.length += s.length;
            }
        }

        self.extents.insert(extent.logical_offset, extent);
        Ok(())
    }

    /// Divides `[slice_start, slice_end)` -- a sub-range of a larger
    /// write already clipped to this range -- into `WritePart`s over
    /// already-mapped space and `AllocPart`s describing the gaps.
    ///
    /// `data` is the slice of the caller's write buffer covering
    /// exactly `[slice_start, slice_end)`.
    pub(crate) fn divide_for_write<'a>(
        &self,
        opts: &AlignmentOptions,
        range_start: u64,
        slice_start: u64,
        slice_end: u64,
        data: &'a [u8],
    ) -> (Vec<WritePart<'a>>, Vec<AllocPart<'a>>) {
        let sub = |lo: u64, hi: u64| -> &'a [u8] {
            &data[(lo - slice_start) as usize..(hi - slice_start) as usize]
        };

        let mut allocated = Vec::new();
        let mut need_alloc = Vec::new();

        if self.extents.is_empty() {
            let range_end = range_start + opts.range_size;
            let (aligned_start, aligned_end) =
                expand_alloc_request(opts, range_start, range_end, slice_start, slice_end);
            need_alloc.push(AllocPart {
                alloc_info: AllocInfo {
                    logical_offset: aligned_start,
                    length: aligned_end - aligned_start,
                },
                padding: slice_start - aligned_start,
                write_length: slice_end - slice_start,
                data: sub(slice_start, slice_end),
            });
            return (allocated, need_alloc);
        }

        let window_start = self
            .extents
            .range(..slice_start)
            .next_back()
            .map(|(k, _)| *k)
            .unwrap_or(slice_start);

        let mut cursor = slice_start;
        // `floor` is the block-aligned lower bound `expand_alloc_request`
        // may expand a gap down to: the end of the nearest extent at or
        // before the cursor, or `range_start` if none exists yet.  Unlike
        // `cursor`, which tracks the caller's (possibly unaligned) write
        // position, `floor` only ever advances to an extent's (aligned)
        // `logical_end`, so it is always safe to hand to
        // `expand_alloc_request`.
        let mut floor = range_start;
        for (&key, ext) in self.extents.range(window_start..slice_end) {
            let ext_end = ext.logical_end();
            if ext_end <= slice_start {
                floor = ext_end;
                continue;
            }
            let ext_start_clamped = key.max(slice_start);
            if ext_start_clamped > cursor {
                // gap before this extent
                let ceiling = key;
                let (aligned_start, aligned_end) =
                    expand_alloc_request(opts, floor, ceiling, cursor, ext_start_clamped);
                need_alloc.push(AllocPart {
                    alloc_info: AllocInfo {
                        logical_offset: aligned_start,
                        length: aligned_end - aligned_start,
                    },
                    padding: cursor - aligned_start,
                    write_length: ext_start_clamped - cursor,
                    data: sub(cursor, ext_start_clamped),
                });
                cursor = ext_start_clamped;
            }
            let seg_end = ext_end.min(slice_end);
            if seg_end > cursor {
                allocated.push(WritePart {
                    logical_offset: cursor,
                    length: seg_end - cursor,
                    data: sub(cursor, seg_end),
                });
                cursor = seg_end;
            }
            floor = ext_end;
        }

        if cursor < slice_end {
            let succ_start = self
                .extents
                .range(slice_end..)
                .next()
                .map(|(k, _)| *k)
                .unwrap_or(range_start + opts.range_size);
            let (aligned_start, aligned_end) =
                expand_alloc_request(opts, floor, succ_start, cursor, slice_end);
            need_alloc.push(AllocPart {
                alloc_info: AllocInfo {
                    logical_offset: aligned_start,
                    length: aligned_end - aligned_start,
                },
                padding: cursor - aligned_start,
                write_length: slice_end - cursor,
                data: sub(cursor, slice_end),
            });
        }

        (allocated, need_alloc)
    }

    /// Divides `[slice_start, slice_end)` into `reads` (backed by a
    /// written extent) and `holes` (unmapped, or mapped but
    /// unwritten).  `buf` must point at the first byte of the
    /// caller's output buffer for the *entire* read, and `read_offset`
    /// is that read's starting logical offset, so that a segment
    /// starting at `pos` is written at `buf + (pos - read_offset)`.
    ///
    /// # Safety
    /// The caller must ensure `buf` is valid for writes covering
    /// `[read_offset, read_offset + len)` for the whole read this
    /// slice belongs to, and that no other live reference aliases
    /// that range while the returned parts are in use.
    pub(crate) unsafe fn divide_for_read(
        &self,
        slice_start: u64,
        slice_end: u64,
        buf: *mut u8,
        read_offset: u64,
    ) -> (Vec<ReadPart>, Vec<ReadPart>) {
        let part = |lo: u64, hi: u64, physical_offset: Option<u64>| -> ReadPart {
            ReadPart {
                logical_offset: lo,
                length: hi - lo,
                physical_offset,
                buf: buf.add((lo - read_offset) as usize),
            }
        };

        let mut reads = Vec::new();
        let mut holes = Vec::new();

        let window_start = self
            .extents
            .range(..slice_start)
            .next_back()
            .map(|(k, _)| *k)
            .unwrap_or(slice_start);

        let mut cursor = slice_start;
        for (&key, ext) in self.extents.range(window_start..slice_end) {
            let ext_end = ext.logical_end();
            if ext_end <= slice_start {
                continue;
            }
            let ext_start_clamped = key.max(slice_start);
            if ext_start_clamped > cursor {
                holes.push(part(cursor, ext_start_clamped, None));
                cursor = ext_start_clamped;
            }
            let seg_end = ext_end.min(slice_end);
            if seg_end > cursor {
                if ext.unwritten {
                    holes.push(part(cursor, seg_end, None));
                } else {
                    let physical_offset = ext.physical_offset + (cursor - ext.logical_offset);
                    reads.push(part(cursor, seg_end, Some(physical_offset)));
                }
                cursor = seg_end;
            }
        }

        if cursor < slice_end {
            holes.push(part(cursor, slice_end, None));
        }

        (reads, holes)
    }

    /// Flips the `unwritten` flag to `false` for every mapped byte in
    /// `[slice_start, slice_end)`.  Bytes with no mapping are silently
    /// ignored.  Idempotent: calling this twice in a row with the
    /// same arguments leaves the range unchanged on the second call.
    #[invariant(self.is_canonical(), "extents stay ordered, disjoint and maximally coalesced")]
    pub(crate) fn mark_written(&mut self, slice_start: u64, slice_end: u64) {
        let to_process: Vec<(u64, PExtent)> = self
            .extents
            .range(..slice_end)
            .filter(|(_, e)| e.logical_end() > slice_start && e.unwritten)
            .map(|(k, e)| (*k, *e))
            .collect();

        for (key, ext) in to_process {
            self.extents.remove(&key);

            if ext.logical_offset < slice_start {
                let head = PExtent {
                    logical_offset: ext.logical_offset,
                    length: slice_start - ext.logical_offset,
                    physical_offset: ext.physical_offset,
                    unwritten: true,
                };
                self.extents.insert(head.logical_offset, head);
            }

            let mid_start = ext.logical_offset.max(slice_start);
            let mid_end = ext.logical_end().min(slice_end);
            let mid = PExtent {
                logical_offset: mid_start,
                length: mid_end - mid_start,
                physical_offset: ext.physical_offset + (mid_start - ext.logical_offset),
                unwritten: false,
            };
            self.extents.insert(mid.logical_offset, mid);

            if ext.logical_end() > slice_end {
                let tail = PExtent {
                    logical_offset: slice_end,
                    length: ext.logical_end() - slice_end,
                    physical_offset: ext.physical_offset + (slice_end - ext.logical_offset),
                    unwritten: true,
                };
                self.extents.insert(tail.logical_offset, tail);
            }
        }

        self.coalesce_touching(slice_start, slice_end);
    }

    /// Re-checks adjacency across the region touched by a
    /// `mark_written` call (plus its immediate neighbors) and
    /// coalesces any pair that now satisfies invariant 4.
    fn coalesce_touching(&mut self, from: u64, to: u64) {
        let window_start = self
            .extents
            .range(..=from)
            .next_back()
            .map(|(k, _)| *k)
            .unwrap_or(from);

        let mut keys: Vec<u64> = self
            .extents
            .range(window_start..)
            .map(|(k, _)| *k)
            .take_while(|k| *k <= to)
            .collect();
        if let Some((k, _)) = self.extents.range(to..).next() {
            keys.push(*k);
        }
        keys.dedup();

        let mut iter = keys.into_iter();
        let mut current_key = match iter.next() {
            Some(k) => k,
            None => return,
        };
        let mut current = match self.extents.get(&current_key) {
            Some(e) => *e,
            None => return,
        };

        for next_key in iter {
            let next = match self.extents.get(&next_key) {
                Some(e) => *e,
                None => continue,
            };
            if current.coalescable_with(&next) {
                self.extents.remove(&current_key);
                self.extents.remove(&next_key);
                current = PExtent {
                    logical_offset: current.logical_offset,
                    length: current.length + next.length,
                    physical_offset: current.physical_offset,
                    unwritten: current.unwritten,
                };
                self.extents.insert(current.logical_offset, current);
                current_key = current.logical_offset;
            } else {
                current_key = next_key;
                current = next;
            }
        }
    }
}

/// Expands `[user_start, user_end)` to block alignment and then
/// towards `preallocSize`, clipped so the result never goes below
/// `floor` or above `ceiling`.  `floor` and `ceiling` are always
/// block-aligned (range boundaries, or neighboring extents' already-
/// aligned edges), so the result stays aligned too.
fn expand_alloc_request(
    opts: &AlignmentOptions,
    floor: u64,
    ceiling: u64,
    user_start: u64,
    user_end: u64,
) -> (u64, u64) {
    let b = opts.blocksize as u64;
    let p = opts.prealloc_size;

    let mut start = AlignmentOptions::align_down(user_start, b).max(floor);
    let mut end = AlignmentOptions::align_up(user_end, b).min(ceiling);

    if end - start < p {
        end = (start + p).min(ceiling);
    }
    if end - start < p {
        let wanted_start = end.saturating_sub(p);
        start = AlignmentOptions::align_down(wanted_start, b).max(floor);
    }

    (start, end)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> AlignmentOptions {
        AlignmentOptions::default()
    }

    fn ext(logical_offset: u64, length: u64, physical_offset: u64, unwritten: bool) -> PExtent {
        PExtent {
            logical_offset,
            length,
            physical_offset,
            unwritten,
        }
    }

    #[test]
    fn divide_for_write_empty_range() {
        let range = Range::new();
        let data = vec![0u8; 1000];
        let (allocated, need_alloc) = range.divide_for_write(&opts(), 0, 0, 1000, &data);
        assert!(allocated.is_empty());
        assert_eq!(need_alloc.len(), 1);
        assert_eq!(need_alloc[0].alloc_info.logical_offset, 0);
        assert_eq!(need_alloc[0].alloc_info.length, 65536);
        assert_eq!(need_alloc[0].padding, 0);
        assert_eq!(need_alloc[0].write_length, 1000);
    }

    #[test]
    fn divide_for_write_unaligned_into_empty() {
        let range = Range::new();
        let data = vec![0u8; 200];
        let (allocated, need_alloc) = range.divide_for_write(&opts(), 0, 100, 300, &data);
        assert!(allocated.is_empty());
        assert_eq!(need_alloc.len(), 1);
        assert_eq!(need_alloc[0].alloc_info.logical_offset, 0);
        assert_eq!(need_alloc[0].alloc_info.length, 65536);
        assert_eq!(need_alloc[0].padding, 100);
        assert_eq!(need_alloc[0].write_length, 200);
    }

    #[test]
    fn divide_for_write_across_allocated_and_hole() {
        let mut range = Range::new();
        range.merge(ext(0, 4096, 1 << 20, false)).unwrap();

        let data = vec![0u8; 8192];
        let (allocated, need_alloc) = range.divide_for_write(&opts(), 0, 2048, 10240, &data);

        assert_eq!(allocated.len(), 1);
        assert_eq!(allocated[0].logical_offset, 2048);
        assert_eq!(allocated[0].length, 2048);

        assert_eq!(need_alloc.len(), 1);
        assert_eq!(need_alloc[0].alloc_info.logical_offset, 4096);
        assert_eq!(need_alloc[0].alloc_info.length, 65536);
        assert_eq!(need_alloc[0].padding, 0);
        assert_eq!(need_alloc[0].write_length, 6144);
    }

    #[test]
    fn divide_for_write_gap_before_first_extent_is_block_aligned() {
        // Regression test: a gap whose caller-supplied start has not been
        // preceded by any WritePart/AllocPart in this call (no extent
        // overlaps slice_start) must still expand to a block-aligned
        // `alloc_info`, not the raw unaligned `slice_start`.
        let mut range = Range::new();
        range.merge(ext(8192, 4096, 1 << 20, false)).unwrap();

        let data = vec![0u8; 3000];
        let (allocated, need_alloc) = range.divide_for_write(&opts(), 0, 2000, 5000, &data);

        assert!(allocated.is_empty());
        assert_eq!(need_alloc.len(), 1);
        assert_eq!(need_alloc[0].alloc_info.logical_offset % 4096, 0);
        assert_eq!(need_alloc[0].alloc_info.length % 4096, 0);
        assert_eq!(need_alloc[0].alloc_info.logical_offset, 0);
        assert_eq!(need_alloc[0].alloc_info.length, 8192);
        assert_eq!(need_alloc[0].padding, 2000);
        assert_eq!(need_alloc[0].write_length, 3000);
    }

    #[test]
    fn divide_for_read_hole_written_unwritten() {
        let mut range = Range::new();
        range.merge(ext(0, 4096, 1 << 20, false)).unwrap();
        range.merge(ext(8192, 4096, 2 << 20, true)).unwrap();

        let mut buf = vec![0u8; 16384];
        let (reads, holes) =
            unsafe { range.divide_for_read(0, 16384, buf.as_mut_ptr(), 0) };

        assert_eq!(reads.len(), 1);
        assert_eq!(reads[0].logical_offset, 0);
        assert_eq!(reads[0].length, 4096);
        assert_eq!(reads[0].physical_offset, Some(1 << 20));

        assert_eq!(holes.len(), 2);
        assert_eq!(holes[0].logical_offset, 4096);
        assert_eq!(holes[0].length, 4096);
        assert_eq!(holes[1].logical_offset, 8192);
        assert_eq!(holes[1].length, 4096);
    }

    #[test]
    fn merge_coalesces_adjacent_matching_extents() {
        let mut range = Range::new();
        range.merge(ext(0, 4096, 1000, true)).unwrap();
        range.merge(ext(4096, 4096, 1000 + 4096, true)).unwrap();

        let entries: Vec<_> = range.extents.values().collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].logical_offset, 0);
        assert_eq!(entries[0].length, 8192);
    }

    #[test]
    fn merge_rejects_overlap() {
        let mut range = Range::new();
        range.merge(ext(0, 4096, 1000, true)).unwrap();
        let err = range.merge(ext(2048, 4096, 2000, true)).unwrap_err();
        assert!(matches!(err, ExtentCacheError::Overlap { .. }));
    }

    #[test]
    fn mark_written_splits_then_coalesces() {
        let mut range = Range::new();
        range.merge(ext(0, 12288, 5000, true)).unwrap();

        range.mark_written(4096, 8192);
        let entries: Vec<_> = range.extents.values().cloned().collect();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0], ext(0, 4096, 5000, true));
        assert_eq!(entries[1], ext(4096, 4096, 5000 + 4096, false));
        assert_eq!(entries[2], ext(8192, 4096, 5000 + 8192, true));

        range.mark_written(0, 12288);
        let entries: Vec<_> = range.extents.values().cloned().collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0], ext(0, 12288, 5000, false));
    }

    #[test]
    fn mark_written_is_idempotent() {
        let mut range = Range::new();
        range.merge(ext(0, 12288, 5000, true)).unwrap();
        range.mark_written(4096, 8192);
        let once: Vec<_> = range.extents.values().cloned().collect();
        range.mark_written(4096, 8192);
        let twice: Vec<_> = range.extents.values().cloned().collect();
        assert_eq!(once, twice);
    }

    use proptest::collection::vec as pvec;
    use proptest::prelude::*;

    const BLOCK: u64 = 4096;

    fn aligned_block(max_blocks: u64) -> impl Strategy<Value = u64> {
        (0..max_blocks).prop_map(move |b| b * BLOCK)
    }

    proptest! {
        // A freshly-merged, non-overlapping run of extents should
        // leave the range canonical no matter the insertion order,
        // and `mark_written` run twice over the same span should
        // never change a third observation of the state.
        #[test]
        fn merge_then_mark_written_stays_canonical(
            starts in pvec(aligned_block(64), 1..12),
            mark_from_block in 0..64u64,
            mark_len_blocks in 1..8u64,
        ) {
            let mut range = Range::new();
            let mut sorted_starts = starts;
            sorted_starts.sort_unstable();
            sorted_starts.dedup();

            let mut physical = 1u64 << 24;
            for (i, &start) in sorted_starts.iter().enumerate() {
                // Leave at least one block of slack so consecutive
                // extents never accidentally overlap.
                let next = sorted_starts.get(i + 1).copied().unwrap_or(u64::MAX);
                if start + BLOCK > next {
                    continue;
                }
                let _ = range.merge(ext(start, BLOCK, physical, i % 2 == 0));
                physical += BLOCK;
            }
            prop_assert!(range.is_canonical());

            let mark_from = mark_from_block * BLOCK;
            let mark_len = mark_len_blocks * BLOCK;
            range.mark_written(mark_from, mark_from + mark_len);
            prop_assert!(range.is_canonical());

            let once: Vec<_> = range.extents.values().cloned().collect();
            range.mark_written(mark_from, mark_from + mark_len);
            let twice: Vec<_> = range.extents.values().cloned().collect();
            prop_assert_eq!(once, twice);
        }

        // divide_for_write must always account for every byte of the
        // requested span exactly once, whether the byte lands in an
        // already-mapped WritePart or a to-be-allocated AllocPart.
        #[test]
        fn divide_for_write_covers_every_byte_once(
            gap_start_block in 0..200_000u64,
            write_len_blocks in 1..16u64,
        ) {
            let range = Range::new();
            let o = opts();
            let write_start = gap_start_block * BLOCK;
            let write_len = write_len_blocks * BLOCK;
            let data = vec![0u8; write_len as usize];

            let (allocated, need_alloc) =
                range.divide_for_write(&o, 0, write_start, write_start + write_len, &data);

            let mut covered: u64 = allocated.iter().map(|w| w.length).sum();
            covered += need_alloc.iter().map(|a| a.write_length).sum::<u64>();
            prop_assert_eq!(covered, write_len);
        }

        // Every AllocPart.alloc_info handed back by divide_for_write must
        // be block-aligned (§8 testable property 3), including the gap
        // that sits between an unaligned caller offset and a pre-existing
        // extent elsewhere in the range -- the case the byte-conservation
        // property above does not exercise, since it only ever runs
        // against an empty range.
        #[test]
        fn divide_for_write_alloc_info_is_block_aligned(
            extent_start_block in 0..200_000u64,
            extent_len_blocks in 1..16u64,
            write_start_block in 0..200_000u64,
            write_len_blocks in 1..16u64,
        ) {
            let mut range = Range::new();
            let extent_start = extent_start_block * BLOCK;
            let extent_len = extent_len_blocks * BLOCK;
            let _ = range.merge(ext(extent_start, extent_len, 1 << 24, false));

            let o = opts();
            let write_start = write_start_block * BLOCK;
            let write_len = write_len_blocks * BLOCK;
            let data = vec![0u8; write_len as usize];

            let (_, need_alloc) =
                range.divide_for_write(&o, 0, write_start, write_start + write_len, &data);

            for part in &need_alloc {
                prop_assert_eq!(part.alloc_info.logical_offset % BLOCK, 0);
                prop_assert_eq!(part.alloc_info.length % BLOCK, 0);
            }
        }
    }
}
