//! Process-wide alignment parameters.
//!
//! `blocksize`, `preallocSize` and `rangeSize` are infrastructure
//! constants, not per-cache tunables: every [`crate::ExtentCache`] in
//! the process shares the same values.  They must be set once, before
//! any cache is built or mutated, and are treated as immutable
//! afterwards -- the same one-time-initialised-global shape the rest
//! of this codebase's lineage uses for its own process-wide mapper
//! configuration.
use once_cell::sync::OnceCell;

/// Alignment parameters shared by every `ExtentCache` in the process.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AlignmentOptions {
    /// Physical allocation granularity, in bytes.  Must be a power of
    /// two.
    pub blocksize: u32,
    /// Minimum allocation quantum used when computing allocation
    /// requests, in bytes.
    pub prealloc_size: u64,
    /// Width of each outer range partition, in bytes.  Must be a
    /// power-of-two multiple of `blocksize`.
    pub range_size: u64,
}

impl Default for AlignmentOptions {
    fn default() -> Self {
        AlignmentOptions {
            blocksize: 4096,
            prealloc_size: 64 * 1024,
            range_size: 1 << 30,
        }
    }
}

impl AlignmentOptions {
    /// Returns `Err` describing the first parameter that violates the
    /// crate's structural requirements.
    fn validate(&self) -> Result<(), &'static str> {
        if self.blocksize == 0 || !self.blocksize.is_power_of_two() {
            return Err("blocksize must be a nonzero power of two");
        }
        if self.prealloc_size == 0 {
            return Err("preallocSize must be nonzero");
        }
        if self.range_size == 0 || !self.range_size.is_power_of_two() {
            return Err("rangeSize must be a nonzero power of two");
        }
        if self.range_size % (self.blocksize as u64) != 0 {
            return Err("rangeSize must be a multiple of blocksize");
        }
        Ok(())
    }

    #[inline]
    pub const fn align_down(x: u64, a: u64) -> u64 {
        x - (x % a)
    }

    #[inline]
    pub const fn align_up(x: u64, a: u64) -> u64 {
        Self::align_down(x + a - 1, a)
    }

    #[inline]
    pub fn is_aligned(&self, x: u64) -> bool {
        x % (self.blocksize as u64) == 0
    }

    /// Start offset of the range containing `offset`.
    #[inline]
    pub fn range_of(&self, offset: u64) -> u64 {
        Self::align_down(offset, self.range_size)
    }

    /// Splits `[offset, offset+len)` at every range boundary it
    /// crosses, returning `(range_start, slice_start, slice_end)`
    /// triples in ascending order.
    pub fn split_by_range(&self, offset: u64, len: u64) -> Vec<(u64, u64, u64)> {
        let mut out = Vec::new();
        let end = offset + len;
        let mut cursor = offset;

        while cursor < end {
            let range_start = self.range_of(cursor);
            let range_end = range_start + self.range_size;
            let slice_end = end.min(range_end);
            out.push((range_start, cursor, slice_end));
            cursor = slice_end;
        }

        out
    }
}

static OPTIONS: OnceCell<AlignmentOptions> = OnceCell::new();

/// Sets the process-wide alignment parameters.  Must be called at
/// most once, before any `ExtentCache` is used.  Returns `Err` if the
/// options are structurally invalid, or if options have already been
/// set to a different value.
pub fn set_option(opts: AlignmentOptions) -> Result<(), &'static str> {
    opts.validate()?;

    match OPTIONS.set(opts) {
        Ok(()) => Ok(()),
        Err(previous) if previous == opts => Ok(()),
        Err(_) => Err("alignment options have already been set to a different value"),
    }
}

/// Returns the process-wide alignment parameters, initialising them
/// to [`AlignmentOptions::default`] on first use if `set_option` was
/// never called.
pub fn get_option() -> AlignmentOptions {
    *OPTIONS.get_or_init(AlignmentOptions::default)
}
