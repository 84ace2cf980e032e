//! Client-side logical-to-physical extent cache for a single file in a
//! block-addressed volume.
//!
//! An [`ExtentCache`] tracks, per file, the mapping between logical
//! byte ranges and the physical extents that back them.  It mediates
//! between three collaborators: the block allocator (which hands back
//! newly-allocated [`PExtent`]s to [`ExtentCache::merge`]), the block
//! I/O engine (which issues the reads/writes that
//! [`ExtentCache::divide_for_read`]/[`ExtentCache::divide_for_write`]
//! describe), and the metadata service (which persists and restores
//! the cache's state as a [`PersistedMap`] via
//! [`ExtentCache::to_inode`]/[`ExtentCache::build`]).
mod cache;
mod error;
mod extent;
mod options;
mod persist;
mod range;

pub use cache::ExtentCache;
pub use error::{ExtentCacheError, Result};
pub use extent::{AllocInfo, AllocPart, PExtent, ReadPart, WritePart};
pub use options::{set_option, AlignmentOptions};
pub use persist::{PersistedExtent, PersistedMap};
