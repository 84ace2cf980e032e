//! The wire/on-disk shape of the cache: a mapping keyed by range
//! start, each value a list of persisted extents.  This is what
//! `Build` consumes and `ToInode` produces; the metadata service
//! frames it onto whatever transport it uses (this crate only needs
//! `Serialize`/`Deserialize`, not a particular RPC stack).
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// One persisted extent entry, as stored in inode state.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct PersistedExtent {
    /// Logical offset in the file.
    pub fs_offset: u64,
    /// Extent length, in bytes.
    pub length: u64,
    /// Physical offset in the backing volume.
    pub volume_offset: u64,
    /// Reserved; ignored by the cache on read.
    #[serde(default = "default_true")]
    pub isused: bool,
    /// Inverse of `PExtent::unwritten`.
    pub is_written: bool,
}

fn default_true() -> bool {
    true
}

/// The full persisted form of one inode's extent mapping: range start
/// offset -> that range's extents, in no particular map order (the
/// cache re-sorts within each range when it builds, and emits ranges
/// in ascending order when it serializes).
pub type PersistedMap = HashMap<u64, Vec<PersistedExtent>>;
