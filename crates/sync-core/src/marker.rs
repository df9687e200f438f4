//! Replication position markers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Replication position of one change, as mined from the source redo stream.
///
/// `global_scn` is monotonic across the whole source log stream and
/// `table_scn` is monotonic within one table. Markers order
/// lexicographically: global first, then table. Checkpoints only ever move
/// forward in this order.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ReplicationMarker {
    pub global_scn: u64,
    pub table_scn: u64,
}

impl ReplicationMarker {
    pub fn new(global_scn: u64, table_scn: u64) -> Self {
        Self {
            global_scn,
            table_scn,
        }
    }

    /// Returns true when `self` is strictly ahead of `other`.
    pub fn is_after(&self, other: &ReplicationMarker) -> bool {
        self > other
    }
}

impl fmt::Display for ReplicationMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.global_scn, self.table_scn)
    }
}
