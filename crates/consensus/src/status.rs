//! Runtime status snapshot, served to the administration surface.

use serde::Serialize;

/// A point-in-time view of the consensus core, assembled from lock-free
/// counters and short read-holds only.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Status {
    /// Unix nanoseconds when this node started consensus.
    pub start_time: i64,

    /// Committed transaction count since the node came up.
    pub committed_tx_count: usize,
    /// Entries in the in-memory block pool.
    pub block_pool_size: usize,
    /// Entries in the in-memory QC pool.
    pub qc_pool_size: usize,

    /// Start timestamp of the current view, Unix nanoseconds.
    pub view_start: i64,
    /// True from view timeout until the new leader creates its first QC.
    pub pending_view_change: bool,
    /// Current leader ordinal in the worker set.
    pub leader_index: usize,

    /// Height of the highest block this replica voted for.
    pub b_vote: u64,
    /// Height of the locked block.
    pub b_lock: u64,
    /// Height of the highest executed block.
    pub b_exec: u64,
    /// Height of the current leaf.
    pub b_leaf: u64,
    /// Height certified by the highest known QC.
    pub qc_high: u64,
}
