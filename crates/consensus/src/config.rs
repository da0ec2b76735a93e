//! Consensus configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Number of chained certificate phases required before a block commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phases {
    /// Two-chain commit rule: `b` commits once two consecutive QCs
    /// extend it by parent edges. Lower latency, larger vulnerability
    /// window to leader equivocation during view change.
    Two,
    /// Three-chain commit rule, the classic chained-HotStuff decision.
    #[default]
    Three,
}

/// Tunables for the consensus core.
///
/// The protocol flags (`phases`, `vote_batch`, `execute_txs`,
/// `preserve_txs`) are instance configuration, fixed at construction;
/// two replicas in one network must agree on `phases` and `chain_id`.
#[derive(Debug, Clone)]
pub struct Config {
    /// Genesis seed; distinguishes chains sharing a validator set.
    pub chain_id: i64,

    /// Maximum transaction count in a batch.
    pub batch_tx_limit: usize,

    /// Maximum batch count in a block; -1 adapts to the worker count.
    pub block_batch_limit: i64,

    /// Batch count in a batch vote; -1 adapts to the worker count.
    pub vote_batch_limit: i64,

    /// Delay before voting a block when the transaction pool is empty.
    pub tx_wait_time: Duration,

    /// Maximum delay a worker waits for voting on a batch before the
    /// batch is dropped.
    pub batch_wait_time: Duration,

    /// Wait before proposing the next block when no QC can be created.
    pub propose_timeout: Duration,

    /// Wait before creating the next batch when no QC can be created.
    pub batch_timeout: Duration,

    /// Minimum delay between blocks; bounds the block rate.
    pub block_delay: Duration,

    /// View duration for a leader under normal progress.
    pub view_width: Duration,

    /// The leader must create the next QC within this duration.
    pub leader_timeout: Duration,

    /// Path for per-commit latency records; disabled when `None`.
    pub benchmark_path: Option<PathBuf>,

    /// Commit rule selection.
    pub phases: Phases,

    /// Whether voters sign observed batches. Disabled only for
    /// dissemination experiments.
    pub vote_batch: bool,

    /// Whether committed transactions run through the execution engine.
    /// Disabled for load tests that measure ordering alone.
    pub execute_txs: bool,

    /// Whether committed transactions stay in the pool for replay
    /// during load tests.
    pub preserve_txs: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chain_id: 0,
            batch_tx_limit: 5000,
            block_batch_limit: -1,
            vote_batch_limit: -1,
            tx_wait_time: Duration::from_secs(1),
            batch_wait_time: Duration::from_secs(3),
            propose_timeout: Duration::from_millis(1500),
            batch_timeout: Duration::from_millis(1500),
            block_delay: Duration::from_millis(500),
            view_width: Duration::from_secs(60),
            leader_timeout: Duration::from_secs(20),
            benchmark_path: None,
            phases: Phases::Three,
            vote_batch: true,
            execute_txs: true,
            preserve_txs: false,
        }
    }
}

impl Config {
    /// Resolve `block_batch_limit` against the worker count.
    pub fn resolved_block_batch_limit(&self, worker_count: usize) -> usize {
        if self.block_batch_limit < 0 {
            worker_count
        } else {
            self.block_batch_limit as usize
        }
    }

    /// Resolve `vote_batch_limit` against the worker count.
    pub fn resolved_vote_batch_limit(&self, worker_count: usize) -> usize {
        if self.vote_batch_limit < 0 {
            worker_count
        } else {
            self.vote_batch_limit as usize
        }
    }
}
