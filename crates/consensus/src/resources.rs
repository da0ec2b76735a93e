//! External collaborators, referenced by interface only.
//!
//! The consensus core owns none of these: persistence, the transaction
//! pool, the network transport and the execution engine are provided at
//! construction as trait objects. All send paths on [`MsgService`] are
//! synchronous fire-and-forget hand-offs to a transport queue, so the
//! pacemaker may call them while holding the update mutex; the request
//! paths are genuine round trips and therefore async.

use std::sync::Arc;

use async_trait::async_trait;
use quill_crypto::{Hash, PublicKey, Signer};
use quill_types::{
    Batch, BatchVote, Block, BlockCommit, QuorumCert, Transaction, TxCommit, ValidatorStore, Vote,
};
use tokio::sync::mpsc;

use crate::Result;

/// Lifecycle of a transaction inside the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    /// Unknown to the pool.
    NotFound,
    /// Waiting in the queue for inclusion in a batch.
    Queued,
    /// Referenced by a proposed block, awaiting commit.
    Pending,
    /// Committed to storage.
    Committed,
}

/// Pool occupancy counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct TxPoolStatus {
    /// Transactions known to the pool.
    pub total: usize,
    /// Transactions referenced by proposed blocks.
    pub pending: usize,
    /// Transactions waiting for batch inclusion.
    pub queue: usize,
}

/// The transaction pool. Thread-safe; single operations are atomic.
#[async_trait]
pub trait TxPool: Send + Sync {
    /// Validate and admit a client transaction.
    async fn submit_tx(&self, tx: Transaction) -> Result<()>;

    /// Pop up to `max` transactions from the queue for a new batch.
    async fn pop_txs_from_queue(&self, max: usize) -> Vec<Transaction>;

    /// Mark transactions as referenced by a proposed block.
    async fn set_txs_pending(&self, hashes: &[Hash]);

    /// Resolve the transactions of a committing block.
    ///
    /// Returns the resolvable transactions plus the hashes that an
    /// earlier block already committed. A hash that is neither present
    /// nor committed is an error; the caller treats it as fatal.
    async fn get_txs_to_execute(&self, hashes: &[Hash])
        -> Result<(Vec<Transaction>, Vec<Hash>)>;

    /// Drop committed transactions from the pool.
    async fn remove_txs(&self, hashes: &[Hash]);

    /// Return transactions from an abandoned fork to the queue.
    async fn put_txs_to_queue(&self, hashes: &[Hash]);

    /// Fetch any of `hashes` this pool is missing from `peer`.
    async fn sync_txs(&self, peer: &PublicKey, hashes: &[Hash]) -> Result<()>;

    /// Store transactions received inside a batch. `pending` marks them
    /// as already referenced by a proposed block.
    async fn store_txs(&self, txs: &[Transaction], pending: bool) -> Result<()>;

    /// Look up a transaction by hash.
    async fn get_tx(&self, hash: &Hash) -> Option<Transaction>;

    /// Lifecycle status of one transaction.
    async fn get_tx_status(&self, hash: &Hash) -> TxStatus;

    /// Occupancy counters; lock-free, safe to poll.
    fn status(&self) -> TxPoolStatus;
}

/// The atomic unit persisted per committed block.
#[derive(Debug, Clone)]
pub struct CommitData {
    /// The committed block.
    pub block: Arc<Block>,
    /// The certificate that committed it, when locally known.
    pub quorum_cert: Option<QuorumCert>,
    /// The executed transactions.
    pub transactions: Vec<Transaction>,
    /// Per-block execution summary.
    pub block_commit: BlockCommit,
    /// Per-transaction commit records.
    pub tx_commits: Vec<TxCommit>,
}

/// Persistent storage of the committed prefix.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Current state-store merkle root.
    async fn merkle_root(&self) -> Hash;

    /// Persist a committed block with everything it entails.
    /// MUST be atomic across all keys written.
    async fn commit(&self, data: CommitData) -> Result<()>;

    /// Committed block by hash.
    async fn block(&self, hash: &Hash) -> Option<Block>;

    /// The highest committed block, if the chain has started.
    async fn last_block(&self) -> Option<Block>;

    /// The certificate for the highest committed block.
    async fn last_qc(&self) -> Option<QuorumCert>;

    /// Height of the committed prefix.
    async fn block_height(&self) -> u64;

    /// Whether a transaction is already committed.
    async fn has_tx(&self, hash: &Hash) -> bool;
}

/// The message transport.
///
/// Send paths enqueue and return; they never block on the network.
/// Subscriptions deliver decoded, per-subscriber buffered messages.
#[async_trait]
pub trait MsgService: Send + Sync {
    /// Broadcast a block proposal to all replicas.
    fn broadcast_proposal(&self, block: Arc<Block>) -> Result<()>;

    /// Broadcast a new batch to all replicas.
    fn broadcast_batch(&self, batch: Batch) -> Result<()>;

    /// Broadcast a new-view justification to all replicas.
    fn broadcast_new_view(&self, qc: QuorumCert) -> Result<()>;

    /// Send a certified batch to one replica.
    fn send_batch(&self, to: &PublicKey, batch: Batch) -> Result<()>;

    /// Send a block vote to its proposer.
    fn send_vote(&self, to: &PublicKey, vote: Vote) -> Result<()>;

    /// Send a batch vote to the batch's originating worker.
    fn send_batch_vote(&self, to: &PublicKey, vote: BatchVote) -> Result<()>;

    /// Send a new-view justification to the incoming leader.
    fn send_new_view(&self, to: &PublicKey, qc: QuorumCert) -> Result<()>;

    /// Fetch a block by hash from a peer.
    async fn request_block(&self, from: &PublicKey, hash: &Hash) -> Result<Block>;

    /// Fetch a block by height from a peer.
    async fn request_block_by_height(&self, from: &PublicKey, height: u64) -> Result<Block>;

    /// Subscribe to inbound proposals.
    fn subscribe_proposal(&self, buffer: usize) -> mpsc::Receiver<Block>;

    /// Subscribe to inbound batches (broadcast and certified unicast).
    fn subscribe_batch(&self, buffer: usize) -> mpsc::Receiver<Batch>;

    /// Subscribe to inbound block votes.
    fn subscribe_vote(&self, buffer: usize) -> mpsc::Receiver<Vote>;

    /// Subscribe to inbound batch votes.
    fn subscribe_batch_vote(&self, buffer: usize) -> mpsc::Receiver<BatchVote>;

    /// Subscribe to inbound new-view justifications.
    fn subscribe_new_view(&self, buffer: usize) -> mpsc::Receiver<QuorumCert>;
}

/// The smart-contract execution engine.
pub trait Execution: Send + Sync {
    /// Execute `txs` against the state snapshot `block` references.
    /// Pure over its inputs plus that snapshot.
    fn execute(&self, block: &Block, txs: &[Transaction]) -> (BlockCommit, Vec<TxCommit>);

    /// Produce commit bookkeeping without running transactions, for
    /// load tests that measure ordering alone.
    fn simulate(&self, block: &Block) -> (BlockCommit, Vec<TxCommit>);
}

/// Everything the consensus core borrows from the node.
#[derive(Clone)]
pub struct Resources {
    /// This replica's signing identity.
    pub signer: Arc<dyn Signer>,
    /// The fixed validator set.
    pub validators: Arc<dyn ValidatorStore>,
    /// Committed-prefix storage.
    pub storage: Arc<dyn Storage>,
    /// Message transport.
    pub msg_svc: Arc<dyn MsgService>,
    /// Transaction pool.
    pub tx_pool: Arc<dyn TxPool>,
    /// Execution engine.
    pub execution: Arc<dyn Execution>,
}
