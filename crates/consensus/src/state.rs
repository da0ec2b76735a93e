//! In-memory consensus state: the block and QC pools, the leader
//! index, the committed-transaction counter, and the single update
//! mutex that serializes every state-machine transition.
//!
//! Mutations happen only while the update mutex is held; queries are
//! lock-free reads of atomic fields or short read-holds of the pool
//! locks.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use quill_crypto::{Hash, PublicKey};
use quill_types::{Block, QuorumCert, ValidatorStore};
use tokio::sync::Mutex;

/// Shared mutable state of one replica.
pub struct ChainState {
    validators: Arc<dyn ValidatorStore>,
    own_key: PublicKey,

    blocks: RwLock<HashMap<Hash, Arc<Block>>>,
    qcs: RwLock<HashMap<Hash, QuorumCert>>,
    committed: RwLock<HashMap<Hash, Arc<Block>>>,

    leader_index: AtomicUsize,
    committed_tx_count: AtomicUsize,

    /// Serializes all state-machine transitions. Held across the
    /// engine operations of `new_block`/`new_batch` and the inbound
    /// message handlers; every send done under it is a non-blocking
    /// hand-off.
    pub(crate) update_mutex: Mutex<()>,
}

impl ChainState {
    /// Create empty state for a replica identified by `own_key`.
    pub fn new(validators: Arc<dyn ValidatorStore>, own_key: PublicKey) -> Self {
        Self {
            validators,
            own_key,
            blocks: RwLock::new(HashMap::new()),
            qcs: RwLock::new(HashMap::new()),
            committed: RwLock::new(HashMap::new()),
            leader_index: AtomicUsize::new(0),
            committed_tx_count: AtomicUsize::new(0),
            update_mutex: Mutex::new(()),
        }
    }

    /// Insert a block into the pool.
    pub fn set_block(&self, block: Arc<Block>) {
        self.blocks.write().insert(*block.hash(), block);
    }

    /// Look up a block in the pool, falling back to the committed tail.
    pub fn block(&self, hash: &Hash) -> Option<Arc<Block>> {
        if let Some(block) = self.blocks.read().get(hash) {
            return Some(block.clone());
        }
        self.committed.read().get(hash).cloned()
    }

    /// Remove a block from the pool.
    pub fn delete_block(&self, hash: &Hash) {
        self.blocks.write().remove(hash);
    }

    /// Register the QC certifying `qc.block_hash()`.
    pub fn set_qc(&self, qc: QuorumCert) {
        self.qcs.write().insert(*qc.block_hash(), qc);
    }

    /// The QC certifying the block with `hash`, if known.
    pub fn qc(&self, hash: &Hash) -> Option<QuorumCert> {
        self.qcs.read().get(hash).cloned()
    }

    /// Drop the QC certifying the block with `hash`.
    pub fn delete_qc(&self, hash: &Hash) {
        self.qcs.write().remove(hash);
    }

    /// Move a block into the committed tail.
    pub fn set_committed_block(&self, block: Arc<Block>) {
        self.committed.write().insert(*block.hash(), block);
    }

    /// Drop a block from the committed tail.
    pub fn delete_committed(&self, hash: &Hash) {
        self.committed.write().remove(hash);
    }

    /// Pool entries at or below `block`'s height that are not ancestors
    /// of `block`; these are the orphaned forks once `block` commits.
    pub fn uncommitted_older_blocks(&self, block: &Arc<Block>) -> Vec<Arc<Block>> {
        let mut ancestors: HashSet<Hash> = HashSet::new();
        ancestors.insert(*block.hash());
        let mut cursor = *block.parent_hash();
        while let Some(parent) = self.block(&cursor) {
            ancestors.insert(*parent.hash());
            if parent.is_genesis() {
                break;
            }
            cursor = *parent.parent_hash();
        }

        self.blocks
            .read()
            .values()
            .filter(|b| b.height() <= block.height() && !ancestors.contains(b.hash()))
            .cloned()
            .collect()
    }

    /// Pool entries at or below `height`, committed ancestors included.
    pub fn older_blocks(&self, height: u64) -> Vec<Arc<Block>> {
        self.blocks
            .read()
            .values()
            .filter(|b| b.height() <= height)
            .cloned()
            .collect()
    }

    /// Entries in the block pool.
    pub fn block_pool_size(&self) -> usize {
        self.blocks.read().len()
    }

    /// Entries in the QC pool.
    pub fn qc_pool_size(&self) -> usize {
        self.qcs.read().len()
    }

    /// Current leader ordinal in the worker set.
    pub fn leader_index(&self) -> usize {
        self.leader_index.load(Ordering::Acquire)
    }

    /// Rotate or reset the leader ordinal.
    pub fn set_leader_index(&self, index: usize) {
        self.leader_index.store(index, Ordering::Release);
    }

    /// Committed transaction count since startup.
    pub fn committed_tx_count(&self) -> usize {
        self.committed_tx_count.load(Ordering::Acquire)
    }

    /// Add to the committed transaction count.
    pub fn add_committed_tx_count(&self, n: usize) {
        self.committed_tx_count.fetch_add(n, Ordering::AcqRel);
    }

    /// Whether `key` is the current block leader.
    pub fn is_leader(&self, key: &PublicKey) -> bool {
        self.validators.worker_index(key) == Some(self.leader_index())
    }

    /// Whether this replica is the current block leader.
    pub fn is_this_node_leader(&self) -> bool {
        self.is_leader(&self.own_key)
    }

    /// Whether this replica holds the worker role.
    pub fn is_this_node_worker(&self) -> bool {
        self.validators.is_worker(&self.own_key)
    }

    /// Whether this replica holds the voter role.
    pub fn is_this_node_voter(&self) -> bool {
        self.validators.is_voter(&self.own_key)
    }

    /// This replica's identity.
    pub fn own_key(&self) -> &PublicKey {
        &self.own_key
    }
}
