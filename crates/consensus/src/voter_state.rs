//! Voter-side batch bookkeeping.
//!
//! Every voter caches the batches it has observed and queues their
//! hashes per originating worker until they are signed into a batch
//! vote. The cache doubles as the duplicate filter: a batch is voted at
//! most once.

use std::collections::{HashMap, HashSet, VecDeque};

use parking_lot::{Mutex, RwLock};
use quill_crypto::Hash;
use quill_types::Batch;

/// Per-voter batch cache and outstanding-vote queues.
pub struct VoterState {
    batches: RwLock<HashMap<Hash, Batch>>,
    pending: Mutex<HashMap<usize, VecDeque<Hash>>>,
    vote_batch_limit: usize,
}

impl VoterState {
    /// Create voter state signing up to `vote_batch_limit` batches per
    /// batch vote.
    pub fn new(vote_batch_limit: usize) -> Self {
        Self {
            batches: RwLock::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
            vote_batch_limit: vote_batch_limit.max(1),
        }
    }

    /// Cache an observed batch and queue it for voting.
    ///
    /// Returns false when the batch was already observed; duplicates
    /// are never queued twice.
    pub fn add_batch(&self, batch: Batch, worker_index: usize) -> bool {
        let hash = *batch.hash();
        {
            let mut batches = self.batches.write();
            if batches.contains_key(&hash) {
                return false;
            }
            batches.insert(hash, batch);
        }
        self.pending
            .lock()
            .entry(worker_index)
            .or_default()
            .push_back(hash);
        true
    }

    /// A cached batch by hash.
    pub fn batch(&self, hash: &Hash) -> Option<Batch> {
        self.batches.read().get(hash).cloned()
    }

    /// Drain up to the vote-batch limit of outstanding hashes for one
    /// worker, in observation order.
    pub fn pop_votes(&self, worker_index: usize) -> Vec<Hash> {
        let mut pending = self.pending.lock();
        let Some(queue) = pending.get_mut(&worker_index) else {
            return Vec::new();
        };
        let n = queue.len().min(self.vote_batch_limit);
        queue.drain(..n).collect()
    }

    /// Drop cached batches once their transactions are committed.
    pub fn remove_batches(&self, hashes: &HashSet<Hash>) {
        self.batches
            .write()
            .retain(|hash, _| !hashes.contains(hash));
    }

    /// Number of cached batches.
    pub fn batch_count(&self) -> usize {
        self.batches.read().len()
    }
}
