//! Worker-side batch-vote aggregation.
//!
//! Every worker keeps this state, since any worker may lead. The
//! accumulator collects voter signatures for the batches this worker
//! originated; once the voter majority is reached the certificate is
//! sealed. The ready queue holds certified headers - own and received -
//! until a block proposal drains them.
//!
//! A batch whose accumulator outlives `batch_wait_time` without
//! reaching the majority is dropped; its transactions go back to the
//! queue. The policy is deterministic for a given message sequence and
//! clock.

use std::collections::{HashSet, VecDeque};
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use parking_lot::Mutex;
use quill_crypto::{Hash, PublicKey, Signature};
use quill_types::{Batch, BatchHeader, BatchQuorumCert};

struct BatchAccumulator {
    batch: Batch,
    signatures: IndexMap<PublicKey, Signature>,
    since: Instant,
}

/// Per-worker signature accumulator and ready-header queue.
pub struct LeaderState {
    accumulators: Mutex<IndexMap<Hash, BatchAccumulator>>,
    ready: Mutex<ReadyQueue>,
    batch_sign_limit: usize,
    block_batch_limit: usize,
    batch_wait_time: Duration,
}

struct ReadyQueue {
    headers: VecDeque<BatchHeader>,
    enqueued: HashSet<Hash>,
}

impl LeaderState {
    /// Create leader state sealing at `batch_sign_limit` signatures and
    /// draining up to `block_batch_limit` headers per block.
    pub fn new(batch_sign_limit: usize, block_batch_limit: usize, batch_wait_time: Duration) -> Self {
        Self {
            accumulators: Mutex::new(IndexMap::new()),
            ready: Mutex::new(ReadyQueue {
                headers: VecDeque::new(),
                enqueued: HashSet::new(),
            }),
            batch_sign_limit: batch_sign_limit.max(1),
            block_batch_limit: block_batch_limit.max(1),
            batch_wait_time,
        }
    }

    /// Start accumulating signatures for a batch this worker created.
    /// Returns the batches dropped by the stale purge, for requeueing.
    pub fn register_batch(&self, batch: Batch) -> Vec<Batch> {
        let mut accumulators = self.accumulators.lock();
        let dropped = Self::purge_stale(&mut accumulators, self.batch_wait_time);
        accumulators
            .entry(*batch.hash())
            .or_insert_with(|| BatchAccumulator {
                batch,
                signatures: IndexMap::new(),
                since: Instant::now(),
            });
        dropped
    }

    /// Append one voter signature. Returns the certified batch when the
    /// voter majority is reached; the accumulator is consumed and the
    /// header enters the ready queue.
    pub fn add_signature(&self, batch_hash: &Hash, signature: Signature) -> Option<Batch> {
        let certified = {
            let mut accumulators = self.accumulators.lock();
            let accumulator = accumulators.get_mut(batch_hash)?;
            accumulator
                .signatures
                .entry(*signature.public_key())
                .or_insert(signature);
            if accumulator.signatures.len() < self.batch_sign_limit {
                return None;
            }
            let accumulator = accumulators.shift_remove(batch_hash)?;
            let signatures: Vec<Signature> = accumulator.signatures.into_values().collect();
            let qc = BatchQuorumCert::build(*batch_hash, &signatures);
            accumulator.batch.with_batch_qc(qc)
        };
        self.enqueue_ready(certified.header());
        Some(certified)
    }

    /// Enqueue a certified header for the next proposal. Each batch
    /// enters the queue at most once, ever.
    pub fn enqueue_ready(&self, header: BatchHeader) {
        let mut ready = self.ready.lock();
        if ready.enqueued.insert(*header.hash()) {
            ready.headers.push_back(header);
        }
    }

    /// Drain up to the block-batch limit of ready headers.
    pub fn pop_ready_headers(&self) -> Vec<BatchHeader> {
        let mut ready = self.ready.lock();
        let n = ready.headers.len().min(self.block_batch_limit);
        ready.headers.drain(..n).collect()
    }

    /// Certified headers waiting for a proposal.
    pub fn ready_count(&self) -> usize {
        self.ready.lock().headers.len()
    }

    /// Batches still collecting signatures.
    pub fn accumulating_count(&self) -> usize {
        self.accumulators.lock().len()
    }

    fn purge_stale(
        accumulators: &mut IndexMap<Hash, BatchAccumulator>,
        wait: Duration,
    ) -> Vec<Batch> {
        let mut dropped = Vec::new();
        accumulators.retain(|_, acc| {
            if acc.since.elapsed() > wait {
                dropped.push(acc.batch.clone());
                false
            } else {
                true
            }
        });
        dropped
    }
}
