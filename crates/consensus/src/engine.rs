//! The chained HotStuff state machine.
//!
//! Pure protocol rules over block references: the safety and liveness
//! voting rules, the chain-commit rule and QC-high tracking. The engine
//! touches the outside world only through its [`Driver`], and resolves
//! hash references through the block pool, so blocks and certificates
//! stay independently owned records rather than a shared-ownership
//! graph.
//!
//! Callers serialize every operation through the state's update mutex;
//! the engine's own lock only protects its five reference cells and the
//! vote collection window.

use std::pin::Pin;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use quill_crypto::PublicKey;
use quill_types::{Block, QuorumCert, Vote};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::benchmark::{now_unix_nano, Benchmark};
use crate::state::ChainState;

/// The engine's hooks into leaf construction, certificate assembly,
/// dissemination and persistence.
#[async_trait::async_trait]
pub trait Driver: Send + Sync {
    /// The block-QC quorum threshold.
    fn majority_validator_count(&self) -> usize;

    /// Build, sign and register a new leaf extending `parent`.
    async fn create_leaf(&self, parent: &Arc<Block>, qc: &QuorumCert, height: u64) -> Arc<Block>;

    /// Assemble a certificate from a full vote set.
    fn create_qc(&self, votes: &[Vote]) -> QuorumCert;

    /// Hand a proposal to the transport queue. Non-blocking.
    fn broadcast_proposal(&self, block: Arc<Block>);

    /// Vote for a proposal. Non-blocking; the driver performs its
    /// transaction-wait and leader re-check off the caller's task.
    fn vote_block(&self, block: Arc<Block>);

    /// Persist a committed block and clean derived state.
    async fn commit(&self, block: Arc<Block>);
}

struct VoteCollection {
    block_hash: quill_crypto::Hash,
    votes: IndexMap<PublicKey, Vote>,
}

struct Inner {
    b_vote: Arc<Block>,
    b_lock: Arc<Block>,
    b_exec: Arc<Block>,
    b_leaf: Arc<Block>,
    qc_high: QuorumCert,
    proposal: Option<VoteCollection>,
}

/// The HotStuff engine of one replica.
pub struct Hotstuff {
    driver: Arc<dyn Driver>,
    store: Arc<ChainState>,
    inner: RwLock<Inner>,
    qc_high_tx: broadcast::Sender<u64>,
    two_phase: bool,
    benchmark: Option<Benchmark>,
}

impl Hotstuff {
    /// Start the engine from a recovered or genesis `(b0, q0)` pair.
    pub fn new(
        driver: Arc<dyn Driver>,
        store: Arc<ChainState>,
        b0: Arc<Block>,
        q0: QuorumCert,
        two_phase: bool,
        benchmark: Option<Benchmark>,
    ) -> Self {
        let (qc_high_tx, _) = broadcast::channel(16);
        Self {
            driver,
            store,
            inner: RwLock::new(Inner {
                b_vote: b0.clone(),
                b_lock: b0.clone(),
                b_exec: b0.clone(),
                b_leaf: b0,
                qc_high: q0,
                proposal: None,
            }),
            qc_high_tx,
            two_phase,
            benchmark,
        }
    }

    /// Subscribe to "new QC-high" events; the payload is the height of
    /// the newly certified block.
    pub fn subscribe_qc_high(&self) -> broadcast::Receiver<u64> {
        self.qc_high_tx.subscribe()
    }

    /// Propose the next leaf. Leader only; caller holds the update
    /// mutex. Opens a fresh vote collection window for the new block.
    pub async fn on_propose(&self) -> Arc<Block> {
        let (parent, qc_high, height) = {
            let inner = self.inner.read();
            (
                inner.b_leaf.clone(),
                inner.qc_high.clone(),
                inner.b_leaf.height() + 1,
            )
        };
        let b_new = self.driver.create_leaf(&parent, &qc_high, height).await;
        {
            let mut inner = self.inner.write();
            inner.b_leaf = b_new.clone();
            inner.proposal = Some(VoteCollection {
                block_hash: *b_new.hash(),
                votes: IndexMap::new(),
            });
        }
        self.driver.broadcast_proposal(b_new.clone());
        b_new
    }

    /// Collect a vote for the proposal in progress. Votes outside the
    /// active collection window are dropped; when the set reaches the
    /// validator majority the window closes and QC-high advances.
    pub fn on_receive_vote(&self, vote: Vote) {
        let quorum = self.driver.majority_validator_count();
        let full_set = {
            let mut inner = self.inner.write();
            let Some(collection) = inner.proposal.as_mut() else {
                return;
            };
            if collection.block_hash != *vote.block_hash() {
                return;
            }
            collection.votes.entry(*vote.voter()).or_insert(vote);
            if collection.votes.len() < quorum {
                None
            } else {
                inner
                    .proposal
                    .take()
                    .map(|c| c.votes.into_values().collect::<Vec<_>>())
            }
        };
        if let Some(votes) = full_set {
            debug!(count = votes.len(), "vote set complete, creating qc");
            let qc = self.driver.create_qc(&votes);
            self.update_qc_high(qc);
        }
    }

    /// Handle an inbound proposal: vote if the rules allow, then run
    /// the chain-commit update in all cases.
    pub async fn on_receive_proposal(&self, b_new: &Arc<Block>) {
        if self.can_vote(b_new) {
            self.driver.vote_block(b_new.clone());
            self.inner.write().b_vote = b_new.clone();
        }
        self.update(b_new).await;
    }

    /// Whether this replica may vote for `b_new`: strictly above the
    /// last voted height, and passing the safety or the liveness rule.
    pub fn can_vote(&self, b_new: &Arc<Block>) -> bool {
        let (b_vote, b_lock) = {
            let inner = self.inner.read();
            (inner.b_vote.clone(), inner.b_lock.clone())
        };
        if b_new.height() <= b_vote.height() {
            return false;
        }
        self.safety_rule(b_new, &b_lock) || self.liveness_rule(b_new, &b_lock)
    }

    /// `b_new` extends the locked block along the parent chain.
    fn safety_rule(&self, b_new: &Arc<Block>, b_lock: &Arc<Block>) -> bool {
        let mut cursor = Some(b_new.clone());
        while let Some(b) = cursor {
            if b.height() < b_lock.height() {
                break;
            }
            if b.hash() == b_lock.hash() {
                return true;
            }
            cursor = self.store.block(b.parent_hash());
        }
        false
    }

    /// `b_new` justifies a block above the lock, proving a newer quorum.
    fn liveness_rule(&self, b_new: &Arc<Block>, b_lock: &Arc<Block>) -> bool {
        self.justify_block(b_new)
            .map(|b| b.height() > b_lock.height())
            .unwrap_or(false)
    }

    /// The chain-commit rule: adopt the proposal's certificate, advance
    /// the lock, and commit the tail of a two- or three-chain.
    pub async fn update(&self, b_new: &Arc<Block>) {
        let Some(qc) = b_new.quorum_cert() else {
            return;
        };
        let j1 = self.justify_block(b_new);
        let j2 = j1.as_ref().and_then(|b| self.justify_block(b));
        let j3 = j2.as_ref().and_then(|b| self.justify_block(b));

        self.update_qc_high(qc.clone());

        let (lock_target, commit_target) = if self.two_phase {
            let commit = match (&j2, &j1) {
                (Some(b), Some(b1)) if b.hash() == b1.parent_hash() => Some(b.clone()),
                _ => None,
            };
            (j1, commit)
        } else {
            let commit = match (&j3, &j2, &j1) {
                (Some(b), Some(b1), Some(b2))
                    if b1.hash() == b2.parent_hash() && b.hash() == b1.parent_hash() =>
                {
                    Some(b.clone())
                }
                _ => None,
            };
            (j2, commit)
        };

        if let Some(lock) = lock_target {
            let mut inner = self.inner.write();
            if lock.height() > inner.b_lock.height() {
                inner.b_lock = lock;
            }
        }

        if let Some(b) = commit_target {
            let t1 = now_unix_nano();
            self.on_commit(&b).await;
            let advanced = {
                let mut inner = self.inner.write();
                // b_exec never regresses
                if b.height() > inner.b_exec.height() {
                    inner.b_exec = b.clone();
                    true
                } else {
                    false
                }
            };
            let t2 = now_unix_nano();
            if advanced {
                if let Some(benchmark) = &self.benchmark {
                    benchmark.record(
                        b.height(),
                        b.timestamp(),
                        t1,
                        t2,
                        b.transactions().len(),
                    );
                }
            }
        }
    }

    /// Commit `b` and every uncommitted ancestor, oldest first, so the
    /// storage prefix is always contiguous.
    fn on_commit<'a>(
        &'a self,
        b: &'a Arc<Block>,
    ) -> Pin<Box<dyn std::future::Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            let b_exec = self.b_exec();
            if b.height() > b_exec.height() {
                match self.store.block(b.parent_hash()) {
                    Some(parent) => self.on_commit(&parent).await,
                    None => {
                        warn!(
                            height = b.height(),
                            hash = %hex::encode(&b.hash()[..8]),
                            "commit recursion lost its parent"
                        );
                        return;
                    }
                }
                self.driver.commit(b.clone()).await;
            } else if b_exec.hash() != b.hash() {
                warn!(
                    height = b.height(),
                    hash = %hex::encode(&b.hash()[..8]),
                    exec_height = b_exec.height(),
                    "safety breached, refusing to overwrite committed block"
                );
            }
        })
    }

    /// Adopt `qc` if it certifies a higher block than the current
    /// QC-high; the leaf follows and subscribers are notified.
    pub fn update_qc_high(&self, qc: QuorumCert) {
        let Some(new_block) = self.store.block(qc.block_hash()) else {
            return;
        };
        let advanced = {
            let mut inner = self.inner.write();
            let current = self
                .store
                .block(inner.qc_high.block_hash())
                .map(|b| b.height())
                .unwrap_or(0);
            if new_block.height() > current {
                inner.qc_high = qc;
                inner.b_leaf = new_block.clone();
                true
            } else {
                false
            }
        };
        if advanced {
            debug!(height = new_block.height(), "updated qc high");
            let _ = self.qc_high_tx.send(new_block.height());
        }
    }

    /// The block a proposal's certificate points at, resolved through
    /// the pool.
    fn justify_block(&self, block: &Arc<Block>) -> Option<Arc<Block>> {
        let qc = block.quorum_cert()?;
        self.store.block(qc.block_hash())
    }

    /// Highest block this replica voted for.
    pub fn b_vote(&self) -> Arc<Block> {
        self.inner.read().b_vote.clone()
    }

    /// The locked block.
    pub fn b_lock(&self) -> Arc<Block> {
        self.inner.read().b_lock.clone()
    }

    /// Highest executed block.
    pub fn b_exec(&self) -> Arc<Block> {
        self.inner.read().b_exec.clone()
    }

    /// Tip of the chain extending the best known certificate.
    pub fn b_leaf(&self) -> Arc<Block> {
        self.inner.read().b_leaf.clone()
    }

    /// The highest known certificate.
    pub fn qc_high(&self) -> QuorumCert {
        self.inner.read().qc_high.clone()
    }

    /// Height of the block the highest certificate points at.
    pub fn qc_high_height(&self) -> u64 {
        let qc = self.qc_high();
        self.store
            .block(qc.block_hash())
            .map(|b| b.height())
            .unwrap_or(0)
    }
}
