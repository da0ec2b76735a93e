//! The engine's bridge to the outside world: leaf construction,
//! certificate assembly, dissemination, voting and commit persistence.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use quill_crypto::Hash;
use quill_types::{Block, QuorumCert, Vote};
use tokio::time::Instant;
use tracing::{debug, error, warn};

use crate::benchmark::now_unix_nano;
use crate::config::Config;
use crate::engine::Driver;
use crate::leader_state::LeaderState;
use crate::resources::Resources;
use crate::state::ChainState;
use crate::voter_state::VoterState;

/// Interval between transaction-pool polls while a vote is delayed.
const CHECK_TX_DELAY: Duration = Duration::from_millis(10);

/// Concrete [`Driver`] wired to the node's resources.
#[derive(Clone)]
pub struct HsDriver {
    resources: Resources,
    config: Config,
    state: Arc<ChainState>,
    leader_state: Arc<LeaderState>,
    voter_state: Arc<VoterState>,
}

impl HsDriver {
    /// Wire a driver to the node's resources and shared state.
    pub fn new(
        resources: Resources,
        config: Config,
        state: Arc<ChainState>,
        leader_state: Arc<LeaderState>,
        voter_state: Arc<VoterState>,
    ) -> Self {
        Self {
            resources,
            config,
            state,
            leader_state,
            voter_state,
        }
    }

    /// Deduplicate the batched transactions, dropping hashes an earlier
    /// block already committed, and sync missing ones from the batch
    /// proposers.
    async fn extract_batch_txs(&self, headers: &[quill_types::BatchHeader]) -> Vec<Hash> {
        for header in headers {
            if let Err(err) = self
                .resources
                .tx_pool
                .sync_txs(header.proposer(), header.tx_hashes())
                .await
            {
                warn!(%err, "tx sync failed");
            }
        }
        let mut seen: HashSet<Hash> = HashSet::new();
        let mut txs = Vec::new();
        for header in headers {
            for hash in header.tx_hashes() {
                if seen.contains(hash) {
                    continue;
                }
                if self.resources.storage.has_tx(hash).await {
                    continue;
                }
                seen.insert(*hash);
                txs.push(*hash);
            }
        }
        txs
    }

    /// Wait up to `tx_wait_time` for the pool to become non-empty.
    async fn delay_vote_when_no_txs(&self) {
        let deadline = Instant::now() + self.config.tx_wait_time;
        while self.resources.tx_pool.status().total == 0 {
            if Instant::now() >= deadline {
                return;
            }
            tokio::time::sleep(CHECK_TX_DELAY).await;
        }
    }

    /// Delete derived state the committed block invalidates: its own
    /// certificate, its transactions in the pool, the orphaned forks at
    /// or below it, and pool entries twenty heights back.
    async fn clean_state_on_committed(&self, block: &Arc<Block>) {
        self.state.delete_qc(block.hash());
        if !self.config.preserve_txs {
            self.resources.tx_pool.remove_txs(block.transactions()).await;
        }
        self.state.set_committed_block(block.clone());

        let committed_batches: HashSet<Hash> =
            block.batch_headers().iter().map(|h| *h.hash()).collect();
        self.voter_state.remove_batches(&committed_batches);

        let forks = self.state.uncommitted_older_blocks(block);
        for fork in forks {
            self.resources
                .tx_pool
                .put_txs_to_queue(fork.transactions())
                .await;
            self.state.delete_block(fork.hash());
            self.state.delete_qc(fork.hash());
        }
        self.delete_committed_older_blocks(block);
    }

    fn delete_committed_older_blocks(&self, block: &Arc<Block>) {
        let Some(height) = block.height().checked_sub(20) else {
            return;
        };
        for old in self.state.older_blocks(height) {
            self.state.delete_block(old.hash());
            self.state.delete_committed(old.hash());
        }
    }
}

#[async_trait::async_trait]
impl Driver for HsDriver {
    fn majority_validator_count(&self) -> usize {
        self.resources.validators.majority_validator_count()
    }

    async fn create_leaf(&self, parent: &Arc<Block>, qc: &QuorumCert, height: u64) -> Arc<Block> {
        let headers = self.leader_state.pop_ready_headers();
        let txs = self.extract_batch_txs(&headers).await;
        let exec_height = self.resources.storage.block_height().await;
        let merkle_root = self.resources.storage.merkle_root().await;

        let block = Arc::new(
            Block::builder()
                .height(height)
                .parent_hash(*parent.hash())
                .quorum_cert(qc.clone())
                .exec_height(exec_height)
                .merkle_root(merkle_root)
                .timestamp(now_unix_nano())
                .batch_headers(headers)
                .transactions(txs)
                .sign(self.resources.signer.as_ref()),
        );
        self.state.set_block(block.clone());
        debug!(
            height = block.height(),
            batches = block.batch_headers().len(),
            txs = block.transactions().len(),
            "generated block"
        );
        block
    }

    fn create_qc(&self, votes: &[Vote]) -> QuorumCert {
        debug_assert!(!votes.is_empty());
        let block_hash = votes
            .first()
            .map(|v| *v.block_hash())
            .unwrap_or_default();
        let qc = QuorumCert::build(block_hash, votes);
        self.state.set_qc(qc.clone());
        qc
    }

    fn broadcast_proposal(&self, block: Arc<Block>) {
        if let Err(err) = self.resources.msg_svc.broadcast_proposal(block) {
            warn!(%err, "failed to hand proposal to transport");
        }
    }

    fn vote_block(&self, block: Arc<Block>) {
        let driver = self.clone();
        tokio::spawn(async move {
            let vote = block.vote(driver.resources.signer.as_ref());
            driver
                .resources
                .tx_pool
                .set_txs_pending(block.transactions())
                .await;
            driver.delay_vote_when_no_txs().await;

            // view may have changed while we waited for transactions
            if !driver.state.is_leader(block.proposer()) {
                return;
            }
            if let Err(err) = driver.resources.msg_svc.send_vote(block.proposer(), vote) {
                warn!(%err, "failed to hand vote to transport");
                return;
            }
            debug!(
                height = block.height(),
                proposer = %block.proposer(),
                "voted block"
            );
        });
    }

    async fn commit(&self, block: Arc<Block>) {
        let start = Instant::now();
        let (txs, old) = match self
            .resources
            .tx_pool
            .get_txs_to_execute(block.transactions())
            .await
        {
            Ok(resolved) => resolved,
            Err(err) => {
                // a transaction referenced by a committed block is gone;
                // halting beats serving an incoherent prefix
                error!(%err, height = block.height(), "transactions unavailable for committed block");
                std::process::exit(1);
            }
        };
        debug!(height = block.height(), txs = txs.len(), "committing block");

        let (mut block_commit, tx_commits) = if self.config.execute_txs {
            self.resources.execution.execute(&block, &txs)
        } else {
            self.resources.execution.simulate(&block)
        };
        block_commit.set_old_block_txs(old);

        let data = crate::resources::CommitData {
            block: block.clone(),
            quorum_cert: self.state.qc(block.hash()),
            transactions: txs.clone(),
            block_commit,
            tx_commits,
        };
        if let Err(err) = self.resources.storage.commit(data).await {
            error!(%err, height = block.height(), "commit storage error");
            std::process::exit(1);
        }
        self.state.add_committed_tx_count(txs.len());
        self.clean_state_on_committed(&block).await;
        debug!(
            height = block.height(),
            batches = block.batch_headers().len(),
            txs = txs.len(),
            elapsed = ?start.elapsed(),
            "committed block"
        );
    }
}
