//! The pacemaker: two timed loops that keep the protocol moving.
//!
//! The propose loop creates blocks while this node leads; the batch
//! loop creates batches while this node holds the worker role. Both
//! wake early on a "new QC-high" event so a fast quorum immediately
//! triggers the next step, and both take the update mutex for the
//! duration of their engine work - the sends they perform under it are
//! non-blocking hand-offs.

use std::sync::Arc;

use quill_types::{transaction::tx_hashes, Batch};
use tokio::sync::watch;
use tracing::debug;

use crate::benchmark::now_unix_nano;
use crate::config::Config;
use crate::engine::Hotstuff;
use crate::leader_state::LeaderState;
use crate::resources::Resources;
use crate::state::ChainState;
use crate::voter_state::VoterState;

pub(crate) struct Pacemaker {
    pub(crate) resources: Resources,
    pub(crate) config: Config,
    pub(crate) state: Arc<ChainState>,
    pub(crate) voter_state: Arc<VoterState>,
    pub(crate) leader_state: Arc<LeaderState>,
    pub(crate) hotstuff: Arc<Hotstuff>,
}

impl Pacemaker {
    /// Block-creation loop. Each round: propose (if leading), then wait
    /// for a quorum or the propose timeout, then respect the minimum
    /// block delay.
    pub(crate) async fn propose_loop(self: Arc<Self>, mut stop: watch::Receiver<bool>) {
        let mut qc_events = self.hotstuff.subscribe_qc_high();
        loop {
            let block_delay = tokio::time::sleep(self.config.block_delay);
            tokio::pin!(block_delay);

            self.new_block(&stop).await;

            let timeout = tokio::time::sleep(self.config.propose_timeout);
            tokio::pin!(timeout);
            tokio::select! {
                _ = stop.changed() => return,
                _ = &mut timeout => {}
                _ = qc_events.recv() => {}
            }

            tokio::select! {
                _ = stop.changed() => return,
                _ = &mut block_delay => {}
            }
        }
    }

    /// Batch-creation loop. Each round: create and broadcast a batch
    /// (if a worker), then wait for a quorum or the batch timeout,
    /// stretched by the transaction wait when the pool is empty.
    pub(crate) async fn batch_loop(self: Arc<Self>, mut stop: watch::Receiver<bool>) {
        let mut qc_events = self.hotstuff.subscribe_qc_high();
        loop {
            self.new_batch(&stop).await;

            let mut wait = self.config.batch_timeout;
            if self.resources.tx_pool.status().total == 0 {
                wait += self.config.tx_wait_time;
            }
            tokio::select! {
                _ = stop.changed() => return,
                _ = tokio::time::sleep(wait) => {}
                _ = qc_events.recv() => {}
            }
        }
    }

    async fn new_block(&self, stop: &watch::Receiver<bool>) {
        let _update = self.state.update_mutex.lock().await;
        if *stop.borrow() {
            return;
        }
        if !self.state.is_this_node_leader() {
            return;
        }

        let block = self.hotstuff.on_propose().await;
        debug!(height = block.height(), "proposed block");

        // the proposer's own signature doubles as its vote, and the
        // self-vote path may already complete a chain
        self.hotstuff.on_receive_vote(block.proposer_vote());
        self.hotstuff.update(&block).await;
    }

    async fn new_batch(&self, stop: &watch::Receiver<bool>) {
        let _update = self.state.update_mutex.lock().await;
        if *stop.borrow() {
            return;
        }
        if !self.state.is_this_node_worker() {
            return;
        }

        let txs = self
            .resources
            .tx_pool
            .pop_txs_from_queue(self.config.batch_tx_limit)
            .await;
        let batch = Batch::new(txs, now_unix_nano(), self.resources.signer.as_ref());

        let worker_index = self
            .resources
            .validators
            .worker_index(self.state.own_key())
            .unwrap_or(0);
        self.voter_state.add_batch(batch.clone(), worker_index);

        let dropped = self.leader_state.register_batch(batch.clone());
        for stale in dropped {
            debug!(
                hash = %hex::encode(&stale.hash()[..8]),
                "batch missed its vote window, requeueing transactions"
            );
            self.resources
                .tx_pool
                .put_txs_to_queue(&tx_hashes(stale.transactions()))
                .await;
        }

        if self.config.vote_batch && self.state.is_this_node_voter() {
            // the worker's batch signature doubles as its own batch vote
            let own_sig = self.resources.signer.sign(batch.hash());
            if let Some(certified) = self.leader_state.add_signature(batch.hash(), own_sig) {
                crate::validator::forward_certified_batch(&self.resources, &self.state, certified);
            }
        }

        if let Err(err) = self.resources.msg_svc.broadcast_batch(batch.clone()) {
            tracing::warn!(%err, "failed to hand batch to transport");
            return;
        }
        debug!(
            txs = batch.transactions().len(),
            worker = worker_index,
            "generated batch"
        );
    }
}
