//! Inbound message handling.
//!
//! One loop per subscription dispatches proposals, votes, batches,
//! batch votes and new-view messages into the engine and the auxiliary
//! state. Every handler validates signatures and semantic preconditions
//! before touching state; validation failures are logged at warn and
//! the message is dropped. A proposal whose ancestors are locally
//! unknown triggers a peer fetch; if the fetch fails the proposal is
//! dropped and will be re-requested when the next one referencing the
//! same ancestor arrives.

use std::sync::Arc;

use quill_crypto::Hash;
use quill_types::{Batch, BatchVote, Block, QuorumCert, Vote};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::Config;
use crate::engine::Hotstuff;
use crate::leader_state::LeaderState;
use crate::resources::Resources;
use crate::rotator::Rotator;
use crate::state::ChainState;
use crate::voter_state::VoterState;
use crate::{ConsensusError, Result};

const PROPOSAL_BUFFER: usize = 8;
const VOTE_BUFFER: usize = 64;
const BATCH_BUFFER: usize = 64;
const BATCH_VOTE_BUFFER: usize = 64;
const NEW_VIEW_BUFFER: usize = 8;

pub(crate) struct Validator {
    pub(crate) resources: Resources,
    pub(crate) config: Config,
    pub(crate) state: Arc<ChainState>,
    pub(crate) hotstuff: Arc<Hotstuff>,
    pub(crate) rotator: Arc<Rotator>,
    pub(crate) voter_state: Arc<VoterState>,
    pub(crate) leader_state: Arc<LeaderState>,
}

/// Send a freshly certified batch to the current block leader so its
/// ready queue converges with ours.
pub(crate) fn forward_certified_batch(
    resources: &Resources,
    state: &ChainState,
    batch: Batch,
) {
    let Some(leader) = resources.validators.worker(state.leader_index()) else {
        return;
    };
    if leader == *state.own_key() {
        return;
    }
    if let Err(err) = resources.msg_svc.send_batch(&leader, batch) {
        warn!(%err, "failed to hand certified batch to transport");
    }
}

macro_rules! subscription_loop {
    ($self:ident, $stop:ident, $rx:ident, $handler:ident) => {{
        let this = $self.clone();
        let mut stop = $stop.clone();
        let mut rx = $rx;
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = stop.changed() => return,
                    msg = rx.recv() => match msg {
                        Some(msg) => this.$handler(msg).await,
                        None => return,
                    },
                }
            }
        })
    }};
}

impl Validator {
    /// Subscribe to every inbound topic and spawn one handler loop per
    /// subscription.
    pub(crate) fn spawn(
        self: &Arc<Self>,
        stop: &watch::Receiver<bool>,
    ) -> Vec<JoinHandle<()>> {
        let proposals = self.resources.msg_svc.subscribe_proposal(PROPOSAL_BUFFER);
        let votes = self.resources.msg_svc.subscribe_vote(VOTE_BUFFER);
        let batches = self.resources.msg_svc.subscribe_batch(BATCH_BUFFER);
        let batch_votes = self.resources.msg_svc.subscribe_batch_vote(BATCH_VOTE_BUFFER);
        let new_views = self.resources.msg_svc.subscribe_new_view(NEW_VIEW_BUFFER);

        vec![
            subscription_loop!(self, stop, proposals, on_proposal),
            subscription_loop!(self, stop, votes, on_vote),
            subscription_loop!(self, stop, batches, on_batch),
            subscription_loop!(self, stop, batch_votes, on_batch_vote),
            subscription_loop!(self, stop, new_views, on_new_view),
        ]
    }

    async fn on_proposal(&self, block: Block) {
        if let Err(err) = block.validate(self.resources.validators.as_ref()) {
            warn!(%err, height = block.height(), "invalid proposal");
            return;
        }
        let block = Arc::new(block);
        if self.state.block(block.hash()).is_some() {
            return;
        }
        if let Err(err) = self.sync_ancestors(&block).await {
            warn!(%err, height = block.height(), "dropping proposal, ancestors unavailable");
            return;
        }
        if let Some(qc) = block.quorum_cert() {
            self.state.set_qc(qc.clone());
        }
        self.state.set_block(block.clone());

        let _update = self.state.update_mutex.lock().await;
        self.hotstuff.on_receive_proposal(&block).await;
        debug!(height = block.height(), "processed proposal");
    }

    /// Fetch unknown ancestors of `block` from its proposer, oldest
    /// first, so the parent chain resolves locally.
    async fn sync_ancestors(&self, block: &Arc<Block>) -> Result<()> {
        let mut missing: Vec<Block> = Vec::new();
        let mut cursor = *block.parent_hash();
        while cursor != Hash::default() && self.state.block(&cursor).is_none() {
            let fetched = self
                .resources
                .msg_svc
                .request_block(block.proposer(), &cursor)
                .await?;
            if *fetched.hash() != cursor {
                return Err(ConsensusError::UnknownBlock(hex::encode(&cursor[..8])));
            }
            fetched
                .validate(self.resources.validators.as_ref())
                .map_err(|source| ConsensusError::InvalidMessage {
                    kind: "fetched block",
                    source,
                })?;
            cursor = *fetched.parent_hash();
            missing.push(fetched);
        }
        for fetched in missing.into_iter().rev() {
            let fetched = Arc::new(fetched);
            if let Some(qc) = fetched.quorum_cert() {
                self.state.set_qc(qc.clone());
            }
            self.state.set_block(fetched);
        }
        Ok(())
    }

    async fn on_vote(&self, vote: Vote) {
        if let Err(err) = vote.validate(self.resources.validators.as_ref()) {
            warn!(%err, "invalid vote");
            return;
        }
        let _update = self.state.update_mutex.lock().await;
        self.hotstuff.on_receive_vote(vote);
    }

    async fn on_batch(&self, batch: Batch) {
        if let Err(err) = batch.validate(self.resources.validators.as_ref()) {
            warn!(%err, "invalid batch");
            return;
        }

        if batch.batch_qc().is_some() {
            self.on_certified_batch(batch).await;
            return;
        }

        let Some(worker_index) = self
            .resources
            .validators
            .worker_index(batch.proposer())
        else {
            return;
        };
        if let Err(err) = self
            .resources
            .tx_pool
            .store_txs(batch.transactions(), false)
            .await
        {
            warn!(%err, "failed to store batch transactions");
            return;
        }
        if !self.voter_state.add_batch(batch.clone(), worker_index) {
            return;
        }
        if !self.config.vote_batch || !self.state.is_this_node_voter() {
            return;
        }

        let hashes = self.voter_state.pop_votes(worker_index);
        if hashes.is_empty() {
            return;
        }
        let count = hashes.len();
        let vote = BatchVote::new(hashes, self.resources.signer.as_ref());
        if let Err(err) = self
            .resources
            .msg_svc
            .send_batch_vote(batch.proposer(), vote)
        {
            warn!(%err, "failed to hand batch vote to transport");
            return;
        }
        debug!(batches = count, worker = worker_index, "voted batch");
    }

    /// A batch that already carries its certificate goes straight into
    /// the ready queue.
    async fn on_certified_batch(&self, batch: Batch) {
        let header = batch.header();
        if let Err(err) = header.validate(self.resources.validators.as_ref()) {
            warn!(%err, "invalid certified batch");
            return;
        }
        if let Err(err) = self
            .resources
            .tx_pool
            .store_txs(batch.transactions(), false)
            .await
        {
            warn!(%err, "failed to store batch transactions");
            return;
        }
        self.leader_state.enqueue_ready(header);
        debug!(hash = %hex::encode(&batch.hash()[..8]), "enqueued certified batch");
    }

    async fn on_batch_vote(&self, vote: BatchVote) {
        if let Err(err) = vote.validate(self.resources.validators.as_ref()) {
            warn!(%err, "invalid batch vote");
            return;
        }
        for (hash, signature) in vote.batch_hashes().iter().zip(vote.signatures()) {
            if let Some(certified) = self.leader_state.add_signature(hash, signature.clone()) {
                debug!(hash = %hex::encode(&hash[..8]), "sealed batch certificate");
                forward_certified_batch(&self.resources, &self.state, certified);
            }
        }
    }

    async fn on_new_view(&self, qc: QuorumCert) {
        if let Err(err) = qc.validate(self.resources.validators.as_ref()) {
            warn!(%err, "invalid new-view");
            return;
        }
        // adopting a qc whose block is unknown is a no-op; the block
        // will arrive with the next proposal that references it
        self.rotator.on_receive_new_view(qc).await;
    }
}
