//! Genesis bootstrap.
//!
//! A fresh chain has no `(b0, q0)` to recover, so the first worker runs
//! a one-shot ceremony: it builds the deterministic genesis block,
//! broadcasts it as a proposal, and aggregates votes into the genesis
//! certificate, which it persists and broadcasts as a new-view message.
//! Followers validate the proposal, vote, and persist the same pair
//! when the certificate reaches them. The ceremony reuses the ordinary
//! proposal/vote/new-view topics and completes once storage holds the
//! pair.

use std::sync::Arc;
use std::time::Duration;

use quill_crypto::PublicKey;
use quill_types::{Block, BlockCommit, QuorumCert, Vote};
use tracing::{debug, error, info, warn};

use crate::resources::{CommitData, Resources};

/// Ordinal of the worker that proposes genesis.
const GENESIS_PROPOSER: usize = 0;

/// How often the proposer re-broadcasts while waiting for votes.
const REBROADCAST_INTERVAL: Duration = Duration::from_secs(1);

pub(crate) struct Genesis<'a> {
    pub(crate) resources: &'a Resources,
    pub(crate) chain_id: i64,
}

impl Genesis<'_> {
    /// Run the ceremony to completion, returning the genesis pair.
    pub(crate) async fn run(&self) -> (Arc<Block>, QuorumCert) {
        let proposer = self
            .resources
            .validators
            .worker(GENESIS_PROPOSER)
            .expect("validator set has no workers");
        if proposer == self.resources.signer.public_key() {
            self.propose().await
        } else {
            self.follow(&proposer).await
        }
    }

    /// Deterministic genesis block content; identical on every replica
    /// up to the proposer signature.
    fn build_block(&self) -> Block {
        Block::builder()
            .height(0)
            .timestamp(self.chain_id)
            .sign(self.resources.signer.as_ref())
    }

    async fn propose(&self) -> (Arc<Block>, QuorumCert) {
        let mut vote_rx = self.resources.msg_svc.subscribe_vote(64);
        let block = Arc::new(self.build_block());
        info!(hash = %hex::encode(&block.hash()[..8]), "proposing genesis block");

        let mut votes: Vec<Vote> = Vec::new();
        if self
            .resources
            .validators
            .is_voter(&self.resources.signer.public_key())
        {
            votes.push(block.proposer_vote());
        }

        let quorum = self.resources.validators.majority_validator_count();
        while votes.len() < quorum {
            if let Err(err) = self.resources.msg_svc.broadcast_proposal(block.clone()) {
                warn!(%err, "failed to hand genesis proposal to transport");
            }
            let deadline = tokio::time::sleep(REBROADCAST_INTERVAL);
            tokio::pin!(deadline);
            loop {
                tokio::select! {
                    _ = &mut deadline => break,
                    received = vote_rx.recv() => {
                        let Some(vote) = received else { break };
                        if vote.block_hash() != block.hash() {
                            continue;
                        }
                        if vote.validate(self.resources.validators.as_ref()).is_err() {
                            continue;
                        }
                        if votes.iter().all(|v| v.voter() != vote.voter()) {
                            votes.push(vote);
                        }
                        if votes.len() >= quorum {
                            break;
                        }
                    }
                }
            }
        }

        let qc = QuorumCert::build(*block.hash(), &votes);
        self.persist(&block, &qc).await;
        if let Err(err) = self.resources.msg_svc.broadcast_new_view(qc.clone()) {
            warn!(%err, "failed to hand genesis certificate to transport");
        }
        info!("genesis block committed");
        (block, qc)
    }

    /// Wait for the genesis proposal, vote, and wait for the
    /// certificate. The certificate is accepted either from the
    /// new-view broadcast or from the first height-1 proposal that
    /// embeds it; a missed proposal is re-requested by height.
    async fn follow(&self, proposer: &PublicKey) -> (Arc<Block>, QuorumCert) {
        let mut proposal_rx = self.resources.msg_svc.subscribe_proposal(8);
        let mut new_view_rx = self.resources.msg_svc.subscribe_new_view(8);

        let mut block: Option<Arc<Block>> = None;
        let mut voted = false;

        let qc = loop {
            if let Some(block) = &block {
                if !voted {
                    voted = true;
                    if self
                        .resources
                        .validators
                        .is_voter(&self.resources.signer.public_key())
                    {
                        let vote = block.vote(self.resources.signer.as_ref());
                        if let Err(err) = self.resources.msg_svc.send_vote(proposer, vote) {
                            warn!(%err, "failed to hand genesis vote to transport");
                        }
                        debug!("voted genesis block");
                    }
                }
            }

            tokio::select! {
                received = proposal_rx.recv() => {
                    let Some(received) = received else {
                        error!("proposal subscription closed during genesis");
                        std::process::exit(1);
                    };
                    match received.height() {
                        0 => {
                            if block.is_none() && self.accept_genesis_block(&received, proposer) {
                                block = Some(Arc::new(received));
                            }
                        }
                        1 => {
                            // the first real proposal embeds the genesis
                            // certificate as its justification
                            if let Some(b0) = &block {
                                if let Some(embedded) = received.quorum_cert() {
                                    if embedded.block_hash() == b0.hash()
                                        && embedded
                                            .validate(self.resources.validators.as_ref())
                                            .is_ok()
                                    {
                                        break embedded.clone();
                                    }
                                }
                            }
                        }
                        _ => {}
                    }
                }
                received = new_view_rx.recv() => {
                    let Some(received) = received else {
                        error!("new-view subscription closed during genesis");
                        std::process::exit(1);
                    };
                    if let Some(b0) = &block {
                        if received.block_hash() == b0.hash() {
                            match received.validate(self.resources.validators.as_ref()) {
                                Ok(()) => break received,
                                Err(err) => warn!(%err, "invalid genesis certificate"),
                            }
                        }
                    }
                }
                _ = tokio::time::sleep(REBROADCAST_INTERVAL) => {
                    if block.is_none() {
                        match self
                            .resources
                            .msg_svc
                            .request_block_by_height(proposer, 0)
                            .await
                        {
                            Ok(fetched) => {
                                if self.accept_genesis_block(&fetched, proposer) {
                                    block = Some(Arc::new(fetched));
                                }
                            }
                            Err(err) => debug!(%err, "genesis block not yet available"),
                        }
                    }
                }
            }
        };

        let block = block.expect("certificate accepted only after the block");
        self.persist(&block, &qc).await;
        info!("genesis block committed");
        (block, qc)
    }

    fn accept_genesis_block(&self, block: &Block, proposer: &PublicKey) -> bool {
        if !block.is_genesis() {
            return false;
        }
        if block.proposer() != proposer {
            warn!("genesis proposal from unexpected proposer");
            return false;
        }
        if block.timestamp() != self.chain_id {
            warn!("genesis proposal with unexpected chain id");
            return false;
        }
        if let Err(err) = block.validate(self.resources.validators.as_ref()) {
            warn!(%err, "invalid genesis proposal");
            return false;
        }
        true
    }

    async fn persist(&self, block: &Arc<Block>, qc: &QuorumCert) {
        let data = CommitData {
            block: block.clone(),
            quorum_cert: Some(qc.clone()),
            transactions: Vec::new(),
            block_commit: BlockCommit::new(*block.hash(), *block.merkle_root()),
            tx_commits: Vec::new(),
        };
        if let Err(err) = self.resources.storage.commit(data).await {
            error!(%err, "genesis commit storage error");
            std::process::exit(1);
        }
    }
}
