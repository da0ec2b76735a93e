//! Top-level consensus lifecycle: wiring, start, stop and status.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use quill_crypto::Hash;
use quill_types::Block;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::benchmark::{now_unix_nano, Benchmark};
use crate::config::{Config, Phases};
use crate::driver::HsDriver;
use crate::engine::Hotstuff;
use crate::genesis::Genesis;
use crate::leader_state::LeaderState;
use crate::pacemaker::Pacemaker;
use crate::resources::Resources;
use crate::rotator::Rotator;
use crate::state::ChainState;
use crate::status::Status;
use crate::validator::Validator;
use crate::voter_state::VoterState;

struct Running {
    state: Arc<ChainState>,
    hotstuff: Arc<Hotstuff>,
    rotator: Arc<Rotator>,
    stop_tx: watch::Sender<bool>,
}

/// The consensus core of one replica.
///
/// `start` recovers `(b0, q0)` from storage - or runs the genesis
/// ceremony on a fresh chain - then spawns the propose loop, the batch
/// loop, the rotator and the inbound handlers. `stop` signals every
/// loop to exit at its next wakeup. Both are idempotent.
pub struct Consensus {
    resources: Resources,
    config: Config,
    running: Mutex<Option<Running>>,
    start_time: AtomicI64,
}

impl Consensus {
    /// Create a stopped consensus core over the given collaborators.
    pub fn new(resources: Resources, config: Config) -> Self {
        Self {
            resources,
            config,
            running: Mutex::new(None),
            start_time: AtomicI64::new(0),
        }
    }

    /// Recover or bootstrap the chain, then start all loops.
    pub async fn start(&self) {
        if self.running.lock().is_some() {
            return;
        }
        self.start_time.store(now_unix_nano(), Ordering::Release);

        let (b0, q0) = match self.resources.storage.last_block().await {
            Some(block) => {
                let Some(qc) = self.resources.storage.last_qc().await else {
                    error!(height = block.height(), "storage has a last block but no last qc");
                    std::process::exit(1);
                };
                (Arc::new(block), qc)
            }
            None => {
                Genesis {
                    resources: &self.resources,
                    chain_id: self.config.chain_id,
                }
                .run()
                .await
            }
        };
        info!(height = b0.height(), "starting consensus");

        let validators = self.resources.validators.clone();
        let state = Arc::new(ChainState::new(
            validators.clone(),
            self.resources.signer.public_key(),
        ));
        state.set_block(b0.clone());
        state.set_qc(q0.clone());
        state.set_leader_index(validators.worker_index(b0.proposer()).unwrap_or(0));

        let worker_count = validators.worker_count();
        let voter_state = Arc::new(VoterState::new(
            self.config.resolved_vote_batch_limit(worker_count),
        ));
        let leader_state = Arc::new(LeaderState::new(
            validators.majority_voter_count(),
            self.config.resolved_block_batch_limit(worker_count),
            self.config.batch_wait_time,
        ));

        let driver = Arc::new(HsDriver::new(
            self.resources.clone(),
            self.config.clone(),
            state.clone(),
            leader_state.clone(),
            voter_state.clone(),
        ));
        let benchmark = self.config.benchmark_path.as_ref().and_then(|path| {
            match Benchmark::open(path) {
                Ok(benchmark) => Some(benchmark),
                Err(err) => {
                    warn!(%err, path = %path.display(), "cannot open benchmark file");
                    None
                }
            }
        });
        let hotstuff = Arc::new(Hotstuff::new(
            driver,
            state.clone(),
            b0,
            q0,
            self.config.phases == Phases::Two,
            benchmark,
        ));
        let rotator = Arc::new(Rotator::new(
            self.resources.clone(),
            self.config.clone(),
            state.clone(),
            hotstuff.clone(),
        ));
        let pacemaker = Arc::new(Pacemaker {
            resources: self.resources.clone(),
            config: self.config.clone(),
            state: state.clone(),
            voter_state: voter_state.clone(),
            leader_state: leader_state.clone(),
            hotstuff: hotstuff.clone(),
        });
        let validator = Arc::new(Validator {
            resources: self.resources.clone(),
            config: self.config.clone(),
            state: state.clone(),
            hotstuff: hotstuff.clone(),
            rotator: rotator.clone(),
            voter_state,
            leader_state,
        });

        let (stop_tx, stop_rx) = watch::channel(false);
        validator.spawn(&stop_rx);
        tokio::spawn(pacemaker.clone().propose_loop(stop_rx.clone()));
        tokio::spawn(pacemaker.batch_loop(stop_rx.clone()));
        tokio::spawn(rotator.clone().run(stop_rx));
        info!("started consensus");

        *self.running.lock() = Some(Running {
            state,
            hotstuff,
            rotator,
            stop_tx,
        });
    }

    /// Signal every loop to exit at its next wakeup.
    pub fn stop(&self) {
        let Some(running) = self.running.lock().take() else {
            return;
        };
        let _ = running.stop_tx.send(true);
        info!("stopped consensus");
    }

    /// A point-in-time status snapshot; all defaults when stopped.
    pub fn status(&self) -> Status {
        let guard = self.running.lock();
        let Some(running) = guard.as_ref() else {
            return Status::default();
        };
        Status {
            start_time: self.start_time.load(Ordering::Acquire),
            committed_tx_count: running.state.committed_tx_count(),
            block_pool_size: running.state.block_pool_size(),
            qc_pool_size: running.state.qc_pool_size(),
            view_start: running.rotator.view_start(),
            pending_view_change: running.rotator.pending_view_change(),
            leader_index: running.state.leader_index(),
            b_vote: running.hotstuff.b_vote().height(),
            b_lock: running.hotstuff.b_lock().height(),
            b_exec: running.hotstuff.b_exec().height(),
            b_leaf: running.hotstuff.b_leaf().height(),
            qc_high: running.hotstuff.qc_high_height(),
        }
    }

    /// Look up a block in the in-memory pools.
    pub fn block(&self, hash: &Hash) -> Option<Arc<Block>> {
        let guard = self.running.lock();
        guard.as_ref().and_then(|running| running.state.block(hash))
    }
}
