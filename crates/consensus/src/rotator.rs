//! View change.
//!
//! The rotator watches QC progress. A leader that fails to certify a
//! new block within `leader_timeout` is voted out locally: the leader
//! index advances and a new-view message carrying this replica's
//! QC-high is broadcast so the incoming leader can adopt the best
//! justification before its first proposal. Even a healthy leader is
//! rotated once `view_width` elapses.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use quill_types::QuorumCert;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::benchmark::now_unix_nano;
use crate::config::Config;
use crate::engine::Hotstuff;
use crate::resources::Resources;
use crate::state::ChainState;

pub(crate) struct Rotator {
    pub(crate) resources: Resources,
    pub(crate) config: Config,
    pub(crate) state: Arc<ChainState>,
    pub(crate) hotstuff: Arc<Hotstuff>,

    view_start: AtomicI64,
    pending_view_change: AtomicBool,
    last_qc_height: AtomicU64,
}

impl Rotator {
    pub(crate) fn new(
        resources: Resources,
        config: Config,
        state: Arc<ChainState>,
        hotstuff: Arc<Hotstuff>,
    ) -> Self {
        Self {
            resources,
            config,
            state,
            hotstuff,
            view_start: AtomicI64::new(now_unix_nano()),
            pending_view_change: AtomicBool::new(false),
            last_qc_height: AtomicU64::new(0),
        }
    }

    /// Start timestamp of the current view, Unix nanoseconds.
    pub(crate) fn view_start(&self) -> i64 {
        self.view_start.load(Ordering::Acquire)
    }

    /// True from view timeout until the incoming leader's first QC.
    pub(crate) fn pending_view_change(&self) -> bool {
        self.pending_view_change.load(Ordering::Acquire)
    }

    /// Tick loop; also approves pending view changes as soon as the
    /// incoming leader certifies its first block.
    pub(crate) async fn run(self: Arc<Self>, mut stop: watch::Receiver<bool>) {
        self.view_start.store(now_unix_nano(), Ordering::Release);
        self.last_qc_height
            .store(self.hotstuff.qc_high_height(), Ordering::Release);

        let mut qc_events = self.hotstuff.subscribe_qc_high();
        let mut tick = tokio::time::interval(self.config.leader_timeout);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tick.tick().await;

        loop {
            tokio::select! {
                _ = stop.changed() => return,
                _ = tick.tick() => self.on_tick(),
                _ = qc_events.recv() => self.on_qc_high(),
            }
        }
    }

    fn on_tick(&self) {
        let qc_height = self.hotstuff.qc_high_height();
        let advanced = qc_height > self.last_qc_height.swap(qc_height, Ordering::AcqRel);
        let elapsed = now_unix_nano().saturating_sub(self.view_start());

        if self.pending_view_change() {
            // the incoming leader produced nothing for a full timeout
            self.change_view();
        } else if !advanced {
            // leader silent
            self.change_view();
        } else if elapsed >= self.config.view_width.as_nanos() as i64 {
            // planned rotation under normal progress
            self.change_view();
        }
    }

    /// Approve a pending view change once the new leader's QC arrives.
    fn on_qc_high(&self) {
        if !self.pending_view_change() {
            return;
        }
        let qc = self.hotstuff.qc_high();
        let Some(block) = self.state.block(qc.block_hash()) else {
            return;
        };
        if self.state.is_leader(block.proposer()) {
            self.pending_view_change.store(false, Ordering::Release);
            self.view_start.store(now_unix_nano(), Ordering::Release);
            info!(
                leader_index = self.state.leader_index(),
                "approved view change"
            );
        }
    }

    fn change_view(&self) {
        let worker_count = self.resources.validators.worker_count();
        if worker_count == 0 {
            return;
        }
        let next = (self.state.leader_index() + 1) % worker_count;
        self.state.set_leader_index(next);
        self.pending_view_change.store(true, Ordering::Release);
        self.view_start.store(now_unix_nano(), Ordering::Release);

        let qc = self.hotstuff.qc_high();
        if let Err(err) = self.resources.msg_svc.broadcast_new_view(qc) {
            warn!(%err, "failed to hand new-view to transport");
        }
        info!(leader_index = next, "view change");
    }

    /// Adopt a justification forwarded by an outgoing view.
    pub(crate) async fn on_receive_new_view(&self, qc: QuorumCert) {
        let _update = self.state.update_mutex.lock().await;
        self.hotstuff.update_qc_high(qc);
    }
}
