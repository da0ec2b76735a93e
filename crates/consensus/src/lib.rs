//! # Quill Consensus
//!
//! The consensus core of the Quill permissioned blockchain: a chained
//! HotStuff variant with a worker/voter role split and a batch
//! pre-aggregation layer that decouples transaction dissemination from
//! block ordering.
//!
//! ## Data flow
//!
//! ```text
//! workers ── Batch ──▶ voters ── BatchVote ──▶ originating worker
//!                                                    │ seals BatchQC
//!                                                    ▼
//!                block leader ◀── certified batch headers
//!                     │ bundles headers, references qc_high
//!                     ▼
//!                  Block ──▶ voters ── Vote ──▶ leader ──▶ QC
//!                     │
//!                     ▼
//!        two-/three-chain rule commits ancestors
//! ```
//!
//! ## Structure
//!
//! - [`engine`] - the pure HotStuff state machine (`b_vote`, `b_lock`,
//!   `b_exec`, `b_leaf`, `qc_high`; safety, liveness and chain-commit
//!   rules)
//! - [`driver`] - leaf construction, certificate assembly, voting and
//!   commit persistence
//! - [`state`] - the in-memory block/QC pools under the single update
//!   mutex
//! - [`pacemaker`] - the propose and batch loops
//! - [`rotator`] - view-change detection and new-view handling
//! - [`voter_state`] / [`leader_state`] - the batch-layer accumulators
//! - [`validator`] - inbound message dispatch
//! - [`resources`] - the traits the node implements around the core
//!
//! All state-machine transitions are serialized by one update mutex;
//! everything else is message passing over buffered channels.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

mod benchmark;
mod consensus;
mod genesis;

pub mod config;
pub mod driver;
pub mod engine;
pub mod leader_state;
pub mod pacemaker;
pub mod resources;
pub mod rotator;
pub mod state;
pub mod status;
pub mod validator;
pub mod voter_state;

pub use benchmark::Benchmark;
pub use config::{Config, Phases};
pub use consensus::Consensus;
pub use driver::HsDriver;
pub use engine::{Driver, Hotstuff};
pub use leader_state::LeaderState;
pub use resources::{
    CommitData, Execution, MsgService, Resources, Storage, TxPool, TxPoolStatus, TxStatus,
};
pub use state::ChainState;
pub use status::Status;
pub use voter_state::VoterState;

use quill_types::TypesError;

/// Errors crossing the consensus core's boundaries.
#[derive(Debug, thiserror::Error)]
pub enum ConsensusError {
    /// An inbound entity failed validation.
    #[error("invalid {kind}: {source}")]
    InvalidMessage {
        /// What kind of entity failed.
        kind: &'static str,
        /// The underlying validation error.
        #[source]
        source: TypesError,
    },

    /// A storage operation failed.
    #[error("storage: {0}")]
    Storage(String),

    /// A transport operation failed.
    #[error("transport: {0}")]
    Transport(String),

    /// A transaction-pool operation failed.
    #[error("tx pool: {0}")]
    TxPool(String),

    /// A referenced block could not be resolved.
    #[error("unknown block {0}")]
    UnknownBlock(String),
}

/// Result alias for this crate.
pub type Result<T> = std::result::Result<T, ConsensusError>;
