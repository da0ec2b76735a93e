//! # Quill Types
//!
//! The wire data model of the Quill consensus core:
//!
//! - [`Transaction`] - client payload, addressed by hash
//! - [`Batch`] / [`BatchHeader`] / [`BatchQuorumCert`] / [`BatchVote`] -
//!   the worker-side transaction dissemination unit, its committed
//!   descriptor, its aggregated certificate, and the voter reply
//! - [`Block`] / [`Vote`] / [`QuorumCert`] - the ordering layer
//! - [`BlockCommit`] / [`TxCommit`] - execution results persisted at
//!   commit time
//! - [`ValidatorStore`] / [`ValidatorRegistry`] - the fixed validator
//!   set and its worker/voter role split
//!
//! Every entity has a deterministic SHA3-256 digest over a canonical
//! field concatenation and an RLP wire encoding with stable field
//! ordering. The digest preimages are part of the wire contract: they
//! must be bit-identical across implementations, so they are computed
//! over explicit field bytes rather than over the RLP encoding.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod batch;
pub mod block;
pub mod commit;
pub mod quorum_cert;
pub mod transaction;
pub mod validator;
pub mod vote;

mod codec;

pub use batch::{Batch, BatchHeader, BatchQuorumCert, BatchVote};
pub use block::{Block, BlockBuilder};
pub use commit::{BlockCommit, TxCommit};
pub use quorum_cert::QuorumCert;
pub use transaction::Transaction;
pub use validator::{majority_count, ValidatorRegistry, ValidatorStore};
pub use vote::Vote;

pub use quill_crypto::Hash;

/// Errors raised while decoding or validating wire entities.
#[derive(Debug, thiserror::Error)]
pub enum TypesError {
    /// A required sub-entity is missing (e.g. a block without a QC).
    #[error("nil {0}")]
    Nil(&'static str),

    /// A recomputed digest does not match the carried hash.
    #[error("invalid {0} hash")]
    InvalidHash(&'static str),

    /// A signature failed verification.
    #[error("invalid signature")]
    InvalidSignature,

    /// The signer does not hold the role the entity requires.
    #[error("signer is not a {0}")]
    InvalidSigner(&'static str),

    /// A certificate carries fewer signatures than its quorum demands.
    #[error("not enough signatures: {got} of {need}")]
    NotEnoughSignatures {
        /// Signatures present
        got: usize,
        /// Signatures required
        need: usize,
    },

    /// A certificate carries two signatures from the same key.
    #[error("duplicate signer in certificate")]
    DuplicateSigner,

    /// Structurally malformed entity.
    #[error("malformed {0}")]
    Malformed(&'static str),

    /// Wire decoding failed.
    #[error("decode: {0}")]
    Decode(#[from] rlp::DecoderError),
}

/// Result alias for this crate.
pub type Result<T> = std::result::Result<T, TypesError>;
