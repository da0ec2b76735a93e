//! Validator set and role split.
//!
//! Quill is permissioned: the validator set is fixed at construction
//! and every validator holds one or both of two roles. **Workers**
//! create batches and lead block proposals; **voters** sign batches and
//! blocks, and the voter set's quorum seals certificates.

use quill_crypto::PublicKey;
use std::collections::{HashMap, HashSet};

/// The 2f+1 quorum threshold over a set of `total` participants.
pub fn majority_count(total: usize) -> usize {
    total * 2 / 3 + 1
}

/// Read-only view of the validator set.
///
/// The consensus core never mutates membership; reconfiguration is out
/// of scope and a store is expected to answer these queries from an
/// immutable snapshot.
pub trait ValidatorStore: Send + Sync {
    /// Number of validators holding the voter role.
    fn voter_count(&self) -> usize;

    /// Number of validators holding the worker role.
    fn worker_count(&self) -> usize;

    /// Total number of distinct validators.
    fn validator_count(&self) -> usize;

    /// 2f+1 among all validators; the block-QC threshold.
    fn majority_validator_count(&self) -> usize {
        majority_count(self.validator_count())
    }

    /// 2f+1 among voters; the batch-QC threshold.
    fn majority_voter_count(&self) -> usize {
        majority_count(self.voter_count())
    }

    /// Whether `key` holds the voter role.
    fn is_voter(&self, key: &PublicKey) -> bool;

    /// Whether `key` holds the worker role.
    fn is_worker(&self, key: &PublicKey) -> bool;

    /// The worker at `index` in the stable worker ordering.
    fn worker(&self, index: usize) -> Option<PublicKey>;

    /// Stable ordinal of `key` in `[0, worker_count)`.
    fn worker_index(&self, key: &PublicKey) -> Option<usize>;
}

/// Fixed-set [`ValidatorStore`] built from explicit role lists.
#[derive(Debug, Clone)]
pub struct ValidatorRegistry {
    voters: HashSet<PublicKey>,
    workers: Vec<PublicKey>,
    worker_indices: HashMap<PublicKey, usize>,
    validator_count: usize,
}

impl ValidatorRegistry {
    /// Create a registry from the voter and worker lists.
    ///
    /// Worker order is significant: the leader index rotates through
    /// `workers` in the order given, which must therefore be identical
    /// on every replica.
    pub fn new(voters: Vec<PublicKey>, workers: Vec<PublicKey>) -> Self {
        let worker_indices = workers
            .iter()
            .enumerate()
            .map(|(i, key)| (*key, i))
            .collect();
        let voters: HashSet<PublicKey> = voters.into_iter().collect();
        let validator_count = {
            let mut all = voters.clone();
            all.extend(workers.iter().copied());
            all.len()
        };
        Self {
            voters,
            workers,
            worker_indices,
            validator_count,
        }
    }
}

impl ValidatorStore for ValidatorRegistry {
    fn voter_count(&self) -> usize {
        self.voters.len()
    }

    fn worker_count(&self) -> usize {
        self.workers.len()
    }

    fn validator_count(&self) -> usize {
        self.validator_count
    }

    fn is_voter(&self, key: &PublicKey) -> bool {
        self.voters.contains(key)
    }

    fn is_worker(&self, key: &PublicKey) -> bool {
        self.worker_indices.contains_key(key)
    }

    fn worker(&self, index: usize) -> Option<PublicKey> {
        self.workers.get(index).copied()
    }

    fn worker_index(&self, key: &PublicKey) -> Option<usize> {
        self.worker_indices.get(key).copied()
    }
}
