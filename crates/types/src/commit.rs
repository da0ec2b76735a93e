//! Execution results persisted alongside a committed block.

use quill_crypto::Hash;

/// Summary the execution engine produces for one committed block.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockCommit {
    block_hash: Hash,
    old_block_txs: Vec<Hash>,
    merkle_root: Hash,
    elapsed_exec_ms: f64,
    elapsed_merkle_ms: f64,
}

impl BlockCommit {
    /// Create a commit summary for the block with `block_hash`.
    pub fn new(block_hash: Hash, merkle_root: Hash) -> Self {
        Self {
            block_hash,
            old_block_txs: Vec::new(),
            merkle_root,
            elapsed_exec_ms: 0.0,
            elapsed_merkle_ms: 0.0,
        }
    }

    /// Record transaction hashes that were already committed by an
    /// earlier block and therefore skipped during execution.
    pub fn set_old_block_txs(&mut self, hashes: Vec<Hash>) {
        self.old_block_txs = hashes;
    }

    /// Record execution and merkle-update timings, in milliseconds.
    pub fn set_elapsed(&mut self, exec_ms: f64, merkle_ms: f64) {
        self.elapsed_exec_ms = exec_ms;
        self.elapsed_merkle_ms = merkle_ms;
    }

    /// The committed block's hash.
    pub fn block_hash(&self) -> &Hash {
        &self.block_hash
    }

    /// Transactions skipped because an earlier block committed them.
    pub fn old_block_txs(&self) -> &[Hash] {
        &self.old_block_txs
    }

    /// State root after executing the block.
    pub fn merkle_root(&self) -> &Hash {
        &self.merkle_root
    }

    /// Execution wall time in milliseconds.
    pub fn elapsed_exec_ms(&self) -> f64 {
        self.elapsed_exec_ms
    }

    /// Merkle-update wall time in milliseconds.
    pub fn elapsed_merkle_ms(&self) -> f64 {
        self.elapsed_merkle_ms
    }
}

/// Per-transaction commit record.
#[derive(Debug, Clone, PartialEq)]
pub struct TxCommit {
    tx_hash: Hash,
    block_hash: Hash,
    block_height: u64,
    elapsed_ms: f64,
}

impl TxCommit {
    /// Create a commit record for one executed transaction.
    pub fn new(tx_hash: Hash, block_hash: Hash, block_height: u64, elapsed_ms: f64) -> Self {
        Self {
            tx_hash,
            block_hash,
            block_height,
            elapsed_ms,
        }
    }

    /// The executed transaction's hash.
    pub fn tx_hash(&self) -> &Hash {
        &self.tx_hash
    }

    /// The containing block's hash.
    pub fn block_hash(&self) -> &Hash {
        &self.block_hash
    }

    /// The containing block's height.
    pub fn block_height(&self) -> u64 {
        self.block_height
    }

    /// Execution wall time in milliseconds.
    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed_ms
    }
}
