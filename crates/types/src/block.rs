//! Blocks.
//!
//! A block bundles ready batch headers under a quorum certificate for
//! an ancestor, forming the chained-HotStuff ordering layer. The block
//! digest covers every consensus-relevant field; `hash` and `signature`
//! are set exactly once, by [`BlockBuilder::sign`].

use quill_crypto::{Hash, Hasher, PublicKey, Signature, Signer};
use rlp::{Decodable, DecoderError, Encodable, Rlp, RlpStream};

use crate::codec;
use crate::{BatchHeader, QuorumCert, Result, TypesError, ValidatorStore, Vote};

/// A proposed or committed block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    height: u64,
    parent_hash: Hash,
    proposer: PublicKey,
    quorum_cert: Option<QuorumCert>,
    exec_height: u64,
    merkle_root: Hash,
    timestamp: i64,
    batch_headers: Vec<BatchHeader>,
    transactions: Vec<Hash>,
    hash: Hash,
    signature: Signature,
}

impl Block {
    /// Start building a block.
    pub fn builder() -> BlockBuilder {
        BlockBuilder::default()
    }

    fn digest(
        height: u64,
        parent_hash: &Hash,
        proposer: &PublicKey,
        quorum_cert: Option<&QuorumCert>,
        exec_height: u64,
        merkle_root: &Hash,
        timestamp: i64,
        batch_headers: &[BatchHeader],
    ) -> Hash {
        let mut hasher = Hasher::new();
        hasher.update_u64(height);
        hasher.update(parent_hash);
        hasher.update(proposer.as_bytes());
        if let Some(qc) = quorum_cert {
            hasher.update(qc.block_hash());
        }
        hasher.update_u64(exec_height);
        hasher.update(merkle_root);
        hasher.update_i64(timestamp);
        for header in batch_headers {
            hasher.update(header.hash());
        }
        hasher.finalize()
    }

    /// Block height; genesis is height 0.
    pub fn height(&self) -> u64 {
        self.height
    }

    /// Hash of the parent block; zero for genesis.
    pub fn parent_hash(&self) -> &Hash {
        &self.parent_hash
    }

    /// The worker that proposed this block.
    pub fn proposer(&self) -> &PublicKey {
        &self.proposer
    }

    /// The justification certificate; `None` only for genesis.
    pub fn quorum_cert(&self) -> Option<&QuorumCert> {
        self.quorum_cert.as_ref()
    }

    /// Height of the committed prefix observed at proposal time.
    pub fn exec_height(&self) -> u64 {
        self.exec_height
    }

    /// State-store merkle root observed at proposal time.
    pub fn merkle_root(&self) -> &Hash {
        &self.merkle_root
    }

    /// Proposal time, Unix nanoseconds.
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// The certified batch headers bundled into this block.
    pub fn batch_headers(&self) -> &[BatchHeader] {
        &self.batch_headers
    }

    /// The deduplicated transaction hashes this block commits.
    pub fn transactions(&self) -> &[Hash] {
        &self.transactions
    }

    /// Content address.
    pub fn hash(&self) -> &Hash {
        &self.hash
    }

    /// Whether this is the genesis block.
    pub fn is_genesis(&self) -> bool {
        self.height == 0
    }

    /// Create this replica's vote for the block.
    pub fn vote(&self, signer: &dyn Signer) -> Vote {
        Vote::new(self.hash, signer)
    }

    /// The proposer's own vote, reusing the block signature so the
    /// leader never signs the same hash twice.
    pub fn proposer_vote(&self) -> Vote {
        Vote::from_signature(self.hash, self.signature.clone())
    }

    /// Validate the block.
    ///
    /// Genesis (height 0) skips the certificate and batch-header rules;
    /// every block must carry a matching digest, a worker proposer and
    /// a verifying proposer signature.
    pub fn validate(&self, store: &dyn ValidatorStore) -> Result<()> {
        if !self.is_genesis() {
            let Some(qc) = &self.quorum_cert else {
                return Err(TypesError::Nil("quorum cert"));
            };
            qc.validate(store)?;
            for header in &self.batch_headers {
                header.validate(store)?;
            }
        }
        let expect = Self::digest(
            self.height,
            &self.parent_hash,
            &self.proposer,
            self.quorum_cert.as_ref(),
            self.exec_height,
            &self.merkle_root,
            self.timestamp,
            &self.batch_headers,
        );
        if expect != self.hash {
            return Err(TypesError::InvalidHash("block"));
        }
        if !store.is_worker(&self.proposer) {
            return Err(TypesError::InvalidSigner("worker"));
        }
        if self.signature.public_key() != &self.proposer {
            return Err(TypesError::InvalidSigner("worker"));
        }
        if !self.signature.verify(&self.hash) {
            return Err(TypesError::InvalidSignature);
        }
        Ok(())
    }

    /// Wire encoding.
    pub fn encode(&self) -> Vec<u8> {
        rlp::encode(self).to_vec()
    }

    /// Decode from the wire.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(rlp::decode(bytes)?)
    }
}

impl Encodable for Block {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(11);
        s.append(&self.height);
        codec::append_hash(s, &self.parent_hash);
        s.append(&self.proposer.as_bytes().to_vec());
        match &self.quorum_cert {
            Some(qc) => {
                qc.rlp_append(s);
            }
            None => {
                s.append_empty_data();
            }
        }
        s.append(&self.exec_height);
        codec::append_hash(s, &self.merkle_root);
        s.append(&(self.timestamp as u64));
        s.begin_list(self.batch_headers.len());
        for header in &self.batch_headers {
            header.rlp_append(s);
        }
        codec::append_hash_list(s, &self.transactions);
        codec::append_hash(s, &self.hash);
        codec::append_signature(s, &self.signature);
    }
}

impl Decodable for Block {
    fn decode(rlp: &Rlp<'_>) -> std::result::Result<Self, DecoderError> {
        if rlp.item_count()? != 11 {
            return Err(DecoderError::RlpIncorrectListLen);
        }
        let proposer_bytes: Vec<u8> = rlp.val_at(2)?;
        let proposer = PublicKey::from_bytes(&proposer_bytes)
            .map_err(|_| DecoderError::Custom("invalid proposer key"))?;
        let qc_rlp = rlp.at(3)?;
        let quorum_cert = if qc_rlp.is_empty() {
            None
        } else {
            Some(<QuorumCert as Decodable>::decode(&qc_rlp)?)
        };
        let headers_rlp = rlp.at(7)?;
        let mut batch_headers = Vec::with_capacity(headers_rlp.item_count()?);
        for item in headers_rlp.iter() {
            batch_headers.push(<BatchHeader as Decodable>::decode(&item)?);
        }
        let timestamp: u64 = rlp.val_at(6)?;
        Ok(Self {
            height: rlp.val_at(0)?,
            parent_hash: codec::read_hash(rlp, 1)?,
            proposer,
            quorum_cert,
            exec_height: rlp.val_at(4)?,
            merkle_root: codec::read_hash(rlp, 5)?,
            timestamp: timestamp as i64,
            batch_headers,
            transactions: codec::read_hash_list(&rlp.at(8)?)?,
            hash: codec::read_hash(rlp, 9)?,
            signature: codec::read_signature(&rlp.at(10)?)?,
        })
    }
}

impl std::fmt::Display for Block {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Block #{} ({}, {} batches, {} txs)",
            self.height,
            hex::encode(&self.hash[..8]),
            self.batch_headers.len(),
            self.transactions.len()
        )
    }
}

/// Chained builder for [`Block`]; finalized by [`BlockBuilder::sign`].
#[derive(Debug, Default)]
pub struct BlockBuilder {
    height: u64,
    parent_hash: Hash,
    quorum_cert: Option<QuorumCert>,
    exec_height: u64,
    merkle_root: Hash,
    timestamp: i64,
    batch_headers: Vec<BatchHeader>,
    transactions: Vec<Hash>,
}

impl BlockBuilder {
    /// Set the block height.
    pub fn height(mut self, height: u64) -> Self {
        self.height = height;
        self
    }

    /// Set the parent block hash.
    pub fn parent_hash(mut self, parent_hash: Hash) -> Self {
        self.parent_hash = parent_hash;
        self
    }

    /// Set the justification certificate.
    pub fn quorum_cert(mut self, qc: QuorumCert) -> Self {
        self.quorum_cert = Some(qc);
        self
    }

    /// Set the committed-prefix height observed at proposal time.
    pub fn exec_height(mut self, exec_height: u64) -> Self {
        self.exec_height = exec_height;
        self
    }

    /// Set the state merkle root observed at proposal time.
    pub fn merkle_root(mut self, merkle_root: Hash) -> Self {
        self.merkle_root = merkle_root;
        self
    }

    /// Set the proposal timestamp, Unix nanoseconds.
    pub fn timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Set the certified batch headers.
    pub fn batch_headers(mut self, headers: Vec<BatchHeader>) -> Self {
        self.batch_headers = headers;
        self
    }

    /// Set the deduplicated transaction hash list.
    pub fn transactions(mut self, transactions: Vec<Hash>) -> Self {
        self.transactions = transactions;
        self
    }

    /// Compute the digest, sign it and produce the immutable block.
    pub fn sign(self, signer: &dyn Signer) -> Block {
        let proposer = signer.public_key();
        let hash = Block::digest(
            self.height,
            &self.parent_hash,
            &proposer,
            self.quorum_cert.as_ref(),
            self.exec_height,
            &self.merkle_root,
            self.timestamp,
            &self.batch_headers,
        );
        let signature = signer.sign(&hash);
        Block {
            height: self.height,
            parent_hash: self.parent_hash,
            proposer,
            quorum_cert: self.quorum_cert,
            exec_height: self.exec_height,
            merkle_root: self.merkle_root,
            timestamp: self.timestamp,
            batch_headers: self.batch_headers,
            transactions: self.transactions,
            hash,
            signature,
        }
    }
}
