//! Transaction batches and their certificates.
//!
//! Batches decouple transaction dissemination from block ordering: a
//! worker bundles queued transactions into a [`Batch`] and broadcasts
//! it, voters answer with a [`BatchVote`], and the worker seals the
//! resulting signatures into a [`BatchQuorumCert`]. Only the compact
//! [`BatchHeader`] (hashes plus certificate) ends up inside a block.

use quill_crypto::{Hash, Hasher, PublicKey, Signature, Signer};
use rlp::{Decodable, DecoderError, Encodable, Rlp, RlpStream};

use crate::codec;
use crate::transaction::tx_hashes;
use crate::{Result, Transaction, TypesError, ValidatorStore};

fn batch_digest(proposer: &PublicKey, timestamp: i64, hashes: &[Hash]) -> Hash {
    let mut hasher = Hasher::new();
    hasher.update(proposer.as_bytes());
    hasher.update_i64(timestamp);
    for hash in hashes {
        hasher.update(hash);
    }
    hasher.finalize()
}

/// A worker-signed bundle of transactions.
///
/// A batch is broadcast without a certificate; once the originating
/// worker has aggregated a voter majority it attaches the sealed
/// [`BatchQuorumCert`] and forwards the certified batch to the block
/// leader. The certificate is excluded from the batch digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    transactions: Vec<Transaction>,
    timestamp: i64,
    proposer: PublicKey,
    hash: Hash,
    signature: Signature,
    batch_qc: Option<BatchQuorumCert>,
}

impl Batch {
    /// Bundle and sign `transactions`. The digest covers the proposer,
    /// the timestamp and the transaction hashes, in that order.
    pub fn new(transactions: Vec<Transaction>, timestamp: i64, signer: &dyn Signer) -> Self {
        let proposer = signer.public_key();
        let hash = batch_digest(&proposer, timestamp, &tx_hashes(&transactions));
        let signature = signer.sign(&hash);
        Self {
            transactions,
            timestamp,
            proposer,
            hash,
            signature,
            batch_qc: None,
        }
    }

    /// The bundled transactions.
    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    /// Creation time, Unix nanoseconds.
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// The worker that created the batch.
    pub fn proposer(&self) -> &PublicKey {
        &self.proposer
    }

    /// Content address.
    pub fn hash(&self) -> &Hash {
        &self.hash
    }

    /// The sealed certificate, if the batch has been certified.
    pub fn batch_qc(&self) -> Option<&BatchQuorumCert> {
        self.batch_qc.as_ref()
    }

    /// Attach the sealed certificate. Set exactly once by the
    /// originating worker after aggregating a voter majority.
    pub fn with_batch_qc(mut self, qc: BatchQuorumCert) -> Self {
        self.batch_qc = Some(qc);
        self
    }

    /// The header for this batch, carrying the certificate if sealed.
    pub fn header(&self) -> BatchHeader {
        BatchHeader {
            hash: self.hash,
            proposer: self.proposer,
            timestamp: self.timestamp,
            tx_hashes: tx_hashes(&self.transactions),
            batch_qc: self.batch_qc.clone(),
        }
    }

    /// A batch is valid iff its proposer is a worker, the recomputed
    /// digest matches, and the signature verifies over it.
    pub fn validate(&self, store: &dyn ValidatorStore) -> Result<()> {
        if !store.is_worker(&self.proposer) {
            return Err(TypesError::InvalidSigner("worker"));
        }
        let expect = batch_digest(&self.proposer, self.timestamp, &tx_hashes(&self.transactions));
        if expect != self.hash {
            return Err(TypesError::InvalidHash("batch"));
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

impl Encodable for Batch {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(6);
        s.begin_list(self.transactions.len());
        for tx in &self.transactions {
            tx.rlp_append(s);
        }
        s.append(&(self.timestamp as u64));
        s.append(&self.proposer.as_bytes().to_vec());
        codec::append_hash(s, &self.hash);
        codec::append_signature(s, &self.signature);
        match &self.batch_qc {
            Some(qc) => {
                qc.rlp_append(s);
            }
            None => {
                s.append_empty_data();
            }
        }
    }
}

impl Decodable for Batch {
    fn decode(rlp: &Rlp<'_>) -> std::result::Result<Self, DecoderError> {
        if rlp.item_count()? != 6 {
            return Err(DecoderError::RlpIncorrectListLen);
        }
        let tx_rlp = rlp.at(0)?;
        let mut transactions = Vec::with_capacity(tx_rlp.item_count()?);
        for item in tx_rlp.iter() {
            transactions.push(<Transaction as Decodable>::decode(&item)?);
        }
        let timestamp: u64 = rlp.val_at(1)?;
        let proposer_bytes: Vec<u8> = rlp.val_at(2)?;
        let proposer = PublicKey::from_bytes(&proposer_bytes)
            .map_err(|_| DecoderError::Custom("invalid proposer key"))?;
        let qc_rlp = rlp.at(5)?;
        let batch_qc = if qc_rlp.is_empty() {
            None
        } else {
            Some(<BatchQuorumCert as Decodable>::decode(&qc_rlp)?)
        };
        Ok(Self {
            transactions,
            timestamp: timestamp as i64,
            proposer,
            hash: codec::read_hash(rlp, 3)?,
            signature: codec::read_signature(&rlp.at(4)?)?,
            batch_qc,
        })
    }
}

/// The committed form of a batch: hashes only, plus the certificate
/// sealed from voter signatures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchHeader {
    hash: Hash,
    proposer: PublicKey,
    timestamp: i64,
    tx_hashes: Vec<Hash>,
    batch_qc: Option<BatchQuorumCert>,
}

impl BatchHeader {
    /// The batch content address.
    pub fn hash(&self) -> &Hash {
        &self.hash
    }

    /// The worker that created the batch.
    pub fn proposer(&self) -> &PublicKey {
        &self.proposer
    }

    /// Batch creation time, Unix nanoseconds.
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// Hashes of the batched transactions, in batch order.
    pub fn tx_hashes(&self) -> &[Hash] {
        &self.tx_hashes
    }

    /// The sealed certificate, once a voter majority signed the batch.
    pub fn batch_qc(&self) -> Option<&BatchQuorumCert> {
        self.batch_qc.as_ref()
    }

    /// Attach the sealed certificate. Set exactly once by the worker
    /// that aggregated the batch votes.
    pub fn with_batch_qc(mut self, qc: BatchQuorumCert) -> Self {
        self.batch_qc = Some(qc);
        self
    }

    /// A header is valid iff its digest matches its fields, its
    /// proposer is a worker, and its certificate is present, references
    /// this batch and validates against the voter majority.
    pub fn validate(&self, store: &dyn ValidatorStore) -> Result<()> {
        if !store.is_worker(&self.proposer) {
            return Err(TypesError::InvalidSigner("worker"));
        }
        let expect = batch_digest(&self.proposer, self.timestamp, &self.tx_hashes);
        if expect != self.hash {
            return Err(TypesError::InvalidHash("batch header"));
        }
        let Some(qc) = &self.batch_qc else {
            return Err(TypesError::Nil("batch quorum cert"));
        };
        if *qc.batch_hash() != self.hash {
            return Err(TypesError::InvalidHash("batch quorum cert"));
        }
        qc.validate(store)
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

impl Encodable for BatchHeader {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(5);
        codec::append_hash(s, &self.hash);
        s.append(&self.proposer.as_bytes().to_vec());
        s.append(&(self.timestamp as u64));
        codec::append_hash_list(s, &self.tx_hashes);
        match &self.batch_qc {
            Some(qc) => {
                qc.rlp_append(s);
            }
            None => {
                s.append_empty_data();
            }
        }
    }
}

impl Decodable for BatchHeader {
    fn decode(rlp: &Rlp<'_>) -> std::result::Result<Self, DecoderError> {
        if rlp.item_count()? != 5 {
            return Err(DecoderError::RlpIncorrectListLen);
        }
        let proposer_bytes: Vec<u8> = rlp.val_at(1)?;
        let proposer = PublicKey::from_bytes(&proposer_bytes)
            .map_err(|_| DecoderError::Custom("invalid proposer key"))?;
        let timestamp: u64 = rlp.val_at(2)?;
        let qc_rlp = rlp.at(4)?;
        let batch_qc = if qc_rlp.is_empty() {
            None
        } else {
            Some(<BatchQuorumCert as Decodable>::decode(&qc_rlp)?)
        };
        Ok(Self {
            hash: codec::read_hash(rlp, 0)?,
            proposer,
            timestamp: timestamp as i64,
            tx_hashes: codec::read_hash_list(&rlp.at(3)?)?,
            batch_qc,
        })
    }
}

/// A certificate that a voter majority signed one batch hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchQuorumCert {
    batch_hash: Hash,
    signatures: Vec<Signature>,
}

impl BatchQuorumCert {
    /// Build a certificate from voter signatures over `batch_hash`,
    /// retaining them in the order given.
    ///
    /// The batch-vote accumulator dedupes by voter identity;
    /// [`BatchQuorumCert::validate`] is the authority on sufficiency.
    pub fn build(batch_hash: Hash, signatures: &[Signature]) -> Self {
        Self {
            batch_hash,
            signatures: signatures.to_vec(),
        }
    }

    /// The certified batch hash.
    pub fn batch_hash(&self) -> &Hash {
        &self.batch_hash
    }

    /// The aggregated signatures.
    pub fn signatures(&self) -> &[Signature] {
        &self.signatures
    }

    /// Valid iff it carries at least `majority_voter_count` signatures,
    /// all signers are distinct voters, and every signature verifies
    /// over the batch hash.
    pub fn validate(&self, store: &dyn ValidatorStore) -> Result<()> {
        let need = store.majority_voter_count();
        if self.signatures.len() < need {
            return Err(TypesError::NotEnoughSignatures {
                got: self.signatures.len(),
                need,
            });
        }
        let mut seen = std::collections::HashSet::new();
        for sig in &self.signatures {
            if !seen.insert(*sig.public_key()) {
                return Err(TypesError::DuplicateSigner);
            }
            if !store.is_voter(sig.public_key()) {
                return Err(TypesError::InvalidSigner("voter"));
            }
            if !sig.verify(&self.batch_hash) {
                return Err(TypesError::InvalidSignature);
            }
        }
        Ok(())
    }
}

impl Encodable for BatchQuorumCert {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(2);
        codec::append_hash(s, &self.batch_hash);
        codec::append_signature_list(s, &self.signatures);
    }
}

impl Decodable for BatchQuorumCert {
    fn decode(rlp: &Rlp<'_>) -> std::result::Result<Self, DecoderError> {
        if rlp.item_count()? != 2 {
            return Err(DecoderError::RlpIncorrectListLen);
        }
        Ok(Self {
            batch_hash: codec::read_hash(rlp, 0)?,
            signatures: codec::read_signature_list(&rlp.at(1)?)?,
        })
    }
}

/// One voter's signatures over a set of observed batches, unicast back
/// to the worker that proposed them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchVote {
    batch_hashes: Vec<Hash>,
    signatures: Vec<Signature>,
}

impl BatchVote {
    /// Sign each of `batch_hashes`.
    pub fn new(batch_hashes: Vec<Hash>, signer: &dyn Signer) -> Self {
        let signatures = batch_hashes.iter().map(|hash| signer.sign(hash)).collect();
        Self {
            batch_hashes,
            signatures,
        }
    }

    /// The signed batch hashes.
    pub fn batch_hashes(&self) -> &[Hash] {
        &self.batch_hashes
    }

    /// One signature per batch hash, same order.
    pub fn signatures(&self) -> &[Signature] {
        &self.signatures
    }

    /// The voting replica.
    ///
    /// Only meaningful after [`BatchVote::validate`], which pins every
    /// signature to one signer.
    pub fn voter(&self) -> Option<&PublicKey> {
        self.signatures.first().map(|sig| sig.public_key())
    }

    /// Valid iff non-empty, one signature per hash, all signatures by
    /// the same voter, and each verifies over its batch hash.
    pub fn validate(&self, store: &dyn ValidatorStore) -> Result<()> {
        if self.batch_hashes.is_empty() || self.batch_hashes.len() != self.signatures.len() {
            return Err(TypesError::Malformed("batch vote"));
        }
        let voter = *self.signatures[0].public_key();
        if !store.is_voter(&voter) {
            return Err(TypesError::InvalidSigner("voter"));
        }
        for (hash, sig) in self.batch_hashes.iter().zip(&self.signatures) {
            if *sig.public_key() != voter {
                return Err(TypesError::Malformed("batch vote"));
            }
            if !sig.verify(hash) {
                return Err(TypesError::InvalidSignature);
            }
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

impl Encodable for BatchVote {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(2);
        codec::append_hash_list(s, &self.batch_hashes);
        codec::append_signature_list(s, &self.signatures);
    }
}

impl Decodable for BatchVote {
    fn decode(rlp: &Rlp<'_>) -> std::result::Result<Self, DecoderError> {
        if rlp.item_count()? != 2 {
            return Err(DecoderError::RlpIncorrectListLen);
        }
        Ok(Self {
            batch_hashes: codec::read_hash_list(&rlp.at(0)?)?,
            signatures: codec::read_signature_list(&rlp.at(1)?)?,
        })
    }
}
