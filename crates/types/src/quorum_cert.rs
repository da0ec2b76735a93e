//! Block quorum certificates.

use quill_crypto::{Hash, Signature};
use rlp::{Decodable, DecoderError, Encodable, Rlp, RlpStream};

use crate::codec;
use crate::{Result, TypesError, ValidatorStore, Vote};

/// A certificate that a validator majority signed one block hash.
///
/// Building retains the vote signatures in first-seen order with one
/// entry per signer; validation re-checks every rule a remote replica
/// must not be trusted on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuorumCert {
    block_hash: Hash,
    signatures: Vec<Signature>,
}

impl QuorumCert {
    /// Build a certificate from votes on `block_hash`, retaining the
    /// vote signatures in the order given.
    ///
    /// Votes for a different hash are skipped. No deduplication or
    /// quorum check happens here; the vote collector dedupes by voter
    /// identity and [`QuorumCert::validate`] is the authority on
    /// sufficiency.
    pub fn build(block_hash: Hash, votes: &[Vote]) -> Self {
        let signatures = votes
            .iter()
            .filter(|vote| *vote.block_hash() == block_hash)
            .map(|vote| vote.signature().clone())
            .collect();
        Self {
            block_hash,
            signatures,
        }
    }

    /// The certified block hash.
    pub fn block_hash(&self) -> &Hash {
        &self.block_hash
    }

    /// The aggregated signatures.
    pub fn signatures(&self) -> &[Signature] {
        &self.signatures
    }

    /// A certificate is valid iff it carries at least
    /// `majority_validator_count` signatures, all signers are distinct
    /// voters, and every signature verifies over the block hash.
    pub fn validate(&self, store: &dyn ValidatorStore) -> Result<()> {
        let need = store.majority_validator_count();
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
            if !sig.verify(&self.block_hash) {
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

impl Encodable for QuorumCert {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(2);
        codec::append_hash(s, &self.block_hash);
        codec::append_signature_list(s, &self.signatures);
    }
}

impl Decodable for QuorumCert {
    fn decode(rlp: &Rlp<'_>) -> std::result::Result<Self, DecoderError> {
        if rlp.item_count()? != 2 {
            return Err(DecoderError::RlpIncorrectListLen);
        }
        Ok(Self {
            block_hash: codec::read_hash(rlp, 0)?,
            signatures: codec::read_signature_list(&rlp.at(1)?)?,
        })
    }
}
