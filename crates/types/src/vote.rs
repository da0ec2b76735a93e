//! Block votes.

use quill_crypto::{Hash, Signature, Signer, PublicKey};
use rlp::{Decodable, DecoderError, Encodable, Rlp, RlpStream};

use crate::codec;
use crate::{Result, TypesError, ValidatorStore};

/// A voter's signature over a block hash.
///
/// Votes are unicast back to the block proposer, which aggregates them
/// into a [`crate::QuorumCert`] once a validator majority is reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vote {
    block_hash: Hash,
    signature: Signature,
}

impl Vote {
    /// Sign a vote for the block with the given hash.
    pub fn new(block_hash: Hash, signer: &dyn Signer) -> Self {
        let signature = signer.sign(&block_hash);
        Self {
            block_hash,
            signature,
        }
    }

    /// Reassemble a vote from an existing signature over `block_hash`.
    pub(crate) fn from_signature(block_hash: Hash, signature: Signature) -> Self {
        Self {
            block_hash,
            signature,
        }
    }

    /// The hash of the voted block.
    pub fn block_hash(&self) -> &Hash {
        &self.block_hash
    }

    /// The voting replica.
    pub fn voter(&self) -> &PublicKey {
        self.signature.public_key()
    }

    /// The underlying signature.
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// A vote is valid iff its signer holds the voter role and the
    /// signature verifies over the block hash.
    pub fn validate(&self, store: &dyn ValidatorStore) -> Result<()> {
        if !store.is_voter(self.voter()) {
            return Err(TypesError::InvalidSigner("voter"));
        }
        if !self.signature.verify(&self.block_hash) {
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

impl Encodable for Vote {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(2);
        codec::append_hash(s, &self.block_hash);
        codec::append_signature(s, &self.signature);
    }
}

impl Decodable for Vote {
    fn decode(rlp: &Rlp<'_>) -> std::result::Result<Self, DecoderError> {
        if rlp.item_count()? != 2 {
            return Err(DecoderError::RlpIncorrectListLen);
        }
        Ok(Self {
            block_hash: codec::read_hash(rlp, 0)?,
            signature: codec::read_signature(&rlp.at(1)?)?,
        })
    }
}
