//! Client transactions.
//!
//! The consensus core treats transactions as opaque payloads addressed
//! by hash; semantic validation belongs to the transaction pool and the
//! execution engine. Only enough structure is modelled here to sign,
//! address and ship them: a sender nonce, an input blob and an expiry
//! height.

use quill_crypto::{Hash, Hasher, PublicKey, Signature, Signer};
use rlp::{Decodable, DecoderError, Encodable, Rlp, RlpStream};

use crate::codec;
use crate::{Result, TypesError};

/// A signed client transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    nonce: u64,
    sender: PublicKey,
    input: Vec<u8>,
    expiry: u64,
    hash: Hash,
    signature: Signature,
}

impl Transaction {
    /// Build and sign a transaction. The digest and signature are set
    /// exactly once, here.
    pub fn new(nonce: u64, input: Vec<u8>, expiry: u64, signer: &dyn Signer) -> Self {
        let sender = signer.public_key();
        let hash = Self::digest(nonce, &sender, &input, expiry);
        let signature = signer.sign(&hash);
        Self {
            nonce,
            sender,
            input,
            expiry,
            hash,
            signature,
        }
    }

    fn digest(nonce: u64, sender: &PublicKey, input: &[u8], expiry: u64) -> Hash {
        let mut hasher = Hasher::new();
        hasher.update_u64(nonce);
        hasher.update(sender.as_bytes());
        hasher.update(input);
        hasher.update_u64(expiry);
        hasher.finalize()
    }

    /// Check digest integrity and the sender signature.
    pub fn validate(&self) -> Result<()> {
        let expect = Self::digest(self.nonce, &self.sender, &self.input, self.expiry);
        if expect != self.hash {
            return Err(TypesError::InvalidHash("transaction"));
        }
        if self.signature.public_key() != &self.sender {
            return Err(TypesError::InvalidSigner("sender"));
        }
        if !self.signature.verify(&self.hash) {
            return Err(TypesError::InvalidSignature);
        }
        Ok(())
    }

    /// Sender-chosen sequence number.
    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    /// The signing account.
    pub fn sender(&self) -> &PublicKey {
        &self.sender
    }

    /// Opaque call data.
    pub fn input(&self) -> &[u8] {
        &self.input
    }

    /// Height after which the transaction must not be included.
    /// Zero means no expiry.
    pub fn expiry(&self) -> u64 {
        self.expiry
    }

    /// Content address.
    pub fn hash(&self) -> &Hash {
        &self.hash
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

impl Encodable for Transaction {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(6);
        s.append(&self.nonce);
        s.append(&self.sender.as_bytes().to_vec());
        s.append(&self.input);
        s.append(&self.expiry);
        codec::append_hash(s, &self.hash);
        codec::append_signature(s, &self.signature);
    }
}

impl Decodable for Transaction {
    fn decode(rlp: &Rlp<'_>) -> std::result::Result<Self, DecoderError> {
        if rlp.item_count()? != 6 {
            return Err(DecoderError::RlpIncorrectListLen);
        }
        let sender_bytes: Vec<u8> = rlp.val_at(1)?;
        let sender = PublicKey::from_bytes(&sender_bytes)
            .map_err(|_| DecoderError::Custom("invalid sender key"))?;
        Ok(Self {
            nonce: rlp.val_at(0)?,
            sender,
            input: rlp.val_at(2)?,
            expiry: rlp.val_at(3)?,
            hash: codec::read_hash(rlp, 4)?,
            signature: codec::read_signature(&rlp.at(5)?)?,
        })
    }
}

/// Hashes of a transaction list, preserving order.
pub fn tx_hashes(txs: &[Transaction]) -> Vec<Hash> {
    txs.iter().map(|tx| *tx.hash()).collect()
}
