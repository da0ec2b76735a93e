//! RLP helpers shared by the entity encodings.
//!
//! Signatures and 32-byte hashes appear in every entity; these helpers
//! keep their wire shape identical everywhere: a signature is the
//! 2-list `[signer, value]`, a hash is a plain 32-byte string.

use quill_crypto::{Hash, Signature};
use rlp::{DecoderError, Rlp, RlpStream};

pub(crate) fn append_signature(s: &mut RlpStream, sig: &Signature) {
    s.begin_list(2);
    s.append(&sig.public_key().as_bytes().to_vec());
    s.append(&sig.value().to_vec());
}

pub(crate) fn read_signature(rlp: &Rlp<'_>) -> Result<Signature, DecoderError> {
    if rlp.item_count()? != 2 {
        return Err(DecoderError::RlpIncorrectListLen);
    }
    let signer: Vec<u8> = rlp.val_at(0)?;
    let value: Vec<u8> = rlp.val_at(1)?;
    Signature::from_parts(&signer, &value)
        .map_err(|_| DecoderError::Custom("invalid signature"))
}

pub(crate) fn append_hash(s: &mut RlpStream, hash: &Hash) {
    s.append(&hash.to_vec());
}

pub(crate) fn read_hash(rlp: &Rlp<'_>, index: usize) -> Result<Hash, DecoderError> {
    let bytes: Vec<u8> = rlp.val_at(index)?;
    hash_from_slice(&bytes)
}

pub(crate) fn hash_from_slice(bytes: &[u8]) -> Result<Hash, DecoderError> {
    if bytes.len() != 32 {
        return Err(DecoderError::RlpInvalidLength);
    }
    let mut hash = [0u8; 32];
    hash.copy_from_slice(bytes);
    Ok(hash)
}

pub(crate) fn append_hash_list(s: &mut RlpStream, hashes: &[Hash]) {
    s.begin_list(hashes.len());
    for hash in hashes {
        append_hash(s, hash);
    }
}

pub(crate) fn read_hash_list(rlp: &Rlp<'_>) -> Result<Vec<Hash>, DecoderError> {
    let mut hashes = Vec::with_capacity(rlp.item_count()?);
    for item in rlp.iter() {
        hashes.push(hash_from_slice(item.data()?)?);
    }
    Ok(hashes)
}

pub(crate) fn append_signature_list(s: &mut RlpStream, sigs: &[Signature]) {
    s.begin_list(sigs.len());
    for sig in sigs {
        append_signature(s, sig);
    }
}

pub(crate) fn read_signature_list(rlp: &Rlp<'_>) -> Result<Vec<Signature>, DecoderError> {
    let mut sigs = Vec::with_capacity(rlp.item_count()?);
    for item in rlp.iter() {
        sigs.push(read_signature(&item)?);
    }
    Ok(sigs)
}
