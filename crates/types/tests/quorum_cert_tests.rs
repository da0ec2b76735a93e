//! Quorum certificate build/validate rules, including the quorum
//! boundary: exactly the majority validates, one less does not, and
//! duplicate or non-voter signers are rejected regardless of count.

use quill_crypto::{PrivateKey, Signer};
use quill_types::{QuorumCert, TypesError, ValidatorRegistry, ValidatorStore, Vote};

fn keypairs(n: usize) -> Vec<PrivateKey> {
    (0..n)
        .map(|i| PrivateKey::from_seed(&[i as u8 + 1; 32]))
        .collect()
}

/// Four voters (majority 3), five key pairs; the fifth is a stranger.
fn setup() -> (Vec<PrivateKey>, ValidatorRegistry) {
    let keys = keypairs(5);
    let voters: Vec<_> = keys[..4].iter().map(|k| k.public_key()).collect();
    let workers = voters[..2].to_vec();
    (keys, ValidatorRegistry::new(voters, workers))
}

fn votes_for(hash: [u8; 32], keys: &[PrivateKey]) -> Vec<Vote> {
    keys.iter().map(|k| Vote::new(hash, k)).collect()
}

/// Overwrite the first occurrence of `needle` inside `bytes`.
fn replace(bytes: &mut [u8], needle: &[u8], replacement: &[u8]) {
    let pos = bytes
        .windows(needle.len())
        .position(|w| w == needle)
        .expect("needle present");
    bytes[pos..pos + needle.len()].copy_from_slice(replacement);
}

#[test]
fn exact_majority_validates() {
    let (keys, registry) = setup();
    assert_eq!(registry.majority_validator_count(), 3);

    let hash = [7u8; 32];
    let qc = QuorumCert::build(hash, &votes_for(hash, &keys[..3]));
    assert!(qc.validate(&registry).is_ok());
}

#[test]
fn full_set_validates() {
    let (keys, registry) = setup();
    let hash = [7u8; 32];
    let qc = QuorumCert::build(hash, &votes_for(hash, &keys[..4]));
    assert!(qc.validate(&registry).is_ok());
}

#[test]
fn one_below_majority_fails() {
    let (keys, registry) = setup();
    let hash = [7u8; 32];
    let qc = QuorumCert::build(hash, &votes_for(hash, &keys[..2]));
    assert!(matches!(
        qc.validate(&registry),
        Err(TypesError::NotEnoughSignatures { got: 2, need: 3 })
    ));
}

#[test]
fn duplicate_signer_fails_despite_count() {
    let (keys, registry) = setup();
    let hash = [7u8; 32];
    let mut votes = votes_for(hash, &keys[..3]);
    votes.push(votes[0].clone());

    let qc = QuorumCert::build(hash, &votes);
    assert_eq!(qc.signatures().len(), 4);
    assert!(matches!(
        qc.validate(&registry),
        Err(TypesError::DuplicateSigner)
    ));
}

#[test]
fn non_voter_signer_fails() {
    let (keys, registry) = setup();
    let hash = [7u8; 32];
    // keys[4] is not in the validator set
    let qc = QuorumCert::build(hash, &votes_for(hash, &[keys[0].clone(), keys[1].clone(), keys[4].clone()]));
    assert!(matches!(
        qc.validate(&registry),
        Err(TypesError::InvalidSigner("voter"))
    ));
}

#[test]
fn build_skips_votes_for_other_blocks() {
    let (keys, _) = setup();
    let hash = [7u8; 32];
    let mut votes = votes_for(hash, &keys[..2]);
    votes.push(Vote::new([8u8; 32], &keys[2]));

    let qc = QuorumCert::build(hash, &votes);
    assert_eq!(qc.signatures().len(), 2);
}

#[test]
fn tampered_signature_fails() {
    let (keys, registry) = setup();
    let hash = [7u8; 32];
    let qc = QuorumCert::build(hash, &votes_for(hash, &keys[..3]));

    let mut bytes = qc.encode();
    let honest = keys[0].sign(&hash);
    let forged = keys[0].sign(b"something else entirely");
    replace(&mut bytes, honest.value(), forged.value());

    let tampered = QuorumCert::decode(&bytes).unwrap();
    assert!(matches!(
        tampered.validate(&registry),
        Err(TypesError::InvalidSignature)
    ));
}

#[test]
fn wire_round_trip() {
    let (keys, _) = setup();
    let hash = [7u8; 32];
    let qc = QuorumCert::build(hash, &votes_for(hash, &keys[..3]));

    let decoded = QuorumCert::decode(&qc.encode()).unwrap();
    assert_eq!(decoded, qc);
    assert_eq!(decoded.encode(), qc.encode());
}
