//! Transaction digests, signatures and wire codec.

use quill_crypto::PrivateKey;
use quill_types::{Transaction, TypesError};

fn replace(bytes: &mut [u8], needle: &[u8], replacement: &[u8]) {
    let pos = bytes
        .windows(needle.len())
        .position(|w| w == needle)
        .expect("needle present");
    bytes[pos..pos + needle.len()].copy_from_slice(replacement);
}

#[test]
fn build_and_validate() {
    let key = PrivateKey::from_seed(&[1u8; 32]);
    let tx = Transaction::new(7, b"transfer 10 to bob".to_vec(), 100, &key);

    assert_eq!(tx.nonce(), 7);
    assert_eq!(*tx.sender(), key.public_key());
    assert_eq!(tx.expiry(), 100);
    assert!(tx.validate().is_ok());
}

#[test]
fn digest_is_deterministic() {
    let key = PrivateKey::from_seed(&[1u8; 32]);
    let a = Transaction::new(7, b"payload".to_vec(), 0, &key);
    let b = Transaction::new(7, b"payload".to_vec(), 0, &key);
    assert_eq!(a.hash(), b.hash());

    let c = Transaction::new(8, b"payload".to_vec(), 0, &key);
    assert_ne!(a.hash(), c.hash());
}

#[test]
fn wire_round_trip() {
    let key = PrivateKey::from_seed(&[2u8; 32]);
    let tx = Transaction::new(1, b"some call data".to_vec(), 50, &key);

    let decoded = Transaction::decode(&tx.encode()).unwrap();
    assert_eq!(decoded, tx);
    assert_eq!(decoded.encode(), tx.encode());
    assert!(decoded.validate().is_ok());
}

#[test]
fn tampered_input_rejected() {
    let key = PrivateKey::from_seed(&[3u8; 32]);
    let tx = Transaction::new(1, b"original call data".to_vec(), 0, &key);

    let mut bytes = tx.encode();
    replace(&mut bytes, b"original call data", b"replaced call data");

    let tampered = Transaction::decode(&bytes).unwrap();
    assert!(matches!(
        tampered.validate(),
        Err(TypesError::InvalidHash("transaction"))
    ));
}
