//! # Quill Crypto
//!
//! Cryptographic primitives for the Quill blockchain.
//!
//! This crate provides:
//! - **SHA3-256 hashing** - entity digests and content addressing
//! - **Ed25519 signatures** - replica signing and verification
//!
//! Signatures in Quill always travel together with the signer's public
//! key, so a [`Signature`] can be validated on its own against any
//! message without a separate key lookup.
//!
//! ## Example
//!
//! ```rust
//! use quill_crypto::{sha3_256, PrivateKey, Signer};
//!
//! let digest = sha3_256(b"hello world");
//!
//! let key = PrivateKey::generate();
//! let sig = key.sign(&digest);
//! assert!(sig.verify(&digest));
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod hash;
pub mod keys;

pub use hash::{sha3_256, sha3_256_concat, Hasher};
pub use keys::{PrivateKey, PublicKey, Signature, Signer};

/// Common type alias for a 32-byte digest.
pub type Hash = [u8; 32];

/// Error types for cryptographic operations.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// Invalid public key bytes
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    /// Invalid signature bytes
    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    /// Invalid input length
    #[error("invalid input length: expected {expected}, got {actual}")]
    InvalidLength {
        /// Expected byte length
        expected: usize,
        /// Actual byte length
        actual: usize,
    },
}

/// Result type for cryptographic operations.
pub type Result<T> = std::result::Result<T, CryptoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha3_256_known_vector() {
        let hash = sha3_256(b"hello");
        assert_eq!(
            hex::encode(hash),
            "3338be694f50c5f338814986cdf0686453a888b84f424d792af4b9202398f392"
        );
    }

    #[test]
    fn sign_and_verify() {
        let key = PrivateKey::generate();
        let sig = key.sign(b"consensus message");
        assert!(sig.verify(b"consensus message"));
        assert!(!sig.verify(b"another message"));
    }

    #[test]
    fn signature_carries_signer() {
        let key = PrivateKey::generate();
        let sig = key.sign(b"payload");
        assert_eq!(*sig.public_key(), key.public_key());
    }
}
