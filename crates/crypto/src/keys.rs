//! # Ed25519 Keys and Signatures
//!
//! Replica identity in Quill is an Ed25519 key pair. A [`Signature`]
//! bundles the 64-byte signature value with the signer's public key so
//! that any holder can validate it against a message without consulting
//! a key registry first; role checks (worker/voter) remain the caller's
//! responsibility.

use ed25519_dalek::{Signer as DalekSigner, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;

use crate::{CryptoError, Result};

/// Byte length of a public key.
pub const PUBLIC_KEY_LENGTH: usize = 32;

/// Byte length of a signature value.
pub const SIGNATURE_LENGTH: usize = 64;

/// An Ed25519 public key identifying a replica.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PublicKey {
    key: VerifyingKey,
}

impl PublicKey {
    /// Decode a public key from its 32-byte representation.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a valid curve point.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != PUBLIC_KEY_LENGTH {
            return Err(CryptoError::InvalidLength {
                expected: PUBLIC_KEY_LENGTH,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; PUBLIC_KEY_LENGTH];
        arr.copy_from_slice(bytes);
        let key = VerifyingKey::from_bytes(&arr)
            .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?;
        Ok(Self { key })
    }

    /// The raw 32-byte representation.
    #[inline]
    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LENGTH] {
        self.key.as_bytes()
    }

    /// Owned copy of the raw bytes.
    #[inline]
    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_LENGTH] {
        self.key.to_bytes()
    }

    /// Hex-encoded representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.as_bytes())
    }

    fn verify_value(&self, message: &[u8], value: &[u8]) -> bool {
        let Ok(sig) = ed25519_dalek::Signature::from_slice(value) else {
            return false;
        };
        self.key.verify(message, &sig).is_ok()
    }
}

impl std::hash::Hash for PublicKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.as_bytes().hash(state);
    }
}

impl PartialOrd for PublicKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PublicKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.as_bytes().cmp(other.as_bytes())
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PublicKey({})", &self.to_hex()[..8])
    }
}

impl std::fmt::Display for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", &self.to_hex()[..8])
    }
}

/// An Ed25519 signature together with the public key that produced it.
#[derive(Clone, PartialEq, Eq)]
pub struct Signature {
    signer: PublicKey,
    value: [u8; SIGNATURE_LENGTH],
}

impl Signature {
    /// Reassemble a signature from its wire parts.
    ///
    /// # Errors
    ///
    /// Returns an error if either part has the wrong length or the
    /// public key is invalid.
    pub fn from_parts(signer: &[u8], value: &[u8]) -> Result<Self> {
        let signer = PublicKey::from_bytes(signer)?;
        if value.len() != SIGNATURE_LENGTH {
            return Err(CryptoError::InvalidLength {
                expected: SIGNATURE_LENGTH,
                actual: value.len(),
            });
        }
        let mut arr = [0u8; SIGNATURE_LENGTH];
        arr.copy_from_slice(value);
        Ok(Self { signer, value: arr })
    }

    /// The public key that produced this signature.
    #[inline]
    pub fn public_key(&self) -> &PublicKey {
        &self.signer
    }

    /// The raw 64-byte signature value.
    #[inline]
    pub fn value(&self) -> &[u8; SIGNATURE_LENGTH] {
        &self.value
    }

    /// Verify this signature over `message` under its embedded key.
    pub fn verify(&self, message: &[u8]) -> bool {
        self.signer.verify_value(message, &self.value)
    }
}

impl std::fmt::Debug for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signature")
            .field("signer", &self.signer)
            .finish_non_exhaustive()
    }
}

/// Anything that can produce signatures under a fixed identity.
///
/// The consensus layer takes its signer as `Arc<dyn Signer>` so tests
/// can substitute deterministic key pairs.
pub trait Signer: Send + Sync {
    /// The signing identity.
    fn public_key(&self) -> PublicKey;

    /// Sign `message`, returning a signature that carries the identity.
    fn sign(&self, message: &[u8]) -> Signature;
}

/// An Ed25519 private key.
#[derive(Clone)]
pub struct PrivateKey {
    signing: SigningKey,
}

impl PrivateKey {
    /// Generate a key pair from the system CSPRNG.
    pub fn generate() -> Self {
        Self {
            signing: SigningKey::generate(&mut OsRng),
        }
    }

    /// Rebuild a key pair from a 32-byte seed.
    ///
    /// Deterministic; used for fixed test identities and for loading a
    /// replica's key file.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing: SigningKey::from_bytes(seed),
        }
    }

    /// The corresponding public key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            key: self.signing.verifying_key(),
        }
    }
}

impl Signer for PrivateKey {
    fn public_key(&self) -> PublicKey {
        PrivateKey::public_key(self)
    }

    fn sign(&self, message: &[u8]) -> Signature {
        let sig = self.signing.sign(message);
        Signature {
            signer: self.public_key(),
            value: sig.to_bytes(),
        }
    }
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivateKey")
            .field("public_key", &self.public_key())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_is_deterministic() {
        let a = PrivateKey::from_seed(&[7u8; 32]);
        let b = PrivateKey::from_seed(&[7u8; 32]);
        assert_eq!(a.public_key(), b.public_key());
        assert_eq!(a.sign(b"x").value(), b.sign(b"x").value());
    }

    #[test]
    fn wire_round_trip() {
        let key = PrivateKey::generate();
        let sig = key.sign(b"message");

        let rebuilt =
            Signature::from_parts(sig.public_key().as_bytes(), sig.value()).unwrap();
        assert_eq!(rebuilt, sig);
        assert!(rebuilt.verify(b"message"));
    }

    #[test]
    fn rejects_malformed_parts() {
        let key = PrivateKey::generate();
        let sig = key.sign(b"message");

        assert!(Signature::from_parts(&[0u8; 16], sig.value()).is_err());
        assert!(Signature::from_parts(sig.public_key().as_bytes(), &[0u8; 63]).is_err());
    }

    #[test]
    fn verify_rejects_wrong_signer() {
        let a = PrivateKey::generate();
        let b = PrivateKey::generate();
        let sig = a.sign(b"message");

        let forged = Signature::from_parts(b.public_key().as_bytes(), sig.value()).unwrap();
        assert!(!forged.verify(b"message"));
    }
}
