//! # SHA3-256 Hashing Utilities
//!
//! Every content address in Quill (transaction, batch, block) is a
//! SHA3-256 digest over a canonical field concatenation. This module
//! provides the one-shot helpers and a streaming [`Hasher`] for
//! preimages assembled field by field.

use sha3::{Digest, Sha3_256};

/// Compute the SHA3-256 hash of the input data.
///
/// # Example
///
/// ```rust
/// use quill_crypto::sha3_256;
///
/// let hash = sha3_256(b"hello");
/// assert_eq!(hash.len(), 32);
/// ```
#[inline]
pub fn sha3_256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha3_256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Compute the SHA3-256 hash of multiple concatenated inputs.
///
/// Equivalent to hashing the concatenation of `parts` without
/// allocating a temporary buffer.
#[inline]
pub fn sha3_256_concat(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha3_256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// A streaming SHA3-256 hasher for incremental hashing.
///
/// Used when a digest preimage is built up from a sequence of fields,
/// e.g. a block digest over height, parent hash and batch header
/// hashes.
///
/// # Example
///
/// ```rust
/// use quill_crypto::Hasher;
///
/// let mut hasher = Hasher::new();
/// hasher.update(b"part1");
/// hasher.update(b"part2");
/// let hash = hasher.finalize();
/// ```
#[derive(Clone, Default)]
pub struct Hasher {
    inner: Sha3_256,
}

impl Hasher {
    /// Create a new SHA3-256 hasher.
    #[inline]
    pub fn new() -> Self {
        Self {
            inner: Sha3_256::new(),
        }
    }

    /// Update the hasher with additional data.
    #[inline]
    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    /// Update the hasher with a big-endian encoded `u64`.
    #[inline]
    pub fn update_u64(&mut self, value: u64) {
        self.inner.update(value.to_be_bytes());
    }

    /// Update the hasher with a big-endian encoded `i64`.
    #[inline]
    pub fn update_i64(&mut self, value: i64) {
        self.inner.update(value.to_be_bytes());
    }

    /// Finalize the hasher and return the digest.
    #[inline]
    pub fn finalize(self) -> [u8; 32] {
        self.inner.finalize().into()
    }
}

impl std::fmt::Debug for Hasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hasher").finish_non_exhaustive()
    }
}
