//! Hash functions used to fingerprint canonical call representations

use sha2::{Digest, Sha256, Sha512};
use std::fmt;

/// A hash function producing the raw digest of a canonical key representation
///
/// Implementations must be deterministic across processes and releases: the
/// digest becomes part of persisted cache keys.
pub trait HashFunction: Send + Sync + fmt::Debug {
    /// Short name for diagnostics
    fn name(&self) -> &'static str;

    /// Digest the given bytes
    fn digest(&self, input: &[u8]) -> Vec<u8>;

    /// Lower-case hexadecimal digest of the given bytes
    fn hex_digest(&self, input: &[u8]) -> String {
        hex::encode(self.digest(input))
    }
}

/// SHA-256 (default)
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Hash;

impl HashFunction for Sha256Hash {
    fn name(&self) -> &'static str {
        "sha256"
    }

    fn digest(&self, input: &[u8]) -> Vec<u8> {
        Sha256::digest(input).to_vec()
    }
}

/// SHA-512
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha512Hash;

impl HashFunction for Sha512Hash {
    fn name(&self) -> &'static str {
        "sha512"
    }

    fn digest(&self, input: &[u8]) -> Vec<u8> {
        Sha512::digest(input).to_vec()
    }
}
