//! Proof-of-work header hashing
//! 
//! Each mined algorithm hashes the 80-byte header differently. SHA256d and
//! BLAKE2s are built in; the X-family chained hashes come from outside.

use blake2::{Blake2s256, Digest};

use super::{Hash, hash_bytes};
use crate::consensus::Algorithm;

/// Hashes a serialized header with the algorithm it was mined under
pub trait PowHasher {
    /// Returns `None` when the algorithm is not available to this hasher
    fn pow_hash(&self, algorithm: Algorithm, header: &[u8]) -> Option<Hash>;
}

/// Hasher for the algorithms with a standard-library-grade implementation
#[derive(Debug, Default, Clone, Copy)]
pub struct StandardPowHasher;

impl PowHasher for StandardPowHasher {
    fn pow_hash(&self, algorithm: Algorithm, header: &[u8]) -> Option<Hash> {
        match algorithm {
            Algorithm::Sha256d => Some(hash_bytes(header)),
            Algorithm::Blake2s => Some(Hash(Blake2s256::digest(header).into())),
            Algorithm::X11 | Algorithm::X12 | Algorithm::X13 => None,
        }
    }
}
