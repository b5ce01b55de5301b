//! Cryptography module - SHA256d hashing, PoW hashers, Merkle trees, block signatures

mod hash;
mod merkle;
mod pow;
mod signature;

pub use hash::*;
pub use merkle::*;
pub use pow::*;
pub use signature::*;
