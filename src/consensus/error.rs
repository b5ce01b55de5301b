//! Error types for consensus validation.
//! 
//! Every failure is classified so the caller can tell a bad block from a
//! node that simply lacks the data to judge it yet.

use thiserror::Error;

use super::{ChainError, CompactError, KernelError, PowError};
use crate::crypto::{Hash, SignatureError};
use crate::storage::StorageError;

/// Who is at fault for a failed check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The block breaks a rule; reject it
    Consensus,
    /// This node is missing data; defer and retry after sync
    DataUnavailable,
    /// A local invariant is broken; this is a bug
    Invariant,
}

/// Block and header validation errors
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Obsolete block version {0}")]
    ObsoleteVersion(i32),
    #[error("Incorrect difficulty: got {got:#010x}, expected {expected:#010x}")]
    BadDifficulty { got: u32, expected: u32 },
    #[error("Proof of work failed: {0}")]
    ProofOfWork(#[from] PowError),
    #[error("Proof-of-work block at height {0} after the last PoW height")]
    PowAfterLastPowHeight(u64),
    #[error("Proof-of-stake block at height {0} before staking is allowed")]
    PosBeforeStaking(u64),
    #[error("Proof of stake failed: {0}")]
    ProofOfStake(#[from] KernelError),
    #[error("Coinstake timestamp {tx_time} does not match block time {block_time}")]
    CoinstakeTimestamp { block_time: u32, tx_time: u32 },
    #[error("Checkpoint mismatch at height {height}: {hash}")]
    CheckpointMismatch { height: u64, hash: Hash },
    #[error("Stake modifier checkpoint mismatch at height {height}: {checksum:#010x}")]
    ModifierCheckpointMismatch { height: u64, checksum: u32 },
    #[error("Merkle root mismatch")]
    BadMerkleRoot,
    #[error("First transaction is not a coinbase")]
    MissingCoinbase,
    #[error("Block signature invalid: {0}")]
    BadSignature(#[from] SignatureError),
    #[error("Proof-of-work block carries a signature")]
    UnexpectedSignature,
    #[error("Header does not extend {expected}")]
    WrongParent { expected: Hash },
    #[error("No hasher available for algorithm {0}")]
    UnsupportedAlgorithm(super::Algorithm),
    #[error("Missing ancestor: {0}")]
    MissingAncestor(#[from] ChainError),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Ancestor carries an unusable target: {0}")]
    CorruptAncestor(#[from] CompactError),
}

impl ValidationError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ValidationError::ProofOfStake(kernel) => kernel.class(),
            ValidationError::UnsupportedAlgorithm(_)
            | ValidationError::MissingAncestor(_)
            | ValidationError::Storage(_) => ErrorClass::DataUnavailable,
            ValidationError::CorruptAncestor(_) => ErrorClass::Invariant,
            _ => ErrorClass::Consensus,
        }
    }
}

/// Result type for consensus operations.
pub type ValidationResult<T> = Result<T, ValidationError>;
