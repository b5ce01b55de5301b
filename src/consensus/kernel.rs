//! Proof-of-stake kernel validation
//! 
//! The kernel hash plays the role of the PoW hash for stake blocks. Its
//! target is the block target multiplied by the value of the spent output,
//! so eligibility scales with stake.

use primitive_types::U256;
use thiserror::Error;
use tracing::{debug, warn};

use super::{target_from_compact, ChainIndex, CompactError, ConsensusParams, ErrorClass, LinkId};
use crate::constants::STAKE_TIMESTAMP_MASK;
use crate::crypto::{hash_bytes, write_u256, Hash};
use crate::storage::{ScriptVerifier, StorageError, TxIndex};
use crate::validation::Transaction;

/// Stake validation failures
#[derive(Debug, Error)]
pub enum KernelError {
    #[error("Coinstake time {tx_time} precedes spent output time {output_time}")]
    TimestampViolation { tx_time: u32, output_time: u32 },
    #[error("Kernel hash {hash:#x} exceeds weighted target {target:#x}")]
    AboveTarget { hash: U256, target: U256 },
    #[error("Unusable stake target: {0}")]
    BadTarget(#[from] CompactError),
    #[error("Stake at depth {depth}, need {required}")]
    InsufficientDepth { depth: u64, required: u64 },
    #[error("Kernel input signature rejected")]
    SignatureRejected,
    #[error("Spent transaction has no output {0}")]
    NoSuchOutput(u32),
    #[error("Transaction index unavailable")]
    IndexUnavailable,
    #[error("Spent transaction {0} not indexed")]
    MissingTransaction(Hash),
    #[error("Block {0} holding the spent output is not in the chain index")]
    MissingBlock(Hash),
    #[error("Block {0} holding the spent output is not an ancestor of the tip")]
    NotInChain(Hash),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl KernelError {
    pub fn class(&self) -> ErrorClass {
        match self {
            KernelError::IndexUnavailable
            | KernelError::MissingTransaction(_)
            | KernelError::MissingBlock(_)
            | KernelError::Storage(_) => ErrorClass::DataUnavailable,
            _ => ErrorClass::Consensus,
        }
    }
}

/// Kernel hash: `Hash(modifier || outputTime || outputHash || outputIndex || txTime)`
pub fn kernel_hash(
    stake_modifier: U256,
    output_time: u32,
    output_hash: &Hash,
    output_index: u32,
    tx_time: u32,
) -> U256 {
    let mut data = Vec::with_capacity(32 + 4 + 32 + 4 + 4);
    write_u256(&mut data, &stake_modifier);
    data.extend_from_slice(&output_time.to_le_bytes());
    data.extend_from_slice(&output_hash.0);
    data.extend_from_slice(&output_index.to_le_bytes());
    data.extend_from_slice(&tx_time.to_le_bytes());
    hash_bytes(&data).to_u256()
}

/// Check a stake kernel against `bits` weighted by the spent value
/// 
/// Returns the kernel hash on success.
pub fn check_stake_kernel(
    stake_modifier: U256,
    bits: u32,
    output_value: u64,
    output_time: u32,
    output_hash: &Hash,
    output_index: u32,
    tx_time: u32,
) -> Result<U256, KernelError> {
    if tx_time < output_time {
        return Err(KernelError::TimestampViolation {
            tx_time,
            output_time,
        });
    }

    let target = target_from_compact(bits)?.saturating_mul(U256::from(output_value));
    let hash = kernel_hash(stake_modifier, output_time, output_hash, output_index, tx_time);

    if hash > target {
        return Err(KernelError::AboveTarget { hash, target });
    }
    Ok(hash)
}

/// Validate the coinstake of a block built on `tip`
/// 
/// Non-coinstake transactions pass with a zero proof.
pub fn check_proof_of_stake<V: ScriptVerifier + ?Sized>(
    index: &ChainIndex,
    tip: LinkId,
    bits: u32,
    tx: &Transaction,
    tx_index: Option<&dyn TxIndex>,
    verifier: &V,
    params: &ConsensusParams,
) -> Result<U256, KernelError> {
    let kernel = match tx.kernel_input() {
        Some(kernel) => kernel,
        None => return Ok(U256::zero()),
    };
    let tx_index = tx_index.ok_or(KernelError::IndexUnavailable)?;

    let prevout = kernel.prevout;
    let position = tx_index
        .lookup_tx_index(&prevout.hash)?
        .ok_or(KernelError::MissingTransaction(prevout.hash))?;
    let (from_header, prev_tx) = tx_index.read_block_header_and_tx(&position)?;

    let output = prev_tx
        .outputs
        .get(prevout.n as usize)
        .ok_or(KernelError::NoSuchOutput(prevout.n))?;

    if !verifier.verify(&kernel.script_sig, &output.script_pubkey, tx, 0) {
        warn!(kernel = %prevout.hash, "Coinstake kernel signature rejected");
        return Err(KernelError::SignatureRejected);
    }

    let from_hash = from_header.hash();
    let from_id = index
        .lookup_chain_link(&from_hash)
        .ok_or(KernelError::MissingBlock(from_hash))?;
    let from = index.get(from_id);
    if index.get_ancestor(tip, from.height) != Some(from_id) {
        warn!(block = %from_hash, "Staked output is not on the extended chain");
        return Err(KernelError::NotInChain(from_hash));
    }
    let tip_link = index.get(tip);

    let depth = (tip_link.height + 1).saturating_sub(from.height);
    let required = params.stake_min_confirmations.saturating_sub(1);
    if depth < required {
        return Err(KernelError::InsufficientDepth { depth, required });
    }

    let hash = check_stake_kernel(
        tip_link.stake.stake_modifier,
        bits,
        output.value,
        from_header.time,
        &prevout.hash,
        prevout.n,
        tx.time,
    )?;

    debug!(
        height = tip_link.height + 1,
        depth,
        value = output.value,
        proof = %Hash::from_u256(hash),
        "Stake kernel accepted"
    );
    Ok(hash)
}

/// Coinstake time must equal block time and sit on the stake granularity
pub fn check_coinstake_timestamp(block_time: u32, tx_time: u32) -> bool {
    block_time == tx_time && (tx_time & STAKE_TIMESTAMP_MASK) == 0
}

/// Entropy bit contributed by a block to future stake modifiers
pub fn entropy_bit(block_hash: &Hash) -> u32 {
    (block_hash.low_u64() & 1) as u32
}

/// Whether `required` of the last `to_check` blocks are PoS at `min_version` or later
pub fn is_super_majority(
    index: &ChainIndex,
    start: Option<LinkId>,
    min_version: i32,
    required: usize,
    to_check: usize,
) -> bool {
    let start = match start {
        Some(start) => start,
        None => return required == 0,
    };

    let mut found = 0;
    for id in index.ancestors(start).take(to_check) {
        if found >= required {
            break;
        }
        let link = index.get(id);
        if link.is_proof_of_stake() && link.version() >= min_version {
            found += 1;
        }
    }
    found >= required
}
