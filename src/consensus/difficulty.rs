//! Difficulty retargeting (DarkGravityWave) and proof-of-work checks
//! 
//! Each algorithm and each of PoW/PoS retargets independently: the walk
//! skips every ancestor that was produced under a different rule, so five
//! mining algorithms and staking can share one chain.

use primitive_types::U256;
use thiserror::Error;
use tracing::{debug, warn};

use super::{decode_compact, encode_compact, target_from_compact, Algorithm, ChainIndex,
    CompactError, ConsensusParams, LinkId};
use crate::constants::DGW_PAST_BLOCKS;
use crate::crypto::Hash;

/// Proof-of-work failures
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PowError {
    #[error("Unusable target: {0}")]
    BadTarget(#[from] CompactError),
    #[error("Target {bits:#010x} is easier than the network limit")]
    AboveLimit { bits: u32 },
    #[error("Hash {hash} does not meet target {bits:#010x}")]
    HashAboveTarget { hash: Hash, bits: u32 },
}

/// Compact target the next block on top of `tip` must carry
/// 
/// `algorithm` is ignored by callers asking for PoS only in the sense that
/// stake blocks always classify as X12; pass `Algorithm::X12` for them.
pub fn next_work_required(
    index: &ChainIndex,
    tip: Option<LinkId>,
    algorithm: Algorithm,
    proof_of_stake: bool,
    params: &ConsensusParams,
) -> Result<u32, CompactError> {
    let floor = encode_compact(params.pow_limit);

    let tip = match tip {
        Some(tip) => tip,
        None => return Ok(floor),
    };
    let tip_height = index.get(tip).height;
    let next_height = tip_height + 1;

    // One-time difficulty reset: the merge window always mines at the floor.
    if params.is_merge_height(next_height) {
        debug!(height = next_height, "Merge window, using proof-of-work floor");
        return Ok(floor);
    }
    if tip_height < DGW_PAST_BLOCKS as u64 {
        return Ok(floor);
    }

    let mut matched: u64 = 0;
    let mut average = U256::zero();
    let mut actual_timespan: i64 = 0;
    let mut newer_time: Option<i64> = None;

    for id in index.ancestors(tip) {
        let link = index.get(id);
        if link.is_proof_of_stake() != proof_of_stake || link.algorithm() != algorithm {
            continue;
        }

        let time = i64::from(link.time());
        if let Some(child_time) = newer_time {
            actual_timespan += child_time - time;
        }
        // The match past the window only closes the last time delta.
        if matched == DGW_PAST_BLOCKS as u64 {
            break;
        }

        let target = target_from_compact(link.bits())?;
        matched += 1;
        average = if matched == 1 {
            target
        } else {
            average
                .saturating_mul(U256::from(matched))
                .saturating_add(target)
                / U256::from(matched + 1)
        };
        newer_time = Some(time);
    }

    let limit = params.limit_for(proof_of_stake);
    if matched == 0 {
        return Ok(encode_compact(limit));
    }

    // The configured timespan covers a full window; scale it to the matches found.
    let window_timespan = params.timing_for(next_height, proof_of_stake).target_timespan;
    let target_timespan = window_timespan.saturating_mul(matched as i64) / DGW_PAST_BLOCKS as i64;
    if target_timespan <= 0 {
        warn!(height = next_height, window_timespan, "Non-positive target timespan, using limit");
        return Ok(encode_compact(limit));
    }
    let clamped = actual_timespan.clamp(target_timespan / 3, target_timespan.saturating_mul(3));

    let mut next_target =
        average.saturating_mul(U256::from(clamped as u64)) / U256::from(target_timespan as u64);
    if next_target > limit {
        next_target = limit;
    }

    let bits = encode_compact(next_target);
    debug!(
        height = next_height,
        %algorithm,
        proof_of_stake,
        matched,
        actual_timespan,
        target_timespan,
        bits = format_args!("{:#010x}", bits),
        "Retargeted"
    );
    Ok(bits)
}

/// Check a proof-of-work hash against compact `bits`, bounded by `limit`
pub fn check_proof_of_work(pow_hash: &Hash, bits: u32, limit: U256) -> Result<(), PowError> {
    let target = target_from_compact(bits)?;
    if target > limit {
        return Err(PowError::AboveLimit { bits });
    }
    if pow_hash.to_u256() > target {
        return Err(PowError::HashAboveTarget {
            hash: *pow_hash,
            bits,
        });
    }
    Ok(())
}

/// Decoded target of `bits` without validity checks, for display
pub fn target_of(bits: u32) -> U256 {
    decode_compact(bits).target
}
