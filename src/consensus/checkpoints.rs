//! Hard-coded block checkpoints
//! 
//! A sparse table of (height, hash) pairs. Blocks contradicting an entry
//! are rejected; the table also drives the sync-progress estimate.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

use super::{ChainIndex, ChainLink};
use crate::crypto::Hash;

const SECONDS_PER_DAY: u128 = 86_400;
const PARTS_PER_MILLION: u128 = 1_000_000;
/// Signature checks make post-checkpoint transactions this much slower to verify
const SIGCHECK_FACTOR: u128 = 5;

/// Checkpoint table plus the statistics used for progress estimates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointData {
    pub hashes: BTreeMap<u64, Hash>,
    /// Timestamp of the last checkpointed block
    pub time_last_checkpoint: u64,
    /// Cumulative transactions up to the last checkpoint
    pub transactions_last_checkpoint: u64,
    /// Estimated transactions per day after the last checkpoint
    pub transactions_per_day: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoints {
    pub enabled: bool,
    pub data: CheckpointData,
}

impl Checkpoints {
    /// Whether `hash` is acceptable at `height`
    /// 
    /// With `matches_checkpoint_only` a height without an entry fails too.
    pub fn check_block(&self, height: u64, hash: &Hash, matches_checkpoint_only: bool) -> bool {
        if !self.enabled {
            return true;
        }

        match self.data.hashes.get(&height) {
            None => !matches_checkpoint_only,
            Some(expected) if expected == hash => true,
            Some(expected) => {
                warn!(height, %hash, %expected, "Block contradicts checkpoint");
                false
            }
        }
    }

    /// Highest checkpointed height, for progress display only
    pub fn total_blocks_estimate(&self) -> u64 {
        if !self.enabled {
            return 0;
        }
        self.data.hashes.keys().next_back().copied().unwrap_or(0)
    }

    /// Newest checkpoint whose block this node has indexed
    pub fn last_checkpoint<'a>(&self, index: &'a ChainIndex) -> Option<&'a ChainLink> {
        if !self.enabled {
            return None;
        }
        self.data
            .hashes
            .values()
            .rev()
            .find_map(|hash| index.link_by_hash(hash))
    }

    /// Fraction of total verification work done at `tip`, in parts per million
    /// 
    /// Transactions before the last checkpoint count as cheap, later ones
    /// as expensive. `now` is the caller's wall-clock time in seconds.
    pub fn guess_verification_progress(&self, tip: Option<&ChainLink>, now: u64) -> u64 {
        let tip = match tip {
            Some(tip) => tip,
            None => return 0,
        };

        let data = &self.data;
        let chain_tx = u128::from(tip.chain_tx);
        let checkpoint_tx = u128::from(data.transactions_last_checkpoint);
        let per_day = u128::from(data.transactions_per_day);

        // All quantities are scaled by SECONDS_PER_DAY to stay integral.
        let (before, after) = if chain_tx <= checkpoint_tx {
            let cheap_after = checkpoint_tx - chain_tx;
            let elapsed = u128::from(now.saturating_sub(data.time_last_checkpoint));
            (
                chain_tx * SECONDS_PER_DAY,
                cheap_after * SECONDS_PER_DAY + elapsed * per_day * SIGCHECK_FACTOR,
            )
        } else {
            let expensive_before = chain_tx - checkpoint_tx;
            let elapsed = u128::from(now.saturating_sub(u64::from(tip.time())));
            (
                (checkpoint_tx + expensive_before * SIGCHECK_FACTOR) * SECONDS_PER_DAY,
                elapsed * per_day * SIGCHECK_FACTOR,
            )
        };

        let total = before + after;
        if total == 0 {
            return 0;
        }
        (before * PARTS_PER_MILLION / total) as u64
    }
}
