//! Stake modifier chain
//! 
//! Every block folds a kernel value into the running 256-bit modifier so
//! that future stake kernels cannot be computed ahead of time. A 32-bit
//! checksum of each block's modifier state is pinned at known heights.

use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

use super::Network;
use crate::constants::{MODIFIER_INTERVAL_RATIO, MODIFIER_SELECTION_SECTIONS};
use crate::crypto::{hash_bytes, write_u256};
use crate::node::create_genesis_block;

/// Length in seconds of selection section `section` (0..64)
/// 
/// Early sections are shorter, so later blocks weigh more in selection.
pub fn selection_interval_section(section: usize, modifier_interval: i64) -> i64 {
    debug_assert!(section < MODIFIER_SELECTION_SECTIONS);
    let last = MODIFIER_SELECTION_SECTIONS as i64 - 1;
    modifier_interval * last / (last + (last - section as i64) * (MODIFIER_INTERVAL_RATIO - 1))
}

/// Total length of all selection sections
pub fn selection_interval(modifier_interval: i64) -> i64 {
    (0..MODIFIER_SELECTION_SECTIONS)
        .map(|section| selection_interval_section(section, modifier_interval))
        .sum()
}

/// Next stake modifier: `Hash(kernel || parent)`, zero at genesis
pub fn compute_stake_modifier(parent_modifier: Option<U256>, kernel: U256) -> U256 {
    let parent = match parent_modifier {
        Some(parent) => parent,
        None => return U256::zero(),
    };

    let mut data = Vec::with_capacity(64);
    write_u256(&mut data, &kernel);
    write_u256(&mut data, &parent);
    hash_bytes(&data).to_u256()
}

/// Top 32 bits of `Hash(parentChecksum || flags || hashProofOfStake || modifier)`
pub fn stake_modifier_checksum(
    parent_checksum: u32,
    flags: u32,
    hash_proof_of_stake: U256,
    stake_modifier: U256,
) -> u32 {
    let mut data = Vec::with_capacity(4 + 4 + 32 + 32);
    data.extend_from_slice(&parent_checksum.to_le_bytes());
    data.extend_from_slice(&flags.to_le_bytes());
    write_u256(&mut data, &hash_proof_of_stake);
    write_u256(&mut data, &stake_modifier);

    (hash_bytes(&data).to_u256() >> 224).low_u32()
}

/// How the genesis height is treated by the checkpoint check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GenesisPolicy {
    /// Height 0 always passes
    Exempt,
    /// Height 0 is checked like any other height
    Enforce,
}

/// Known-good modifier checksums of one network profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModifierCheckpoints {
    pub checksums: BTreeMap<u64, u32>,
    pub genesis_policy: GenesisPolicy,
}

impl ModifierCheckpoints {
    pub fn new(checksums: BTreeMap<u64, u32>, genesis_policy: GenesisPolicy) -> Self {
        Self {
            checksums,
            genesis_policy,
        }
    }

    pub fn for_network(network: Network) -> Self {
        let genesis = create_genesis_block(network);
        let genesis_checksum =
            stake_modifier_checksum(0, genesis.header.flags.bits(), U256::zero(), U256::zero());

        let mut checksums = BTreeMap::new();
        checksums.insert(0, genesis_checksum);
        Self::new(checksums, GenesisPolicy::Exempt)
    }

    /// Whether `checksum` is acceptable at `height`
    /// 
    /// Heights without an entry always pass.
    pub fn check(&self, height: u64, checksum: u32) -> bool {
        if height == 0 && self.genesis_policy == GenesisPolicy::Exempt {
            return true;
        }

        match self.checksums.get(&height) {
            Some(&expected) if expected != checksum => {
                warn!(
                    height,
                    checksum = format_args!("{:#010x}", checksum),
                    expected = format_args!("{:#010x}", expected),
                    "Stake modifier checksum mismatch"
                );
                false
            }
            _ => true,
        }
    }
}
