//! Consensus parameters and network rule sets
//! 
//! Parameters are built once per network profile (or loaded from JSON) and
//! handed to every validation call by reference. Nothing here is mutated
//! after construction.

use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

use super::{CheckpointData, Checkpoints, ModifierCheckpoints};
use crate::constants::DGW_PAST_BLOCKS;
use crate::crypto::Hash;
use crate::node::create_genesis_block;

/// Errors loading a parameter file
#[derive(Debug, Error)]
pub enum ParamsError {
    #[error("Failed to read parameter file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid parameter file: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Inconsistent parameters: {0}")]
    Inconsistent(&'static str),
}

/// Network profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Main,
    Test,
}

/// Target timespan and block spacing for one era, in seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingPair {
    pub target_timespan: i64,
    pub target_spacing: i64,
}

impl TimingPair {
    const fn with_spacing(target_spacing: i64) -> Self {
        Self {
            target_timespan: target_spacing * DGW_PAST_BLOCKS as i64,
            target_spacing,
        }
    }
}

/// Consensus parameters of one network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusParams {
    pub network: Network,
    pub genesis_hash: Hash,
    /// First height of the merge window
    pub merge_start_height: u64,
    /// Last height of the merge window (inclusive)
    pub merge_end_height: u64,
    /// Heights above this are proof-of-stake only
    pub last_pow_height: u64,
    pub stake_min_confirmations: u64,
    /// Height from which the "v2" timing rules apply
    pub protocol_v2_height: u64,
    pub pow_timing: TimingPair,
    pub pow_timing_v2: TimingPair,
    pub pos_timing: TimingPair,
    pub pos_timing_v2: TimingPair,
    /// Easiest allowed proof-of-work target
    pub pow_limit: U256,
    /// Easiest allowed proof-of-stake target (before value weighting)
    pub pos_limit: U256,
    pub subsidy_halving_interval: u64,
    /// Stake modifier interval in seconds
    pub modifier_interval: i64,
}

impl ConsensusParams {
    pub fn for_network(network: Network) -> Self {
        match network {
            Network::Main => Self {
                network,
                genesis_hash: create_genesis_block(network).hash(),
                merge_start_height: 250_000,
                merge_end_height: 250_100,
                last_pow_height: 600_000,
                stake_min_confirmations: 500,
                protocol_v2_height: 300_000,
                pow_timing: TimingPair::with_spacing(150),
                pow_timing_v2: TimingPair::with_spacing(60),
                pos_timing: TimingPair::with_spacing(64),
                pos_timing_v2: TimingPair::with_spacing(64),
                pow_limit: !U256::zero() >> 20,
                pos_limit: !U256::zero() >> 24,
                subsidy_halving_interval: 210_000,
                modifier_interval: 600,
            },
            Network::Test => Self {
                network,
                genesis_hash: create_genesis_block(network).hash(),
                merge_start_height: 100,
                merge_end_height: 110,
                last_pow_height: 400,
                stake_min_confirmations: 10,
                protocol_v2_height: 200,
                pow_timing: TimingPair::with_spacing(150),
                pow_timing_v2: TimingPair::with_spacing(60),
                pos_timing: TimingPair::with_spacing(64),
                pos_timing_v2: TimingPair::with_spacing(64),
                pow_limit: !U256::zero() >> 16,
                pos_limit: !U256::zero() >> 20,
                subsidy_halving_interval: 150,
                modifier_interval: 60,
            },
        }
    }

    /// Timing pair that governs a block at `height`
    pub fn timing_for(&self, height: u64, proof_of_stake: bool) -> TimingPair {
        let v2 = height >= self.protocol_v2_height;
        match (proof_of_stake, v2) {
            (false, false) => self.pow_timing,
            (false, true) => self.pow_timing_v2,
            (true, false) => self.pos_timing,
            (true, true) => self.pos_timing_v2,
        }
    }

    pub fn spacing_for(&self, height: u64, proof_of_stake: bool) -> i64 {
        self.timing_for(height, proof_of_stake).target_spacing
    }

    /// Ceiling target for the requested kind of block
    pub fn limit_for(&self, proof_of_stake: bool) -> U256 {
        if proof_of_stake {
            self.pos_limit
        } else {
            self.pow_limit
        }
    }

    pub fn is_merge_height(&self, height: u64) -> bool {
        (self.merge_start_height..=self.merge_end_height).contains(&height)
    }

    /// Reject parameter sets the validation code cannot work with
    pub fn validate(&self) -> Result<(), ParamsError> {
        if self.merge_end_height < self.merge_start_height {
            return Err(ParamsError::Inconsistent("merge window ends before it starts"));
        }
        for timing in [self.pow_timing, self.pow_timing_v2, self.pos_timing, self.pos_timing_v2] {
            if timing.target_spacing <= 0 {
                return Err(ParamsError::Inconsistent("target spacing must be positive"));
            }
            if timing.target_timespan != timing.target_spacing * DGW_PAST_BLOCKS as i64 {
                return Err(ParamsError::Inconsistent(
                    "target timespan must cover one retarget window of spacings",
                ));
            }
        }
        if self.pow_limit.is_zero() || self.pos_limit.is_zero() {
            return Err(ParamsError::Inconsistent("target limits must be non-zero"));
        }
        if self.stake_min_confirmations == 0 {
            return Err(ParamsError::Inconsistent("stake confirmations must be non-zero"));
        }
        Ok(())
    }
}

/// Everything a validation pass needs to know about a network
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkRules {
    pub params: ConsensusParams,
    pub checkpoints: Checkpoints,
    pub modifier_checkpoints: ModifierCheckpoints,
}

impl NetworkRules {
    pub fn for_network(network: Network) -> Self {
        let params = ConsensusParams::for_network(network);
        let genesis = create_genesis_block(network);

        let mut hashes = BTreeMap::new();
        hashes.insert(0, params.genesis_hash);
        let checkpoints = Checkpoints {
            enabled: true,
            data: CheckpointData {
                hashes,
                time_last_checkpoint: u64::from(genesis.header.time),
                transactions_last_checkpoint: genesis.transactions.len() as u64,
                transactions_per_day: match network {
                    Network::Main => 2_000,
                    Network::Test => 500,
                },
            },
        };

        Self {
            params,
            checkpoints,
            modifier_checkpoints: ModifierCheckpoints::for_network(network),
        }
    }

    /// Load a complete rule set from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ParamsError> {
        let raw = std::fs::read_to_string(path)?;
        let rules: NetworkRules = serde_json::from_str(&raw)?;
        rules.params.validate()?;
        tracing::info!(
            network = ?rules.params.network,
            checkpoints = rules.checkpoints.data.hashes.len(),
            "Loaded network rules"
        );
        Ok(rules)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::encode_compact;

    #[test]
    fn test_builtin_profiles_are_consistent() {
        for network in [Network::Main, Network::Test] {
            assert!(ConsensusParams::for_network(network).validate().is_ok());
        }
    }

    #[test]
    fn test_timing_must_cover_one_window() {
        let mut params = ConsensusParams::for_network(Network::Main);
        params.pos_timing.target_timespan += 1;
        assert!(matches!(params.validate(), Err(ParamsError::Inconsistent(_))));

        let mut params = ConsensusParams::for_network(Network::Main);
        params.pow_timing_v2 = TimingPair { target_timespan: -1_440, target_spacing: -60 };
        assert!(matches!(params.validate(), Err(ParamsError::Inconsistent(_))));
    }

    #[test]
    fn test_limits_encode_to_expected_bits() {
        let params = ConsensusParams::for_network(Network::Main);
        assert_eq!(encode_compact(params.pow_limit), 0x1e0fffff);
        assert_eq!(encode_compact(params.pos_limit), 0x1e00ffff);
    }

    #[test]
    fn test_spacing_table_selection() {
        let params = ConsensusParams::for_network(Network::Test);
        let v2 = params.protocol_v2_height;
        assert_eq!(params.spacing_for(v2 - 1, false), 150);
        assert_eq!(params.spacing_for(v2, false), 60);
        assert_eq!(params.spacing_for(v2 - 1, true), 64);
        assert_eq!(params.spacing_for(v2, true), 64);
    }

    #[test]
    fn test_merge_window_is_inclusive() {
        let params = ConsensusParams::for_network(Network::Test);
        assert!(!params.is_merge_height(params.merge_start_height - 1));
        assert!(params.is_merge_height(params.merge_start_height));
        assert!(params.is_merge_height(params.merge_end_height));
        assert!(!params.is_merge_height(params.merge_end_height + 1));
    }

    #[test]
    fn test_rules_json_roundtrip() {
        let rules = NetworkRules::for_network(Network::Test);
        let json = serde_json::to_string(&rules).unwrap();
        let path = std::env::temp_dir().join(format!("hybrid-rules-{}.json", std::process::id()));
        std::fs::write(&path, json).unwrap();

        let loaded = NetworkRules::from_json_file(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(loaded.params, rules.params);
        assert_eq!(loaded.checkpoints.data.hashes, rules.checkpoints.data.hashes);
    }

    #[test]
    fn test_inconsistent_file_rejected() {
        let mut rules = NetworkRules::for_network(Network::Test);
        rules.params.merge_end_height = rules.params.merge_start_height - 1;
        let path = std::env::temp_dir().join(format!("hybrid-bad-{}.json", std::process::id()));
        std::fs::write(&path, serde_json::to_string(&rules).unwrap()).unwrap();

        let result = NetworkRules::from_json_file(&path);
        std::fs::remove_file(&path).ok();

        assert!(matches!(result, Err(ParamsError::Inconsistent(_))));
    }
}
