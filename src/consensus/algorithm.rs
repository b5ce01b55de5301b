//! Algorithm and era classification
//! 
//! The header version selects the mining algorithm through a fixed table;
//! the height selects the consensus era.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::ConsensusParams;

/// Hashing algorithm a block was mined with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Algorithm {
    X12,
    X11,
    X13,
    Sha256d,
    Blake2s,
}

impl Algorithm {
    pub const ALL: [Algorithm; 5] = [
        Algorithm::X12,
        Algorithm::X11,
        Algorithm::X13,
        Algorithm::Sha256d,
        Algorithm::Blake2s,
    ];

    /// Total mapping from header version; unknown versions are X12
    pub fn from_version(version: i32) -> Self {
        match version {
            9 => Algorithm::X12,
            10 => Algorithm::X11,
            11 => Algorithm::X13,
            12 => Algorithm::Sha256d,
            13 => Algorithm::Blake2s,
            _ => Algorithm::X12,
        }
    }

    /// Header version that signals this algorithm
    pub fn version(self) -> i32 {
        match self {
            Algorithm::X12 => 9,
            Algorithm::X11 => 10,
            Algorithm::X13 => 11,
            Algorithm::Sha256d => 12,
            Algorithm::Blake2s => 13,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Algorithm::X12 => "x12",
            Algorithm::X11 => "x11",
            Algorithm::X13 => "x13",
            Algorithm::Sha256d => "sha256d",
            Algorithm::Blake2s => "blake2s",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Classify a header version; `force_x12` pins the single PoS-era algorithm
pub fn algorithm_of(version: i32, force_x12: bool) -> Algorithm {
    if force_x12 {
        Algorithm::X12
    } else {
        Algorithm::from_version(version)
    }
}

/// Consensus era a height belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Era {
    /// Proof-of-work before the merge window
    PreMerge,
    /// Merge window: retargeting suspended, PoW floor target
    Merge,
    /// Proof-of-work after the merge window
    Pow,
    /// Proof-of-stake only
    Pos,
}

pub fn era_of(height: u64, params: &ConsensusParams) -> Era {
    if height < params.merge_start_height {
        Era::PreMerge
    } else if height <= params.merge_end_height {
        Era::Merge
    } else if height > params.last_pow_height {
        Era::Pos
    } else {
        Era::Pow
    }
}
