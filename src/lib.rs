//! Hybrid PoW/PoS Consensus Core Library
//! 
//! Decides whether a candidate block may extend the canonical chain:
//! multi-algorithm difficulty retargeting, stake-kernel validation with
//! the stake-modifier chain, and checkpoint enforcement.

pub mod consensus;
pub mod crypto;
pub mod validation;
pub mod storage;
pub mod node;

/// Protocol constants - HARD-CODED, NEVER CONFIGURABLE
pub mod constants {
    /// Number of matching ancestors DarkGravityWave averages over
    pub const DGW_PAST_BLOCKS: usize = 24;

    /// Ratio between the first and last stake-modifier selection sections
    pub const MODIFIER_INTERVAL_RATIO: i64 = 64;

    /// Number of selection sections in a modifier interval
    pub const MODIFIER_SELECTION_SECTIONS: usize = 64;

    /// Coinstake timestamps must be a multiple of 16 seconds
    pub const STAKE_TIMESTAMP_MASK: u32 = 15;

    /// Lowest accepted block version (also the X12 version)
    pub const MIN_BLOCK_VERSION: i32 = 9;

    /// Size of the hashed header form in bytes
    pub const HEADER_SIZE: usize = 80;

    /// Base units per coin
    pub const COIN: u64 = 100_000_000;
}
