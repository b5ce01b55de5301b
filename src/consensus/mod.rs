//! Consensus module - chain index, difficulty, stake kernel and block acceptance

mod algorithm;
mod block;
mod chain;
mod checkpoints;
mod compact;
mod difficulty;
mod error;
mod kernel;
mod params;
mod stake_modifier;
mod validation;

pub use algorithm::*;
pub use block::*;
pub use chain::*;
pub use checkpoints::*;
pub use compact::*;
pub use difficulty::*;
pub use error::*;
pub use kernel::*;
pub use params::*;
pub use stake_modifier::*;
pub use validation::*;
