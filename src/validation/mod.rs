//! Validation module - transaction model consumed by consensus checks

mod transaction;

pub use transaction::*;
