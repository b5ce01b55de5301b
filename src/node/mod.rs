//! Node module - network bootstrap data

mod genesis;

pub use genesis::*;
