//! Storage module - collaborator contracts and the sled-backed block store
//! 
//! Consensus code only sees the traits here. Every lookup is fallible.

pub mod db;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consensus::{BlockHeader, ChainError};
use crate::crypto::Hash;
use crate::validation::Transaction;

pub use db::BlockStore;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sled::Error),
    #[error("Corrupt record: {0}")]
    Codec(#[from] bincode::Error),
    #[error("Record not found: {0}")]
    NotFound(String),
    #[error("Stored chain is inconsistent: {0}")]
    Chain(#[from] ChainError),
}

/// Where a transaction lives: containing block and position inside it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskPosition {
    pub block_hash: Hash,
    pub tx_index: u32,
}

/// Transaction index collaborator
pub trait TxIndex {
    fn lookup_tx_index(&self, tx_hash: &Hash) -> Result<Option<DiskPosition>, StorageError>;

    fn read_block_header_and_tx(
        &self,
        position: &DiskPosition,
    ) -> Result<(BlockHeader, Transaction), StorageError>;
}

/// Script verification collaborator
pub trait ScriptVerifier {
    /// Whether `script_sig` satisfies `script_pubkey` for input `input_index` of `tx`
    fn verify(
        &self,
        script_sig: &[u8],
        script_pubkey: &[u8],
        tx: &Transaction,
        input_index: usize,
    ) -> bool;
}

impl<F> ScriptVerifier for F
where
    F: Fn(&[u8], &[u8], &Transaction, usize) -> bool,
{
    fn verify(
        &self,
        script_sig: &[u8],
        script_pubkey: &[u8],
        tx: &Transaction,
        input_index: usize,
    ) -> bool {
        self(script_sig, script_pubkey, tx, input_index)
    }
}
