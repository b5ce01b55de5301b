//! Database persistence layer using Sled
//! 
//! Stores full blocks, chain links, the transaction index and the tip.
//! Link keys are `height (BE) || hash` so iteration yields parents first.

use sled::{Db, Tree};
use std::path::Path;
use tracing::{debug, info};

use super::{DiskPosition, StorageError, TxIndex};
use crate::consensus::{Block, BlockHeader, ChainIndex, ChainLink};
use crate::crypto::Hash;
use crate::validation::Transaction;

const TIP_KEY: &str = "tip_hash";

/// Sled-backed block store
#[derive(Debug, Clone)]
pub struct BlockStore {
    db: Db,
    blocks_tree: Tree,
    links_tree: Tree,
    tx_tree: Tree,
    metadata_tree: Tree,
}

impl BlockStore {
    /// Open or create the store at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path.as_ref())?;
        info!(path = %path.as_ref().display(), "Opened block store");
        Self::from_db(db)
    }

    /// Store that disappears when dropped
    pub fn open_temporary() -> Result<Self, StorageError> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> Result<Self, StorageError> {
        Ok(Self {
            blocks_tree: db.open_tree("blocks")?,
            links_tree: db.open_tree("links")?,
            tx_tree: db.open_tree("txindex")?,
            metadata_tree: db.open_tree("metadata")?,
            db,
        })
    }

    /// Save a block and index its transactions
    pub fn save_block(&self, block: &Block) -> Result<(), StorageError> {
        let hash = block.hash();
        self.blocks_tree.insert(hash.0, bincode::serialize(block)?)?;

        for (i, tx) in block.transactions.iter().enumerate() {
            let position = DiskPosition {
                block_hash: hash,
                tx_index: i as u32,
            };
            self.tx_tree.insert(tx.hash().0, bincode::serialize(&position)?)?;
        }
        debug!(%hash, txs = block.transactions.len(), "Stored block");
        Ok(())
    }

    /// Get a block by hash
    pub fn get_block(&self, hash: &Hash) -> Result<Option<Block>, StorageError> {
        match self.blocks_tree.get(hash.0)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Persist an accepted chain link
    pub fn save_link(&self, link: &ChainLink) -> Result<(), StorageError> {
        self.links_tree.insert(link_key(link.height, &link.hash), bincode::serialize(link)?)?;
        Ok(())
    }

    /// Record the best tip
    pub fn set_tip(&self, tip: &Hash) -> Result<(), StorageError> {
        self.metadata_tree.insert(TIP_KEY, tip.0.as_ref())?;
        self.db.flush()?;
        Ok(())
    }

    /// Load the recorded tip, if any
    pub fn tip(&self) -> Result<Option<Hash>, StorageError> {
        match self.metadata_tree.get(TIP_KEY)? {
            Some(bytes) => {
                let raw: [u8; 32] = bytes
                    .as_ref()
                    .try_into()
                    .map_err(|_| StorageError::NotFound("well-formed tip record".into()))?;
                Ok(Some(Hash(raw)))
            }
            None => Ok(None),
        }
    }

    /// Rebuild the in-memory chain index from stored links
    pub fn load_chain_index(&self) -> Result<ChainIndex, StorageError> {
        let mut index = ChainIndex::new();
        for item in self.links_tree.iter() {
            let (_, value) = item?;
            let link: ChainLink = bincode::deserialize(&value)?;
            index.insert(link)?;
        }
        info!(links = index.len(), "Loaded chain index");
        Ok(index)
    }

    pub fn flush(&self) -> Result<(), StorageError> {
        self.db.flush()?;
        Ok(())
    }
}

fn link_key(height: u64, hash: &Hash) -> Vec<u8> {
    let mut key = Vec::with_capacity(40);
    key.extend_from_slice(&height.to_be_bytes());
    key.extend_from_slice(&hash.0);
    key
}

impl TxIndex for BlockStore {
    fn lookup_tx_index(&self, tx_hash: &Hash) -> Result<Option<DiskPosition>, StorageError> {
        match self.tx_tree.get(tx_hash.0)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    fn read_block_header_and_tx(
        &self,
        position: &DiskPosition,
    ) -> Result<(BlockHeader, Transaction), StorageError> {
        let block = self
            .get_block(&position.block_hash)?
            .ok_or_else(|| StorageError::NotFound(format!("block {}", position.block_hash)))?;
        let tx = block
            .transactions
            .get(position.tx_index as usize)
            .cloned()
            .ok_or_else(|| {
                StorageError::NotFound(format!(
                    "tx {} in block {}",
                    position.tx_index, position.block_hash
                ))
            })?;
        Ok((block.header, tx))
    }
}
