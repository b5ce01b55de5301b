//! Chain index arena
//! 
//! Chain links live in a vector and refer to their parent by `LinkId`.
//! Ancestor walks follow those indices; no link is ever removed, so a
//! detached branch can be reattached without invalidating handles. Each
//! link also keeps a skip pointer, giving logarithmic `get_ancestor`.

use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use super::{block_proof, Algorithm, BlockHeader};
use crate::crypto::Hash;

/// Stable handle of a link inside a [`ChainIndex`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LinkId(pub usize);

/// Chain index errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChainError {
    #[error("Parent block {0} not in index")]
    UnknownParent(Hash),
    #[error("Link {hash} claims height {claimed}, parent implies {expected}")]
    HeightMismatch { hash: Hash, claimed: u64, expected: u64 },
    #[error("Genesis link must be at height 0, got {0}")]
    GenesisHeight(u64),
}

/// Stake-related fields carried by every link
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeFields {
    pub stake_modifier: U256,
    pub stake_modifier_checksum: u32,
    /// Kernel hash of a PoS block, zero for PoW
    pub hash_proof_of_stake: U256,
}

/// Per-block record of the chain index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainLink {
    pub hash: Hash,
    pub height: u64,
    pub header: BlockHeader,
    /// Cumulative work up to and including this block
    pub chain_work: U256,
    /// Cumulative number of transactions
    pub chain_tx: u64,
    pub stake: StakeFields,
}

impl ChainLink {
    /// Build the link for `header` on top of `parent` (`None` for genesis)
    pub fn from_parent(
        header: BlockHeader,
        parent: Option<&ChainLink>,
        tx_count: u64,
        stake: StakeFields,
    ) -> Self {
        let proof = block_proof(header.bits);
        let (height, chain_work, chain_tx) = match parent {
            Some(parent) => (
                parent.height + 1,
                parent.chain_work.saturating_add(proof),
                parent.chain_tx.saturating_add(tx_count),
            ),
            None => (0, proof, tx_count),
        };

        Self {
            hash: header.hash(),
            height,
            header,
            chain_work,
            chain_tx,
            stake,
        }
    }

    pub fn time(&self) -> u32 {
        self.header.time
    }

    pub fn bits(&self) -> u32 {
        self.header.bits
    }

    pub fn version(&self) -> i32 {
        self.header.version
    }

    pub fn is_proof_of_stake(&self) -> bool {
        self.header.is_proof_of_stake()
    }

    pub fn algorithm(&self) -> Algorithm {
        self.header.algorithm()
    }
}

/// Arena of chain links addressed by `LinkId` or block hash
#[derive(Debug, Default, Clone)]
pub struct ChainIndex {
    links: Vec<ChainLink>,
    parents: Vec<Option<LinkId>>,
    skips: Vec<Option<LinkId>>,
    by_hash: HashMap<Hash, LinkId>,
    best: Option<LinkId>,
}

impl ChainIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a link; its parent must already be indexed
    /// 
    /// Re-inserting a known hash returns the existing handle.
    pub fn insert(&mut self, link: ChainLink) -> Result<LinkId, ChainError> {
        if let Some(&id) = self.by_hash.get(&link.hash) {
            return Ok(id);
        }

        let parent = if link.header.prev_hash.is_zero() {
            if link.height != 0 {
                return Err(ChainError::GenesisHeight(link.height));
            }
            None
        } else {
            let parent_id = self
                .lookup_chain_link(&link.header.prev_hash)
                .ok_or(ChainError::UnknownParent(link.header.prev_hash))?;
            let expected = self.get(parent_id).height + 1;
            if link.height != expected {
                return Err(ChainError::HeightMismatch {
                    hash: link.hash,
                    claimed: link.height,
                    expected,
                });
            }
            Some(parent_id)
        };

        let skip = parent.and_then(|p| self.get_ancestor(p, skip_height(link.height)));

        let id = LinkId(self.links.len());
        self.by_hash.insert(link.hash, id);

        let better = match self.best {
            Some(best) => link.chain_work > self.get(best).chain_work,
            None => true,
        };
        self.links.push(link);
        self.parents.push(parent);
        self.skips.push(skip);
        if better {
            self.best = Some(id);
        }

        Ok(id)
    }

    /// Link for a handle produced by this index
    pub fn get(&self, id: LinkId) -> &ChainLink {
        &self.links[id.0]
    }

    pub fn lookup_chain_link(&self, hash: &Hash) -> Option<LinkId> {
        self.by_hash.get(hash).copied()
    }

    pub fn link_by_hash(&self, hash: &Hash) -> Option<&ChainLink> {
        self.lookup_chain_link(hash).map(|id| self.get(id))
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.by_hash.contains_key(hash)
    }

    pub fn parent(&self, id: LinkId) -> Option<LinkId> {
        self.parents[id.0]
    }

    /// Walk from `id` (inclusive) back to genesis
    pub fn ancestors(&self, id: LinkId) -> Ancestors<'_> {
        Ancestors {
            index: self,
            next: Some(id),
        }
    }

    /// Ancestor of `id` at `height`, if the branch reaches that far
    pub fn get_ancestor(&self, id: LinkId, height: u64) -> Option<LinkId> {
        let mut walk = id;
        let mut walk_height = self.get(id).height;
        if height > walk_height {
            return None;
        }

        while walk_height > height {
            let jump = skip_height(walk_height);
            let jump_prev = skip_height(walk_height - 1);
            // Take the skip unless the parent's skip lands closer without overshooting.
            let take_skip = jump == height
                || (jump > height && !(jump_prev + 2 < jump && jump_prev >= height));
            match self.skips[walk.0] {
                Some(skip) if take_skip => {
                    walk = skip;
                    walk_height = jump;
                }
                _ => {
                    walk = self.parents[walk.0]?;
                    walk_height -= 1;
                }
            }
        }
        Some(walk)
    }

    /// Link with the most cumulative work
    pub fn best_tip(&self) -> Option<LinkId> {
        self.best
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

/// Clear the lowest set bit
fn invert_lowest_one(n: u64) -> u64 {
    n & n.wrapping_sub(1)
}

/// Height a link at `height` points its skip pointer at; always below `height`
fn skip_height(height: u64) -> u64 {
    if height < 2 {
        return 0;
    }
    if height & 1 == 1 {
        invert_lowest_one(invert_lowest_one(height - 1)) + 1
    } else {
        invert_lowest_one(height)
    }
}

/// Iterator over a link and its ancestors, newest first
pub struct Ancestors<'a> {
    index: &'a ChainIndex,
    next: Option<LinkId>,
}

impl Iterator for Ancestors<'_> {
    type Item = LinkId;

    fn next(&mut self) -> Option<LinkId> {
        let current = self.next?;
        self.next = self.index.parent(current);
        Some(current)
    }
}
