//! Block structure for the hybrid chain
//! 
//! The 80-byte header is the hashed form. `flags` and `flags_computed`
//! cache classification results and only appear in the on-disk form.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{algorithm_of, entropy_bit, Algorithm};
use crate::constants::HEADER_SIZE;
use crate::crypto::{compute_merkle_root, Hash, PowHasher};
use crate::validation::Transaction;

/// Size of the on-disk header: hashed form + flags + computed marker
pub const DISK_HEADER_SIZE: usize = HEADER_SIZE + 4 + 1;

/// Header decoding errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Header too short: {got} bytes, need {need}")]
    TooShort { got: usize, need: usize },
    #[error("Invalid flags-computed marker {0}")]
    InvalidMarker(u8),
}

/// Cached per-block classification bits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockFlags(pub u32);

impl BlockFlags {
    pub const PROOF_OF_STAKE: u32 = 1 << 0;
    pub const STAKE_ENTROPY: u32 = 1 << 1;
    /// Developer/special block
    pub const SPECIAL: u32 = 1 << 2;

    pub fn contains(&self, bit: u32) -> bool {
        self.0 & bit != 0
    }

    pub fn set(&mut self, bit: u32, on: bool) {
        if on {
            self.0 |= bit;
        } else {
            self.0 &= !bit;
        }
    }

    pub fn is_proof_of_stake(&self) -> bool {
        self.contains(Self::PROOF_OF_STAKE)
    }

    pub fn stake_entropy_bit(&self) -> u32 {
        u32::from(self.contains(Self::STAKE_ENTROPY))
    }

    pub fn bits(&self) -> u32 {
        self.0
    }
}

/// Block header containing all metadata
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockHeader {
    /// Protocol version, also selects the mining algorithm
    pub version: i32,
    /// Hash of the previous block
    pub prev_hash: Hash,
    /// Merkle root of all transactions
    pub merkle_root: Hash,
    /// Block timestamp (seconds since Unix epoch)
    pub time: u32,
    /// Difficulty target (compact representation)
    pub bits: u32,
    /// Nonce used for PoW
    pub nonce: u32,
    /// Cached classification, never hashed
    pub flags: BlockFlags,
    /// Whether `flags` has been filled in
    pub flags_computed: bool,
}

impl BlockHeader {
    /// Create a new block header
    pub fn new(
        version: i32,
        prev_hash: Hash,
        merkle_root: Hash,
        time: u32,
        bits: u32,
        nonce: u32,
    ) -> Self {
        Self {
            version,
            prev_hash,
            merkle_root,
            time,
            bits,
            nonce,
            flags: BlockFlags::default(),
            flags_computed: false,
        }
    }

    /// Serialize the header for hashing
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[0..4].copy_from_slice(&self.version.to_le_bytes());
        bytes[4..36].copy_from_slice(&self.prev_hash.0);
        bytes[36..68].copy_from_slice(&self.merkle_root.0);
        bytes[68..72].copy_from_slice(&self.time.to_le_bytes());
        bytes[72..76].copy_from_slice(&self.bits.to_le_bytes());
        bytes[76..80].copy_from_slice(&self.nonce.to_le_bytes());
        bytes
    }

    /// Serialize the header with its cached flags for local storage
    pub fn to_disk_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(DISK_HEADER_SIZE);
        bytes.extend_from_slice(&self.to_bytes());
        bytes.extend_from_slice(&(self.flags.0 as i32).to_le_bytes());
        bytes.push(u8::from(self.flags_computed));
        bytes
    }

    /// Parse the on-disk form written by [`BlockHeader::to_disk_bytes`]
    pub fn from_disk_bytes(bytes: &[u8]) -> Result<Self, ParseError> {
        if bytes.len() < DISK_HEADER_SIZE {
            return Err(ParseError::TooShort {
                got: bytes.len(),
                need: DISK_HEADER_SIZE,
            });
        }

        let word = |at: usize| [bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]];
        let mut prev_hash = [0u8; 32];
        prev_hash.copy_from_slice(&bytes[4..36]);
        let mut merkle_root = [0u8; 32];
        merkle_root.copy_from_slice(&bytes[36..68]);

        let flags_computed = match bytes[84] {
            0 => false,
            1 => true,
            other => return Err(ParseError::InvalidMarker(other)),
        };

        Ok(Self {
            version: i32::from_le_bytes(word(0)),
            prev_hash: Hash(prev_hash),
            merkle_root: Hash(merkle_root),
            time: u32::from_le_bytes(word(68)),
            bits: u32::from_le_bytes(word(72)),
            nonce: u32::from_le_bytes(word(76)),
            flags: BlockFlags(i32::from_le_bytes(word(80)) as u32),
            flags_computed,
        })
    }

    /// Calculate the hash of this header (block id)
    pub fn hash(&self) -> Hash {
        crate::crypto::hash_bytes(&self.to_bytes())
    }

    /// Mining algorithm; proof-of-stake blocks are pinned to X12
    pub fn algorithm(&self) -> Algorithm {
        algorithm_of(self.version, self.flags.is_proof_of_stake())
    }

    /// Proof-of-work hash under this header's algorithm
    pub fn pow_hash<H: PowHasher + ?Sized>(&self, hasher: &H) -> Option<Hash> {
        hasher.pow_hash(self.algorithm(), &self.to_bytes())
    }

    pub fn is_proof_of_stake(&self) -> bool {
        self.flags.is_proof_of_stake()
    }
}

/// A complete block containing header and transactions
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Block {
    /// Block header
    pub header: BlockHeader,
    /// List of transactions in this block
    pub transactions: Vec<Transaction>,
    /// Signature by the coinstake owner (empty for PoW blocks)
    pub signature: Vec<u8>,
}

impl Block {
    /// Create a new block with flags computed from its contents
    pub fn new(header: BlockHeader, transactions: Vec<Transaction>) -> Self {
        let mut block = Self {
            header,
            transactions,
            signature: Vec::new(),
        };
        block.compute_flags();
        block
    }

    /// Get the block hash
    pub fn hash(&self) -> Hash {
        self.header.hash()
    }

    /// Proof-of-stake iff the second transaction is a coinstake
    pub fn is_proof_of_stake(&self) -> bool {
        self.transactions.len() > 1 && self.transactions[1].is_coinstake()
    }

    pub fn coinstake(&self) -> Option<&Transaction> {
        if self.is_proof_of_stake() {
            self.transactions.get(1)
        } else {
            None
        }
    }

    /// Header with flags derived from the block body rather than taken on trust
    pub fn classified_header(&self) -> BlockHeader {
        let mut header = self.header.clone();
        header.flags.set(BlockFlags::PROOF_OF_STAKE, self.is_proof_of_stake());
        header.flags.set(BlockFlags::STAKE_ENTROPY, entropy_bit(&self.hash()) == 1);
        header.flags_computed = true;
        header
    }

    /// Fill the header's cached flags from the block contents
    pub fn compute_flags(&mut self) {
        self.header = self.classified_header();
    }

    /// Merkle root over the contained transaction ids
    pub fn compute_merkle_root(&self) -> Hash {
        let hashes: Vec<Hash> = self.transactions.iter().map(|tx| tx.hash()).collect();
        compute_merkle_root(&hashes)
    }

    /// Check if this is the genesis block
    pub fn is_genesis(&self) -> bool {
        self.header.prev_hash == Hash::zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::hash_bytes;
    use crate::validation::{OutPoint, TxInput, TxOutput};

    fn header() -> BlockHeader {
        BlockHeader::new(12, Hash::zero(), hash_bytes(b"merkle"), 1234567890, 0x1e0fffff, 42)
    }

    #[test]
    fn test_block_header_serialization() {
        let bytes = header().to_bytes();
        assert_eq!(bytes.len(), 80);
        assert_eq!(&bytes[0..4], &12i32.to_le_bytes());
        assert_eq!(&bytes[76..80], &42u32.to_le_bytes());
    }

    #[test]
    fn test_flags_excluded_from_hash() {
        let plain = header();
        let mut flagged = header();
        flagged.flags = BlockFlags(BlockFlags::SPECIAL | BlockFlags::STAKE_ENTROPY);
        flagged.flags_computed = true;

        assert_eq!(plain.hash(), flagged.hash());
        assert_ne!(plain.to_disk_bytes(), flagged.to_disk_bytes());
    }

    #[test]
    fn test_disk_form_roundtrip() {
        let mut original = header();
        original.flags = BlockFlags(BlockFlags::PROOF_OF_STAKE);
        original.flags_computed = true;

        let bytes = original.to_disk_bytes();
        assert_eq!(bytes.len(), DISK_HEADER_SIZE);
        assert_eq!(BlockHeader::from_disk_bytes(&bytes), Ok(original));
    }

    #[test]
    fn test_disk_form_rejects_bad_input() {
        assert_eq!(
            BlockHeader::from_disk_bytes(&[0u8; 80]),
            Err(ParseError::TooShort { got: 80, need: DISK_HEADER_SIZE })
        );

        let mut bytes = header().to_disk_bytes();
        bytes[84] = 7;
        assert_eq!(BlockHeader::from_disk_bytes(&bytes), Err(ParseError::InvalidMarker(7)));
    }

    #[test]
    fn test_proof_of_stake_pins_algorithm() {
        let mut pos = header();
        assert_eq!(pos.algorithm(), Algorithm::Sha256d);
        pos.flags.set(BlockFlags::PROOF_OF_STAKE, true);
        assert_eq!(pos.algorithm(), Algorithm::X12);
    }

    #[test]
    fn test_block_classification() {
        let coinbase = Transaction::coinbase(16, 0, vec![]);
        let pow = Block::new(header(), vec![coinbase.clone()]);
        assert!(!pow.is_proof_of_stake());
        assert!(!pow.header.is_proof_of_stake());
        assert!(pow.header.flags_computed);

        let kernel = TxInput::new(OutPoint::new(hash_bytes(b"prev"), 0), vec![]);
        let coinstake = Transaction::coinstake(16, kernel, vec![TxOutput::new(5, vec![])]);
        let pos = Block::new(header(), vec![coinbase, coinstake]);
        assert!(pos.is_proof_of_stake());
        assert!(pos.header.is_proof_of_stake());
        assert!(pos.coinstake().is_some());
    }

    #[test]
    fn test_entropy_flag_follows_hash() {
        let block = Block::new(header(), vec![]);
        assert_eq!(block.header.flags.stake_entropy_bit(), entropy_bit(&block.hash()));
    }

    #[test]
    fn test_genesis_block_detection() {
        let block = Block::new(header(), vec![]);
        assert!(block.is_genesis());
    }
}
