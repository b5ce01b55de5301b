//! Genesis block generation
//! 
//! Each network profile has a fixed, reproducible genesis block. Its hash
//! is pinned by the height-zero checkpoint.

use crate::consensus::{Block, BlockHeader, Network};
use crate::constants::{COIN, MIN_BLOCK_VERSION};
use crate::crypto::{compute_merkle_root, Hash};
use crate::validation::{OutPoint, Transaction, TxInput, TxOutput};

const GENESIS_MESSAGE: &[u8] = b"Hybrid chain genesis: work and stake share one ledger";

/// `OP_0 OP_CHECKSIG`: checks against an empty key, so it can never be spent
const GENESIS_OUTPUT_SCRIPT: [u8; 2] = [0x00, 0xac];

const GENESIS_REWARD: u64 = 50 * COIN;

/// Time, bits and nonce per network
fn genesis_template(network: Network) -> (u32, u32, u32) {
    match network {
        Network::Main => (1_517_270_400, 0x1e0fffff, 0),
        Network::Test => (1_517_270_460, 0x1f00ffff, 0),
    }
}

/// Create the genesis block for `network`
/// 
/// Produces a byte-for-byte identical block on every call.
pub fn create_genesis_block(network: Network) -> Block {
    let (time, bits, nonce) = genesis_template(network);

    let coinbase = Transaction::new(
        time,
        vec![TxInput::new(OutPoint::null(), GENESIS_MESSAGE.to_vec())],
        vec![TxOutput::new(GENESIS_REWARD, GENESIS_OUTPUT_SCRIPT.to_vec())],
    );
    let merkle_root = compute_merkle_root(&[coinbase.hash()]);

    let header = BlockHeader::new(MIN_BLOCK_VERSION, Hash::zero(), merkle_root, time, bits, nonce);
    Block::new(header, vec![coinbase])
}

/// Genesis block hash for `network`
pub fn genesis_hash(network: Network) -> Hash {
    create_genesis_block(network).hash()
}
