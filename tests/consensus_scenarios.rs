//! End-to-end acceptance scenarios on a synthetic chain
//! 
//! Blocks go through `check_block`, land in a temporary sled store and the
//! chain index, and later blocks stake outputs read back through the store.

use primitive_types::U256;
use hybrid_core::consensus::{
    check_block, next_work_required, Algorithm, Block, BlockHeader, ChainIndex, ErrorClass,
    GenesisPolicy, KernelError, LinkId, ModifierCheckpoints, Network, NetworkRules,
    ValidationError,
};
use hybrid_core::constants::{COIN, STAKE_TIMESTAMP_MASK};
use hybrid_core::crypto::{compute_merkle_root, pay_to_pubkey_script, sign_hash, Hash, PowHasher};
use hybrid_core::node::create_genesis_block;
use hybrid_core::storage::{BlockStore, TxIndex};
use hybrid_core::validation::{OutPoint, Transaction, TxInput, TxOutput};

const STAKER_SECRET: [u8; 32] = [0x11; 32];
const OTHER_SECRET: [u8; 32] = [0x22; 32];

/// Accepts every header; work checks are covered by the unit tests
struct TrustedHasher;

impl PowHasher for TrustedHasher {
    fn pow_hash(&self, _: Algorithm, _: &[u8]) -> Option<Hash> {
        Some(Hash::zero())
    }
}

fn accept_scripts(_: &[u8], _: &[u8], _: &Transaction, _: usize) -> bool {
    true
}

fn staker_script() -> Vec<u8> {
    let (_, pubkey) = sign_hash(&STAKER_SECRET, &Hash::zero()).unwrap();
    pay_to_pubkey_script(&pubkey)
}

/// Rules with a short chain: merge at 30..=32, staking only after 60
fn short_rules() -> NetworkRules {
    let mut rules = NetworkRules::for_network(Network::Test);
    rules.params.merge_start_height = 30;
    rules.params.merge_end_height = 32;
    rules.params.last_pow_height = 60;
    rules.params.stake_min_confirmations = 5;
    rules
}

struct Harness {
    store: BlockStore,
    index: ChainIndex,
    rules: NetworkRules,
    tip: LinkId,
    /// Coinbase of each block by height
    coinbases: Vec<Transaction>,
}

impl Harness {
    fn new(rules: NetworkRules) -> Self {
        let store = BlockStore::open_temporary().unwrap();
        let mut index = ChainIndex::new();
        let genesis = create_genesis_block(rules.params.network);
        let accepted =
            check_block(&index, None, &genesis, &rules, &TrustedHasher, None, &accept_scripts).unwrap();
        store.save_block(&genesis).unwrap();
        let link = accepted.into_link();
        store.save_link(&link).unwrap();
        let tip = index.insert(link).unwrap();

        Self {
            store,
            index,
            rules,
            tip,
            coinbases: vec![genesis.transactions[0].clone()],
        }
    }

    fn tip_hash(&self) -> Hash {
        self.index.get(self.tip).hash
    }

    fn tip_time(&self) -> u32 {
        self.index.get(self.tip).time()
    }

    fn tip_height(&self) -> u64 {
        self.index.get(self.tip).height
    }

    fn check(&self, block: &Block) -> Result<hybrid_core::consensus::AcceptedBlock, ValidationError> {
        check_block(
            &self.index,
            Some(self.tip),
            block,
            &self.rules,
            &TrustedHasher,
            Some(&self.store as &dyn TxIndex),
            &accept_scripts,
        )
    }

    fn accept(&mut self, block: &Block) -> LinkId {
        let accepted = self.check(block).unwrap();
        self.store.save_block(block).unwrap();
        let link = accepted.into_link();
        self.store.save_link(&link).unwrap();
        self.store.set_tip(&link.hash).unwrap();
        self.tip = self.index.insert(link).unwrap();
        self.coinbases.push(block.transactions[0].clone());
        self.tip
    }

    fn pow_block(&self) -> Block {
        self.pow_block_at(self.tip_time() + 150)
    }

    fn pow_block_at(&self, time: u32) -> Block {
        let bits = next_work_required(&self.index, Some(self.tip), Algorithm::Sha256d, false, &self.rules.params)
            .unwrap();
        let coinbase = Transaction::coinbase(time, 1_000 * COIN, staker_script());
        let merkle = compute_merkle_root(&[coinbase.hash()]);
        let header = BlockHeader::new(12, self.tip_hash(), merkle, time, bits, 0);
        Block::new(header, vec![coinbase])
    }

    fn mine(&mut self, count: usize) {
        for _ in 0..count {
            let block = self.pow_block();
            self.accept(&block);
        }
    }

    /// Signed PoS block staking the coinbase output of the block at `from_height`
    fn pos_block(&self, from_height: usize, time: u32, secret: &[u8; 32]) -> Block {
        self.pos_block_spending(&self.coinbases[from_height], time, secret)
    }

    /// Signed PoS block staking output 0 of `spent`
    fn pos_block_spending(&self, spent: &Transaction, time: u32, secret: &[u8; 32]) -> Block {
        let bits = next_work_required(&self.index, Some(self.tip), Algorithm::X12, true, &self.rules.params)
            .unwrap();
        let coinbase = Transaction::coinbase(time, 0, Vec::new());
        let kernel = TxInput::new(OutPoint::new(spent.hash(), 0), vec![0x01]);
        let coinstake = Transaction::coinstake(
            time,
            kernel,
            vec![TxOutput::new(spent.outputs[0].value, staker_script())],
        );

        let merkle = compute_merkle_root(&[coinbase.hash(), coinstake.hash()]);
        let header = BlockHeader::new(9, self.tip_hash(), merkle, time, bits, 0);
        let mut block = Block::new(header, vec![coinbase, coinstake]);
        let (signature, _) = sign_hash(secret, &block.hash()).unwrap();
        block.signature = signature;
        block
    }

    fn stake_time(&self) -> u32 {
        (self.tip_time() + 64 + STAKE_TIMESTAMP_MASK) & !STAKE_TIMESTAMP_MASK
    }
}

#[test]
fn test_pow_chain_through_merge_window() {
    let mut harness = Harness::new(short_rules());
    harness.mine(40);

    assert_eq!(harness.tip_height(), 40);
    let params = &harness.rules.params;
    let floor = hybrid_core::consensus::encode_compact(params.pow_limit);
    for id in harness.index.ancestors(harness.tip) {
        let link = harness.index.get(id);
        assert!(hybrid_core::consensus::target_of(link.bits()) <= params.pow_limit);
        if params.is_merge_height(link.height) {
            assert_eq!(link.bits(), floor);
        }
    }
}

#[test]
fn test_pos_block_accepted() {
    let mut harness = Harness::new(short_rules());
    harness.mine(40);
    let parent_modifier = harness.index.get(harness.tip).stake.stake_modifier;

    let block = harness.pos_block(30, harness.stake_time(), &STAKER_SECRET);
    let accepted = harness.check(&block).unwrap();

    assert!(accepted.flags().is_proof_of_stake());
    assert_ne!(accepted.hash_proof_of_stake(), U256::zero());
    assert_ne!(accepted.stake_modifier(), parent_modifier);
    assert_eq!(accepted.height(), 41);

    let id = harness.accept(&block);
    assert!(harness.index.get(id).is_proof_of_stake());
    assert_eq!(harness.index.get(id).algorithm(), Algorithm::X12);
}

#[test]
fn test_stake_depth_threshold() {
    let mut harness = Harness::new(short_rules());
    harness.mine(40);
    let time = harness.stake_time();

    // Next height 41, four confirmations required.
    let at_threshold = harness.pos_block(37, time, &STAKER_SECRET);
    assert!(harness.check(&at_threshold).is_ok());

    let too_young = harness.pos_block(38, time, &STAKER_SECRET);
    let err = harness.check(&too_young).unwrap_err();
    assert!(matches!(
        err,
        ValidationError::ProofOfStake(KernelError::InsufficientDepth { depth: 3, required: 4 })
    ));
    assert_eq!(err.class(), ErrorClass::Consensus);
}

#[test]
fn test_pos_before_merge_rejected() {
    let mut harness = Harness::new(short_rules());
    harness.mine(20);

    let block = harness.pos_block(5, harness.stake_time(), &STAKER_SECRET);
    assert!(matches!(harness.check(&block), Err(ValidationError::PosBeforeStaking(21))));
}

#[test]
fn test_pow_after_last_pow_height_rejected() {
    let mut harness = Harness::new(short_rules());
    harness.mine(60);

    let block = harness.pow_block();
    assert!(matches!(harness.check(&block), Err(ValidationError::PowAfterLastPowHeight(61))));
}

#[test]
fn test_pos_block_signed_by_stranger_rejected() {
    let mut harness = Harness::new(short_rules());
    harness.mine(40);

    let block = harness.pos_block(30, harness.stake_time(), &OTHER_SECRET);
    let err = harness.check(&block).unwrap_err();
    assert!(matches!(err, ValidationError::BadSignature(_)));
    assert_eq!(err.class(), ErrorClass::Consensus);
}

#[test]
fn test_unmasked_coinstake_time_rejected() {
    let mut harness = Harness::new(short_rules());
    harness.mine(40);

    let block = harness.pos_block(30, harness.stake_time() + 1, &STAKER_SECRET);
    assert!(matches!(harness.check(&block), Err(ValidationError::CoinstakeTimestamp { .. })));
}

#[test]
fn test_missing_tx_index_is_data_unavailable() {
    let mut harness = Harness::new(short_rules());
    harness.mine(40);

    let block = harness.pos_block(30, harness.stake_time(), &STAKER_SECRET);
    let err = check_block(
        &harness.index,
        Some(harness.tip),
        &block,
        &harness.rules,
        &TrustedHasher,
        None,
        &accept_scripts,
    )
    .unwrap_err();
    assert!(matches!(err, ValidationError::ProofOfStake(KernelError::IndexUnavailable)));
    assert_eq!(err.class(), ErrorClass::DataUnavailable);
}

#[test]
fn test_rejected_kernel_script() {
    let mut harness = Harness::new(short_rules());
    harness.mine(40);

    let block = harness.pos_block(30, harness.stake_time(), &STAKER_SECRET);
    let reject = |_: &[u8], _: &[u8], _: &Transaction, _: usize| false;
    let err = check_block(
        &harness.index,
        Some(harness.tip),
        &block,
        &harness.rules,
        &TrustedHasher,
        Some(&harness.store as &dyn TxIndex),
        &reject,
    )
    .unwrap_err();
    assert!(matches!(err, ValidationError::ProofOfStake(KernelError::SignatureRejected)));
}

#[test]
fn test_checkpoint_mismatch_rejected() {
    let mut rules = short_rules();
    rules.checkpoints.data.hashes.insert(5, Hash::from_bytes([0xab; 32]));
    let mut harness = Harness::new(rules);
    harness.mine(4);

    let block = harness.pow_block();
    assert!(matches!(
        harness.check(&block),
        Err(ValidationError::CheckpointMismatch { height: 5, .. })
    ));
}

#[test]
fn test_modifier_checkpoint_mismatch_rejected() {
    let mut rules = short_rules();
    let mut checksums = rules.modifier_checkpoints.checksums.clone();
    checksums.insert(3, 0xdead_beef);
    rules.modifier_checkpoints = ModifierCheckpoints::new(checksums, GenesisPolicy::Exempt);
    let mut harness = Harness::new(rules);
    harness.mine(2);

    let block = harness.pow_block();
    let err = harness.check(&block).unwrap_err();
    assert!(matches!(err, ValidationError::ModifierCheckpointMismatch { height: 3, .. }));
}

#[test]
fn test_genesis_modifier_checkpoint_policies() {
    let mut checksums = std::collections::BTreeMap::new();
    checksums.insert(0, 0x0bad_c0de);
    let genesis = create_genesis_block(Network::Test);

    let mut rules = short_rules();
    rules.modifier_checkpoints = ModifierCheckpoints::new(checksums.clone(), GenesisPolicy::Exempt);
    assert!(check_block(&ChainIndex::new(), None, &genesis, &rules, &TrustedHasher, None, &accept_scripts).is_ok());

    rules.modifier_checkpoints = ModifierCheckpoints::new(checksums, GenesisPolicy::Enforce);
    let err = check_block(&ChainIndex::new(), None, &genesis, &rules, &TrustedHasher, None, &accept_scripts)
        .unwrap_err();
    assert!(matches!(err, ValidationError::ModifierCheckpointMismatch { height: 0, .. }));

    // The built-in table carries the real genesis checksum, so enforcing it passes.
    let builtin = ModifierCheckpoints::for_network(Network::Test);
    rules.modifier_checkpoints = ModifierCheckpoints::new(builtin.checksums, GenesisPolicy::Enforce);
    assert!(check_block(&ChainIndex::new(), None, &genesis, &rules, &TrustedHasher, None, &accept_scripts).is_ok());
}

#[test]
fn test_chain_index_survives_reload() {
    let mut harness = Harness::new(short_rules());
    harness.mine(40);
    let block = harness.pos_block(30, harness.stake_time(), &STAKER_SECRET);
    harness.accept(&block);

    let reloaded = harness.store.load_chain_index().unwrap();
    let tip = reloaded.best_tip().unwrap();
    let original = harness.index.get(harness.tip);

    assert_eq!(reloaded.len(), harness.index.len());
    assert_eq!(reloaded.get(tip), original);
    assert_eq!(harness.store.tip().unwrap(), Some(original.hash));
}

#[test]
fn test_stake_from_side_branch_rejected() {
    let mut harness = Harness::new(short_rules());
    harness.mine(34);
    let fork_point = harness.tip;
    harness.mine(1);
    let main_35 = harness.tip;

    // Sibling of block 35, stored and indexed like any other block.
    harness.tip = fork_point;
    let sibling = harness.pow_block_at(harness.tip_time() + 151);
    let accepted = harness.check(&sibling).unwrap();
    harness.store.save_block(&sibling).unwrap();
    let sibling_id = harness.index.insert(accepted.into_link()).unwrap();
    harness.tip = main_35;

    harness.mine(5);
    assert!(!harness.index.ancestors(harness.tip).any(|id| id == sibling_id));

    // Deep enough by height alone, but not on the chain being extended.
    let block = harness.pos_block_spending(&sibling.transactions[0], harness.stake_time(), &STAKER_SECRET);
    let err = harness.check(&block).unwrap_err();
    assert!(matches!(
        err,
        ValidationError::ProofOfStake(KernelError::NotInChain(hash)) if hash == sibling.hash()
    ));
    assert_eq!(err.class(), ErrorClass::Consensus);

    // The same height on the main branch stakes fine.
    let block = harness.pos_block(35, harness.stake_time(), &STAKER_SECRET);
    assert!(harness.check(&block).is_ok());
}
