//! Block acceptance pipeline
//! 
//! Classify the header, derive the expected target, check the work or
//! stake proof, extend the stake modifier chain and let the checkpoint
//! tables veto. Pure functions over their inputs; the caller holds
//! whatever lock guards the chain index for the whole pass.

use primitive_types::U256;
use tracing::{debug, warn};

use super::{
    check_coinstake_timestamp, check_proof_of_stake, check_proof_of_work, compute_stake_modifier,
    era_of, next_work_required, stake_modifier_checksum, Block, BlockFlags, BlockHeader, ChainIndex, ChainLink,
    Era, LinkId, NetworkRules, StakeFields, ValidationError, ValidationResult,
};
use crate::constants::MIN_BLOCK_VERSION;
use crate::crypto::{verify_hash_signature, PowHasher};
use crate::storage::{ScriptVerifier, TxIndex};

/// Outcome of a successful `check_block`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedBlock {
    link: ChainLink,
}

impl AcceptedBlock {
    pub fn height(&self) -> u64 {
        self.link.height
    }

    pub fn hash_proof_of_stake(&self) -> U256 {
        self.link.stake.hash_proof_of_stake
    }

    pub fn stake_modifier(&self) -> U256 {
        self.link.stake.stake_modifier
    }

    pub fn stake_modifier_checksum(&self) -> u32 {
        self.link.stake.stake_modifier_checksum
    }

    pub fn flags(&self) -> BlockFlags {
        self.link.header.flags
    }

    /// The link to insert into the chain index
    pub fn into_link(self) -> ChainLink {
        self.link
    }
}

/// Contextual header checks against the chain below `parent`
/// 
/// `header.flags` must already be computed. Returns the header's height.
pub fn check_block_header<H: PowHasher + ?Sized>(
    index: &ChainIndex,
    parent: Option<LinkId>,
    header: &BlockHeader,
    rules: &NetworkRules,
    hasher: &H,
) -> ValidationResult<u64> {
    let params = &rules.params;

    if header.version < MIN_BLOCK_VERSION {
        return Err(ValidationError::ObsoleteVersion(header.version));
    }

    let height = match parent {
        Some(parent) => {
            let parent_link = index.get(parent);
            if header.prev_hash != parent_link.hash {
                return Err(ValidationError::WrongParent {
                    expected: parent_link.hash,
                });
            }
            parent_link.height + 1
        }
        None => {
            if !header.prev_hash.is_zero() {
                return Err(ValidationError::WrongParent {
                    expected: header.prev_hash,
                });
            }
            0
        }
    };

    let hash = header.hash();
    let proof_of_stake = header.is_proof_of_stake();

    if parent.is_some() {
        let era = era_of(height, params);
        if proof_of_stake && era == Era::PreMerge {
            return Err(ValidationError::PosBeforeStaking(height));
        }
        if !proof_of_stake && era == Era::Pos {
            return Err(ValidationError::PowAfterLastPowHeight(height));
        }

        let expected =
            next_work_required(index, parent, header.algorithm(), proof_of_stake, params)?;
        if header.bits != expected {
            warn!(height, %hash, got = header.bits, expected, "Incorrect difficulty");
            return Err(ValidationError::BadDifficulty {
                got: header.bits,
                expected,
            });
        }

        if !proof_of_stake {
            let pow_hash = header
                .pow_hash(hasher)
                .ok_or(ValidationError::UnsupportedAlgorithm(header.algorithm()))?;
            check_proof_of_work(&pow_hash, header.bits, params.pow_limit)?;
        }
    }

    if !rules.checkpoints.check_block(height, &hash, false) {
        return Err(ValidationError::CheckpointMismatch { height, hash });
    }

    Ok(height)
}

/// Full block checks on top of `parent`
pub fn check_block<H, V>(
    index: &ChainIndex,
    parent: Option<LinkId>,
    block: &Block,
    rules: &NetworkRules,
    hasher: &H,
    tx_index: Option<&dyn TxIndex>,
    verifier: &V,
) -> ValidationResult<AcceptedBlock>
where
    H: PowHasher + ?Sized,
    V: ScriptVerifier + ?Sized,
{
    let header = block.classified_header();
    let height = check_block_header(index, parent, &header, rules, hasher)?;
    let hash = header.hash();

    match block.transactions.first() {
        Some(tx) if tx.is_coinbase() => {}
        _ => return Err(ValidationError::MissingCoinbase),
    }
    if block.compute_merkle_root() != header.merkle_root {
        return Err(ValidationError::BadMerkleRoot);
    }

    let mut hash_proof_of_stake = U256::zero();
    let kernel = match block.coinstake() {
        Some(coinstake) => {
            let parent = parent.ok_or(ValidationError::PosBeforeStaking(height))?;

            // Coinstake always has at least two outputs; the second pays the staker.
            let staker_script = &coinstake.outputs[1].script_pubkey;
            verify_hash_signature(staker_script, &hash, &block.signature)?;

            if !check_coinstake_timestamp(header.time, coinstake.time) {
                return Err(ValidationError::CoinstakeTimestamp {
                    block_time: header.time,
                    tx_time: coinstake.time,
                });
            }

            hash_proof_of_stake = check_proof_of_stake(
                index,
                parent,
                header.bits,
                coinstake,
                tx_index,
                verifier,
                &rules.params,
            )?;
            coinstake.inputs[0].prevout.hash.to_u256()
        }
        None => {
            if !block.signature.is_empty() {
                return Err(ValidationError::UnexpectedSignature);
            }
            hash.to_u256()
        }
    };

    let parent_link = parent.map(|id| index.get(id));
    let stake_modifier =
        compute_stake_modifier(parent_link.map(|p| p.stake.stake_modifier), kernel);
    let checksum = stake_modifier_checksum(
        parent_link.map_or(0, |p| p.stake.stake_modifier_checksum),
        header.flags.bits(),
        hash_proof_of_stake,
        stake_modifier,
    );
    if !rules.modifier_checkpoints.check(height, checksum) {
        return Err(ValidationError::ModifierCheckpointMismatch { height, checksum });
    }

    debug!(
        height,
        %hash,
        proof_of_stake = header.is_proof_of_stake(),
        checksum = format_args!("{:#010x}", checksum),
        "Block accepted"
    );

    let stake = StakeFields {
        stake_modifier,
        stake_modifier_checksum: checksum,
        hash_proof_of_stake,
    };
    let link = ChainLink::from_parent(header, parent_link, block.transactions.len() as u64, stake);
    Ok(AcceptedBlock { link })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::{encode_compact, Network};
    use crate::crypto::{compute_merkle_root, Hash, StandardPowHasher};
    use crate::node::create_genesis_block;
    use crate::validation::Transaction;

    struct AnyHash;

    impl PowHasher for AnyHash {
        fn pow_hash(&self, _: crate::consensus::Algorithm, _: &[u8]) -> Option<Hash> {
            Some(Hash::zero())
        }
    }

    fn reject_all(_: &[u8], _: &[u8], _: &Transaction, _: usize) -> bool {
        false
    }

    fn genesis_index(rules: &NetworkRules) -> (ChainIndex, LinkId) {
        let genesis = create_genesis_block(rules.params.network);
        let mut index = ChainIndex::new();
        let link = check_block(&index, None, &genesis, rules, &AnyHash, None, &reject_all).unwrap();
        let id = index.insert(link.into_link()).unwrap();
        (index, id)
    }

    fn pow_block(index: &ChainIndex, parent: LinkId, version: i32, bits: u32) -> Block {
        let parent_link = index.get(parent);
        let coinbase = Transaction::coinbase(parent_link.time() + 150, 50, vec![0xac]);
        let merkle = compute_merkle_root(&[coinbase.hash()]);
        let header = BlockHeader::new(version, parent_link.hash, merkle, parent_link.time() + 150, bits, 0);
        Block::new(header, vec![coinbase])
    }

    #[test]
    fn test_genesis_accepted_with_zero_modifier() {
        let rules = NetworkRules::for_network(Network::Test);
        let (index, id) = genesis_index(&rules);
        let link = index.get(id);
        assert_eq!(link.height, 0);
        assert_eq!(link.hash, rules.params.genesis_hash);
        assert_eq!(link.stake.stake_modifier, U256::zero());
    }

    #[test]
    fn test_pow_block_accepted() {
        let rules = NetworkRules::for_network(Network::Test);
        let (index, genesis) = genesis_index(&rules);
        let block = pow_block(&index, genesis, 12, encode_compact(rules.params.pow_limit));

        let accepted = check_block(&index, Some(genesis), &block, &rules, &AnyHash, None, &reject_all).unwrap();
        assert_eq!(accepted.height(), 1);
        assert_ne!(accepted.stake_modifier(), U256::zero());
        assert_eq!(accepted.hash_proof_of_stake(), U256::zero());
        assert!(!accepted.flags().is_proof_of_stake());
    }

    #[test]
    fn test_wrong_bits_rejected() {
        let rules = NetworkRules::for_network(Network::Test);
        let (index, genesis) = genesis_index(&rules);
        let block = pow_block(&index, genesis, 12, 0x1d00ffff);

        let err = check_block(&index, Some(genesis), &block, &rules, &AnyHash, None, &reject_all).unwrap_err();
        assert!(matches!(err, ValidationError::BadDifficulty { got: 0x1d00ffff, .. }));
    }

    #[test]
    fn test_obsolete_version_rejected() {
        let rules = NetworkRules::for_network(Network::Test);
        let (index, genesis) = genesis_index(&rules);
        let block = pow_block(&index, genesis, 8, encode_compact(rules.params.pow_limit));

        let err = check_block(&index, Some(genesis), &block, &rules, &AnyHash, None, &reject_all).unwrap_err();
        assert!(matches!(err, ValidationError::ObsoleteVersion(8)));
    }

    #[test]
    fn test_x_family_needs_external_hasher() {
        let rules = NetworkRules::for_network(Network::Test);
        let (index, genesis) = genesis_index(&rules);
        let block = pow_block(&index, genesis, 9, encode_compact(rules.params.pow_limit));

        let err = check_block(&index, Some(genesis), &block, &rules, &StandardPowHasher, None, &reject_all)
            .unwrap_err();
        assert!(matches!(err, ValidationError::UnsupportedAlgorithm(_)));
        assert_eq!(err.class(), crate::consensus::ErrorClass::DataUnavailable);
    }

    #[test]
    fn test_pow_block_with_signature_rejected() {
        let rules = NetworkRules::for_network(Network::Test);
        let (index, genesis) = genesis_index(&rules);
        let mut block = pow_block(&index, genesis, 12, encode_compact(rules.params.pow_limit));
        block.signature = vec![0x30];

        let err = check_block(&index, Some(genesis), &block, &rules, &AnyHash, None, &reject_all).unwrap_err();
        assert!(matches!(err, ValidationError::UnexpectedSignature));
    }

    #[test]
    fn test_bad_merkle_root_rejected() {
        let rules = NetworkRules::for_network(Network::Test);
        let (index, genesis) = genesis_index(&rules);
        let mut block = pow_block(&index, genesis, 12, encode_compact(rules.params.pow_limit));
        block.header.merkle_root = Hash::from_bytes([5u8; 32]);

        let err = check_block(&index, Some(genesis), &block, &rules, &AnyHash, None, &reject_all).unwrap_err();
        assert!(matches!(err, ValidationError::BadMerkleRoot));
    }

    #[test]
    fn test_checkpoint_veto() {
        let mut rules = NetworkRules::for_network(Network::Test);
        rules.checkpoints.data.hashes.insert(1, Hash::from_bytes([7u8; 32]));
        let (index, genesis) = genesis_index(&rules);
        let block = pow_block(&index, genesis, 12, encode_compact(rules.params.pow_limit));

        let err = check_block(&index, Some(genesis), &block, &rules, &AnyHash, None, &reject_all).unwrap_err();
        assert!(matches!(err, ValidationError::CheckpointMismatch { height: 1, .. }));
    }

    #[test]
    fn test_real_sha256d_work_is_checked() {
        let rules = NetworkRules::for_network(Network::Test);
        let (index, genesis) = genesis_index(&rules);
        let bits = encode_compact(rules.params.pow_limit);
        let mut block = pow_block(&index, genesis, 12, bits);

        let target = crate::consensus::target_of(bits);
        while block.header.pow_hash(&StandardPowHasher).unwrap().to_u256() <= target {
            block.header.nonce += 1;
        }
        let err = check_block(&index, Some(genesis), &block, &rules, &StandardPowHasher, None, &reject_all)
            .unwrap_err();
        assert!(matches!(err, ValidationError::ProofOfWork(_)));

        while block.header.pow_hash(&StandardPowHasher).unwrap().to_u256() > target {
            block.header.nonce += 1;
        }
        assert!(check_block(&index, Some(genesis), &block, &rules, &StandardPowHasher, None, &reject_all).is_ok());
    }
}
