//! Test fixtures shared across the crate's test modules: deterministic
//! keypairs, signed votes, evidence constructors and in-memory stores.

use std::{collections::BTreeMap, path::PathBuf, sync::Mutex, time::Duration};

use anyhow::anyhow;
use chrono::{DateTime, TimeZone, Utc};
use ed25519_dalek::{Signer, SigningKey};
use tempfile::TempDir;

use crate::{
	evidence::{BlockStore, StateStore},
	types::{
		validator::sort_by_voting_power,
		vote::canonical_vote_bytes,
		BlockId, BlockIdFlag, BlockMeta, ChainState, Commit, CommitSig, DuplicateVoteEvidence,
		Evidence, EvidenceParams, Hash, Header, LightBlock, LightClientAttackEvidence, PublicKey,
		SignedHeader, Signature, Validator, ValidatorSet, Vote, VoteType,
	},
};

pub const TEST_CHAIN_ID: &str = "test-chain";

/// Creates a temp directory and returns the path of a not-yet-existing
/// database file inside it.
pub fn new_temp_directory_with_nonexistent_file() -> (TempDir, PathBuf) {
	let dir = tempfile::tempdir().expect("Should create a temp dir");
	let path = dir.path().join("db");
	(dir, path)
}

/// A deterministic validator keypair.
pub struct TestValidator {
	pub signing_key: SigningKey,
	pub validator: Validator,
}

pub fn test_validator(seed: u8, voting_power: i64) -> TestValidator {
	let signing_key = SigningKey::from_bytes(&[seed; 32]);
	let pub_key = PublicKey(signing_key.verifying_key().to_bytes());
	let validator = Validator { address: pub_key.address(), pub_key, voting_power };
	TestValidator { signing_key, validator }
}

pub fn validator_set(validators: &[&TestValidator]) -> ValidatorSet {
	ValidatorSet::new(validators.iter().map(|v| v.validator.clone()).collect())
}

/// A fixed epoch plus `seconds`, so tests work with small readable offsets.
pub fn test_time(seconds: i64) -> DateTime<Utc> {
	Utc.timestamp_opt(1_600_000_000 + seconds, 0).unwrap()
}

pub fn block_id(tag: u8) -> BlockId {
	BlockId::new(Hash([tag; 32]))
}

pub fn signed_vote(
	validator: &TestValidator,
	vote_type: VoteType,
	height: i64,
	round: i32,
	block_id: BlockId,
	timestamp: DateTime<Utc>,
) -> Vote {
	let mut vote = Vote {
		vote_type,
		height,
		round,
		block_id,
		timestamp,
		validator_address: validator.validator.address,
		validator_index: 0,
		signature: Signature::new(Vec::new()),
	};
	let signature = validator.signing_key.sign(&vote.sign_bytes(TEST_CHAIN_ID));
	vote.signature = Signature::new(signature.to_bytes().to_vec());
	vote
}

/// Two correctly signed conflicting precommits by `validator` at `height`.
pub fn conflicting_votes(
	validator: &TestValidator,
	height: i64,
	timestamp: DateTime<Utc>,
) -> (Vote, Vote) {
	(
		signed_vote(validator, VoteType::Precommit, height, 0, block_id(1), timestamp),
		signed_vote(validator, VoteType::Precommit, height, 0, block_id(2), timestamp),
	)
}

pub fn duplicate_vote_evidence(
	validator: &TestValidator,
	height: i64,
	vote_time: DateTime<Utc>,
	block_time: DateTime<Utc>,
	validators: &ValidatorSet,
) -> Evidence {
	let (vote_a, vote_b) = conflicting_votes(validator, height, vote_time);
	Evidence::DuplicateVote(
		DuplicateVoteEvidence::new(vote_a, vote_b, block_time, validators)
			.expect("the validator should be in the set"),
	)
}

pub fn header(height: i64, time: DateTime<Utc>, validators: &ValidatorSet, tag: u8) -> Header {
	Header {
		chain_id: TEST_CHAIN_ID.to_string(),
		height,
		time,
		validators_hash: validators.hash(),
		app_hash: vec![tag],
		proposer_address: validators.validators()[0].address,
	}
}

pub fn block_meta(header: Header) -> BlockMeta {
	BlockMeta { block_id: BlockId::new(header.hash()), header }
}

/// The canonical commit for `header`, without individual signatures (the
/// pool never recomputes canonical commits, it only needs them to exist).
pub fn canonical_commit(header: &Header) -> Commit {
	Commit {
		height: header.height,
		round: 0,
		block_id: BlockId::new(header.hash()),
		signatures: Vec::new(),
	}
}

/// Light client attack evidence: a conflicting header at `height`, signed by
/// the given byzantine validators, diverging from the canonical chain after
/// `common_height`.
pub fn light_client_attack(
	byzantine: &[&TestValidator],
	common_height: i64,
	height: i64,
	time: DateTime<Utc>,
	validators: &ValidatorSet,
) -> Evidence {
	let conflicting_header = header(height, time, validators, 0xAA);
	let block_id = BlockId::new(conflicting_header.hash());
	let round = 0;

	let signatures = byzantine
		.iter()
		.map(|v| {
			let sign_bytes = canonical_vote_bytes(
				TEST_CHAIN_ID,
				VoteType::Precommit,
				height,
				round,
				&block_id,
				time,
			);
			CommitSig {
				flag: BlockIdFlag::Commit,
				validator_address: v.validator.address,
				timestamp: time,
				signature: Some(Signature::new(
					v.signing_key.sign(&sign_bytes).to_bytes().to_vec(),
				)),
			}
		})
		.collect();

	let commit = Commit { height, round, block_id, signatures };

	let mut byzantine_validators: Vec<Validator> =
		byzantine.iter().map(|v| v.validator.clone()).collect();
	sort_by_voting_power(&mut byzantine_validators);

	Evidence::LightClientAttack(LightClientAttackEvidence {
		conflicting_block: LightBlock {
			signed_header: SignedHeader { header: conflicting_header, commit },
			validator_set: validators.clone(),
		},
		common_height,
		byzantine_validators,
		total_voting_power: validators.total_voting_power(),
		timestamp: time,
	})
}

pub fn evidence_params() -> EvidenceParams {
	EvidenceParams { max_age_num_blocks: 20, max_age_duration: Duration::from_secs(1200) }
}

pub fn chain_state(height: i64, time: DateTime<Utc>, validators: &ValidatorSet) -> ChainState {
	ChainState {
		chain_id: TEST_CHAIN_ID.to_string(),
		last_block_height: height,
		last_block_time: time,
		evidence_params: evidence_params(),
		last_validators: validators.clone(),
	}
}

/// In-memory [`StateStore`].
#[derive(Default)]
pub struct MemoryStateStore {
	state: Mutex<Option<ChainState>>,
	validators: Mutex<BTreeMap<i64, ValidatorSet>>,
}

impl MemoryStateStore {
	pub fn new(state: ChainState) -> Self {
		let store = MemoryStateStore::default();
		store.set_state(state);
		store
	}

	pub fn set_state(&self, state: ChainState) {
		*self.state.lock().unwrap() = Some(state);
	}

	pub fn insert_validators(&self, height: i64, validators: ValidatorSet) {
		self.validators.lock().unwrap().insert(height, validators);
	}
}

impl StateStore for MemoryStateStore {
	fn load(&self) -> anyhow::Result<ChainState> {
		self.state.lock().unwrap().clone().ok_or_else(|| anyhow!("no state stored"))
	}

	fn load_validators(&self, height: i64) -> anyhow::Result<ValidatorSet> {
		self.validators
			.lock()
			.unwrap()
			.get(&height)
			.cloned()
			.ok_or_else(|| anyhow!("no validator set stored at height {height}"))
	}
}

/// In-memory [`BlockStore`].
#[derive(Default)]
pub struct MemoryBlockStore {
	metas: Mutex<BTreeMap<i64, BlockMeta>>,
	commits: Mutex<BTreeMap<i64, Commit>>,
}

impl MemoryBlockStore {
	pub fn insert_meta(&self, height: i64, meta: BlockMeta) {
		self.metas.lock().unwrap().insert(height, meta);
	}

	pub fn insert_commit(&self, height: i64, commit: Commit) {
		self.commits.lock().unwrap().insert(height, commit);
	}
}

impl BlockStore for MemoryBlockStore {
	fn load_block_meta(&self, height: i64) -> Option<BlockMeta> {
		self.metas.lock().unwrap().get(&height).cloned()
	}

	fn load_block_commit(&self, height: i64) -> Option<Commit> {
		self.commits.lock().unwrap().get(&height).cloned()
	}
}
