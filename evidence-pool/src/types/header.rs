use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{
	vote::{canonical_vote_bytes, VoteType},
	Address, Hash, Signature, ValidatorSet, HASH_SIZE,
};

/// Identifies the block a vote or commit points at.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockId {
	pub hash: Hash,
}

impl BlockId {
	pub fn new(hash: Hash) -> Self {
		BlockId { hash }
	}

	/// The block id of a nil vote.
	pub fn zero() -> Self {
		BlockId { hash: Hash([0; HASH_SIZE]) }
	}

	pub fn is_zero(&self) -> bool {
		*self == Self::zero()
	}
}

/// The block header fields the evidence pool relies on.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
	pub chain_id: String,
	pub height: i64,
	pub time: DateTime<Utc>,
	pub validators_hash: Hash,
	pub app_hash: Vec<u8>,
	pub proposer_address: Address,
}

impl Header {
	pub fn hash(&self) -> Hash {
		Hash::of(&bincode::serialize(self).expect("Serialization is not expected to fail"))
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockIdFlag {
	Absent,
	Commit,
	Nil,
}

/// A single validator's signature within a commit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitSig {
	pub flag: BlockIdFlag,
	pub validator_address: Address,
	pub timestamp: DateTime<Utc>,
	pub signature: Option<Signature>,
}

/// The aggregated precommits that committed a block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
	pub height: i64,
	pub round: i32,
	pub block_id: BlockId,
	pub signatures: Vec<CommitSig>,
}

impl Commit {
	pub fn sig_by_address(&self, address: &Address) -> Option<&CommitSig> {
		self.signatures.iter().find(|sig| sig.validator_address == *address)
	}

	/// Sign bytes of the precommit that `sig` attests to. Nil and absent
	/// signatures sign the zero block id.
	pub fn vote_sign_bytes(&self, chain_id: &str, sig: &CommitSig) -> Vec<u8> {
		let block_id = match sig.flag {
			BlockIdFlag::Commit => self.block_id,
			BlockIdFlag::Absent | BlockIdFlag::Nil => BlockId::zero(),
		};
		canonical_vote_bytes(
			chain_id,
			VoteType::Precommit,
			self.height,
			self.round,
			&block_id,
			sig.timestamp,
		)
	}
}

/// A header with the commit that finalized it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedHeader {
	pub header: Header,
	pub commit: Commit,
}

/// What a light client needs to verify a header: the signed header plus the
/// validator set that signed it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightBlock {
	pub signed_header: SignedHeader,
	pub validator_set: ValidatorSet,
}

/// What the block store serves for a committed height. `header.time` is
/// authoritative for evidence timestamps at historical heights.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockMeta {
	pub block_id: BlockId,
	pub header: Header,
}
