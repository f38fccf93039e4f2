use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Address, BlockId, PublicKey, Signature};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoteType {
	Prevote,
	Precommit,
}

/// A single signed consensus vote.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
	pub vote_type: VoteType,
	pub height: i64,
	pub round: i32,
	pub block_id: BlockId,
	pub timestamp: DateTime<Utc>,
	pub validator_address: Address,
	pub validator_index: i32,
	pub signature: Signature,
}

/// The portion of a vote covered by the validator's signature. Commit
/// signatures sign the same structure, so both go through
/// [`canonical_vote_bytes`].
#[derive(Serialize)]
struct CanonicalVote<'a> {
	chain_id: &'a str,
	vote_type: VoteType,
	height: i64,
	round: i32,
	block_id: &'a BlockId,
	timestamp: DateTime<Utc>,
}

pub(crate) fn canonical_vote_bytes(
	chain_id: &str,
	vote_type: VoteType,
	height: i64,
	round: i32,
	block_id: &BlockId,
	timestamp: DateTime<Utc>,
) -> Vec<u8> {
	bincode::serialize(&CanonicalVote { chain_id, vote_type, height, round, block_id, timestamp })
		.expect("Serialization is not expected to fail")
}

impl Vote {
	pub fn sign_bytes(&self, chain_id: &str) -> Vec<u8> {
		canonical_vote_bytes(
			chain_id,
			self.vote_type,
			self.height,
			self.round,
			&self.block_id,
			self.timestamp,
		)
	}

	pub fn verify_signature(&self, chain_id: &str, pub_key: &PublicKey) -> bool {
		pub_key.verify(&self.sign_bytes(chain_id), &self.signature)
	}
}
