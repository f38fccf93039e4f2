use std::fmt;

use anyhow::{ensure, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Hash, LightBlock, Validator, ValidatorSet, Vote};

/// Proof that a validator violated a protocol rule at a specific height.
///
/// The taxonomy is sealed: every encode, decode and verify site matches
/// exhaustively over exactly these two variants.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Evidence {
	DuplicateVote(DuplicateVoteEvidence),
	LightClientAttack(LightClientAttackEvidence),
}

/// Two conflicting votes signed by the same validator at the same height and
/// round, plus the timestamp and voting powers captured from the block at the
/// offending height.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateVoteEvidence {
	pub vote_a: Vote,
	pub vote_b: Vote,
	pub total_voting_power: i64,
	pub validator_power: i64,
	pub timestamp: DateTime<Utc>,
}

/// A validator-signed header conflicting with the canonical chain, together
/// with the validators that signed both chains.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightClientAttackEvidence {
	pub conflicting_block: LightBlock,
	pub common_height: i64,
	/// Sorted by descending voting power, ascending address on ties.
	pub byzantine_validators: Vec<Validator>,
	pub total_voting_power: i64,
	pub timestamp: DateTime<Utc>,
}

impl DuplicateVoteEvidence {
	/// Builds evidence out of two conflicting votes, stamped with the time
	/// and voting powers of the block at the offending height. The vote with
	/// the smaller block id is stored first, so the encoding (and therefore
	/// the hash) does not depend on the order the votes arrived in.
	///
	/// Returns `None` if the offending validator is not in `validators`.
	pub fn new(
		vote_a: Vote,
		vote_b: Vote,
		block_time: DateTime<Utc>,
		validators: &ValidatorSet,
	) -> Option<Self> {
		let validator = validators.by_address(&vote_a.validator_address)?;
		let validator_power = validator.voting_power;
		let (vote_a, vote_b) = if vote_a.block_id <= vote_b.block_id {
			(vote_a, vote_b)
		} else {
			(vote_b, vote_a)
		};
		Some(DuplicateVoteEvidence {
			vote_a,
			vote_b,
			total_voting_power: validators.total_voting_power(),
			validator_power,
			timestamp: block_time,
		})
	}
}

impl Evidence {
	/// The height the violation happened at. For light client attacks this is
	/// the last height the two chains agreed on.
	pub fn height(&self) -> i64 {
		match self {
			Evidence::DuplicateVote(ev) => ev.vote_a.height,
			Evidence::LightClientAttack(ev) => ev.common_height,
		}
	}

	pub fn time(&self) -> DateTime<Utc> {
		match self {
			Evidence::DuplicateVote(ev) => ev.timestamp,
			Evidence::LightClientAttack(ev) => ev.timestamp,
		}
	}

	/// Content identity: two evidence items are equivalent iff their hashes
	/// are equal. Duplicate votes hash their canonical encoding; a light
	/// client attack is identified by its conflicting header.
	pub fn hash(&self) -> Hash {
		match self {
			Evidence::DuplicateVote(_) => Hash::of(&self.to_bytes()),
			Evidence::LightClientAttack(ev) => ev.conflicting_block.signed_header.header.hash(),
		}
	}

	/// The canonical encoding persisted in the pending set and gossiped to
	/// peers.
	pub fn to_bytes(&self) -> Vec<u8> {
		bincode::serialize(self).expect("Serialization is not expected to fail")
	}

	pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
		Ok(bincode::deserialize(bytes)?)
	}

	/// Structural validation that needs no chain state. Everything here can
	/// be checked by any replica regardless of how far it has synced.
	pub fn validate_basic(&self) -> Result<()> {
		match self {
			Evidence::DuplicateVote(ev) => {
				ensure!(ev.vote_a.height > 0, "evidence height must be positive");
				ensure!(
					ev.vote_a.height == ev.vote_b.height &&
						ev.vote_a.round == ev.vote_b.round &&
						ev.vote_a.vote_type == ev.vote_b.vote_type,
					"conflicting votes must be for the same height, round and type"
				);
				ensure!(
					ev.vote_a.validator_address == ev.vote_b.validator_address,
					"conflicting votes must come from the same validator"
				);
				ensure!(
					ev.vote_a.block_id != ev.vote_b.block_id,
					"conflicting votes must reference different blocks"
				);
				ensure!(
					ev.validator_power >= 0 && ev.total_voting_power >= 0,
					"voting power must not be negative"
				);
			},
			Evidence::LightClientAttack(ev) => {
				ensure!(ev.common_height > 0, "common height must be positive");
				ensure!(
					ev.common_height <= ev.conflicting_block.signed_header.header.height,
					"common height cannot exceed the conflicting header height"
				);
				ensure!(
					!ev.byzantine_validators.is_empty(),
					"attack evidence must name at least one byzantine validator"
				);
				ensure!(ev.total_voting_power >= 0, "voting power must not be negative");
			},
		}
		Ok(())
	}
}

impl fmt::Display for Evidence {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			Evidence::DuplicateVote(ev) => write!(
				f,
				"DuplicateVoteEvidence {{ height: {}, validator: {} }}",
				ev.vote_a.height, ev.vote_a.validator_address,
			),
			Evidence::LightClientAttack(ev) => write!(
				f,
				"LightClientAttackEvidence {{ common_height: {}, byzantine_validators: {} }}",
				ev.common_height,
				ev.byzantine_validators.len(),
			),
		}
	}
}
