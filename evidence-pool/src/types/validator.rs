use serde::{Deserialize, Serialize};

use crate::types::{Address, Hash, PublicKey};

/// A validator together with its consensus voting power.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validator {
	pub address: Address,
	pub pub_key: PublicKey,
	pub voting_power: i64,
}

/// The validator set active at some height.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorSet {
	validators: Vec<Validator>,
	total_voting_power: i64,
}

impl ValidatorSet {
	pub fn new(validators: Vec<Validator>) -> Self {
		let total_voting_power = validators.iter().map(|v| v.voting_power).sum();
		ValidatorSet { validators, total_voting_power }
	}

	pub fn validators(&self) -> &[Validator] {
		&self.validators
	}

	pub fn total_voting_power(&self) -> i64 {
		self.total_voting_power
	}

	pub fn len(&self) -> usize {
		self.validators.len()
	}

	pub fn is_empty(&self) -> bool {
		self.validators.is_empty()
	}

	pub fn by_address(&self, address: &Address) -> Option<&Validator> {
		self.validators.iter().find(|v| v.address == *address)
	}

	pub fn has_address(&self, address: &Address) -> bool {
		self.by_address(address).is_some()
	}

	pub fn hash(&self) -> Hash {
		Hash::of(&bincode::serialize(self).expect("Serialization is not expected to fail"))
	}
}

/// Sorts validators by descending voting power, breaking ties by ascending
/// address. This is the canonical order of a byzantine validator list.
pub fn sort_by_voting_power(validators: &mut [Validator]) {
	validators.sort_by(|a, b| {
		b.voting_power.cmp(&a.voting_power).then_with(|| a.address.cmp(&b.address))
	});
}

/// Whether `validators` is in the order [`sort_by_voting_power`] produces.
pub fn is_sorted_by_voting_power(validators: &[Validator]) -> bool {
	validators.windows(2).all(|pair| {
		pair[0].voting_power > pair[1].voting_power ||
			(pair[0].voting_power == pair[1].voting_power && pair[0].address <= pair[1].address)
	})
}
