use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::ValidatorSet;

/// Consensus parameters bounding how long evidence stays actionable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceParams {
	pub max_age_num_blocks: i64,
	pub max_age_duration: Duration,
}

/// Snapshot of the replicated consensus state as of the latest committed
/// block. Handed to the pool on every [`update`](crate::EvidencePool::update).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainState {
	pub chain_id: String,
	pub last_block_height: i64,
	pub last_block_time: DateTime<Utc>,
	pub evidence_params: EvidenceParams,
	pub last_validators: ValidatorSet,
}

impl ChainState {
	/// Evidence is expired only once it is outside the age window on both
	/// axes: enough blocks have passed AND enough wall clock time has passed.
	pub fn is_expired(&self, height: i64, time: DateTime<Utc>) -> bool {
		let age_num_blocks = self.last_block_height - height;
		let age_duration = self.last_block_time.signed_duration_since(time);
		let max_age_duration = chrono::Duration::from_std(self.evidence_params.max_age_duration)
			.expect("max_age_duration should fit a chrono duration");
		age_num_blocks > self.evidence_params.max_age_num_blocks &&
			age_duration > max_age_duration
	}
}

#[cfg(test)]
mod tests {
	use crate::testing::{chain_state, test_time, test_validator, validator_set};

	#[test]
	fn evidence_expires_only_when_both_axes_are_exceeded() {
		let validator = test_validator(1, 10);
		let validators = validator_set(&[&validator]);
		// Fixture params: max_age_num_blocks = 20, max_age_duration = 1200s.
		let state = chain_state(100, test_time(2000), &validators);

		// Old on both axes.
		assert!(state.is_expired(79, test_time(0)));
		// Old by height only.
		assert!(!state.is_expired(79, test_time(1999)));
		// Old by time only.
		assert!(!state.is_expired(99, test_time(0)));
		// Exactly at the boundary is not yet expired.
		assert!(!state.is_expired(80, test_time(800)));
	}
}
