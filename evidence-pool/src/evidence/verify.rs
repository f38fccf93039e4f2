
use crate::{
	evidence::{error::Error, BlockStore, StateStore},
	types::{
		validator::is_sorted_by_voting_power, BlockIdFlag, ChainState, DuplicateVoteEvidence,
		Evidence, LightClientAttackEvidence,
	},
};

/// Recomputes `ev` against authoritative history and returns `Ok` only if it
/// proves real misbehavior that is still inside the evidence age window.
///
/// This is the single verification entry point: both the gossip ingest path
/// and block validation go through it. Evidence built from the consensus
/// buffer skips it, because consensus already validated those votes.
pub fn verify(
	ev: &Evidence,
	state: &ChainState,
	block_store: &dyn BlockStore,
	state_store: &dyn StateStore,
) -> Result<(), Error> {
	ev.validate_basic().map_err(|e| Error::invalid(ev, e.to_string()))?;

	if state.is_expired(ev.height(), ev.time()) {
		return Err(Error::invalid(
			ev,
			format!(
				"evidence from height {} ({}) is outside the max age window (last block height {}, time {})",
				ev.height(),
				ev.time(),
				state.last_block_height,
				state.last_block_time,
			),
		));
	}

	match ev {
		Evidence::DuplicateVote(duplicate) =>
			verify_duplicate_vote(ev, duplicate, state, block_store, state_store),
		Evidence::LightClientAttack(attack) =>
			verify_light_client_attack(ev, attack, state, block_store, state_store),
	}
}

fn verify_duplicate_vote(
	ev: &Evidence,
	duplicate: &DuplicateVoteEvidence,
	state: &ChainState,
	block_store: &dyn BlockStore,
	state_store: &dyn StateStore,
) -> Result<(), Error> {
	let height = duplicate.vote_a.height;

	let validators = state_store
		.load_validators(height)
		.map_err(|e| Error::invalid(ev, format!("no validator set at height {height}: {e}")))?;
	let block_meta = block_store
		.load_block_meta(height)
		.ok_or_else(|| Error::invalid(ev, format!("no committed block at height {height}")))?;

	// The timestamp everyone agreed on is the one of the block at the
	// offending height.
	if duplicate.timestamp != block_meta.header.time {
		return Err(Error::invalid(
			ev,
			format!(
				"evidence time {} does not match the block time {}",
				duplicate.timestamp, block_meta.header.time,
			),
		));
	}

	let validator = validators.by_address(&duplicate.vote_a.validator_address).ok_or_else(
		|| Error::invalid(ev, "validator was not in the set at the offending height"),
	)?;
	if duplicate.validator_power != validator.voting_power {
		return Err(Error::invalid(
			ev,
			format!(
				"validator power {} does not match the set ({})",
				duplicate.validator_power, validator.voting_power,
			),
		));
	}
	if duplicate.total_voting_power != validators.total_voting_power() {
		return Err(Error::invalid(
			ev,
			format!(
				"total voting power {} does not match the set ({})",
				duplicate.total_voting_power,
				validators.total_voting_power(),
			),
		));
	}

	for vote in [&duplicate.vote_a, &duplicate.vote_b] {
		if !vote.verify_signature(&state.chain_id, &validator.pub_key) {
			return Err(Error::invalid(ev, "invalid signature on conflicting vote"));
		}
	}

	Ok(())
}

fn verify_light_client_attack(
	ev: &Evidence,
	attack: &LightClientAttackEvidence,
	state: &ChainState,
	block_store: &dyn BlockStore,
	state_store: &dyn StateStore,
) -> Result<(), Error> {
	let common_height = attack.common_height;

	let validators = state_store.load_validators(common_height).map_err(|e| {
		Error::invalid(ev, format!("no validator set at height {common_height}: {e}"))
	})?;
	let block_meta = block_store.load_block_meta(common_height).ok_or_else(|| {
		Error::invalid(ev, format!("no committed block at height {common_height}"))
	})?;
	if block_store.load_block_commit(common_height).is_none() {
		return Err(Error::invalid(ev, format!("no canonical commit at height {common_height}")));
	}

	if attack.timestamp != block_meta.header.time {
		return Err(Error::invalid(
			ev,
			format!(
				"evidence time {} does not match the block time {}",
				attack.timestamp, block_meta.header.time,
			),
		));
	}

	// The header is only evidence if it diverges from the canonical chain.
	let conflicting_header = &attack.conflicting_block.signed_header.header;
	if let Some(canonical) = block_store.load_block_meta(conflicting_header.height) {
		if canonical.block_id.hash == conflicting_header.hash() {
			return Err(Error::invalid(ev, "the header does not conflict with the canonical chain"));
		}
	}
	if attack.total_voting_power != validators.total_voting_power() {
		return Err(Error::invalid(
			ev,
			format!(
				"total voting power {} does not match the set ({})",
				attack.total_voting_power,
				validators.total_voting_power(),
			),
		));
	}
	if !is_sorted_by_voting_power(&attack.byzantine_validators) {
		return Err(Error::invalid(ev, "byzantine validators are not sorted by voting power"));
	}

	let commit = &attack.conflicting_block.signed_header.commit;
	for byzantine in &attack.byzantine_validators {
		let known = validators.by_address(&byzantine.address).ok_or_else(|| {
			Error::invalid(
				ev,
				format!(
					"byzantine validator {} was not in the set at height {common_height}",
					byzantine.address,
				),
			)
		})?;
		if known.voting_power != byzantine.voting_power {
			return Err(Error::invalid(
				ev,
				format!(
					"byzantine validator {} power {} does not match the set ({})",
					byzantine.address, byzantine.voting_power, known.voting_power,
				),
			));
		}

		// Byzantine means: actually signed the conflicting header.
		let commit_sig = commit
			.sig_by_address(&byzantine.address)
			.filter(|sig| sig.flag == BlockIdFlag::Commit)
			.ok_or_else(|| {
				Error::invalid(
					ev,
					format!(
						"byzantine validator {} did not sign the conflicting header",
						byzantine.address,
					),
				)
			})?;
		let Some(signature) = &commit_sig.signature else {
			return Err(Error::invalid(
				ev,
				format!("commit signature of byzantine validator {} is missing", byzantine.address),
			));
		};
		if !known.pub_key.verify(&commit.vote_sign_bytes(&state.chain_id, commit_sig), signature) {
			return Err(Error::invalid(
				ev,
				format!("invalid commit signature of byzantine validator {}", byzantine.address),
			));
		}
	}

	Ok(())
}
