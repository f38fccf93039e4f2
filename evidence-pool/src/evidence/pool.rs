
use std::{
	collections::HashSet,
	sync::{
		atomic::{AtomicUsize, Ordering},
		Arc, Mutex, MutexGuard,
	},
};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::{
	evidence::{broadcast::BroadcastQueue, error::Error, verify::verify, BlockStore, StateStore},
	metrics::{EVIDENCE_POOL_SIZE, EVIDENCE_REJECTED},
	store::{
		keys::{committed_key, pending_key, PENDING_PREFIX, PREFIX_SIZE},
		KeyValueStore,
	},
	types::{
		validator::sort_by_voting_power, ChainState, DuplicateVoteEvidence, Evidence, Vote,
	},
};

/// The pool of evidence of byzantine behavior.
///
/// The pool is the source of truth feeding block proposers: proposers read
/// [`pending_evidence`](Self::pending_evidence) to include evidence in new
/// blocks so offenders can be slashed. It ingests evidence gossiped by peers
/// ([`add_evidence`](Self::add_evidence)), buffers conflicting votes observed
/// by consensus mid-height
/// ([`report_conflicting_votes`](Self::report_conflicting_votes)), and is
/// reconciled by the block executor once per committed block
/// ([`update`](Self::update)).
///
/// All operations take `&self` and are safe to call from gossip, RPC and
/// consensus threads concurrently; `update` must only be called by the block
/// executor, in height order.
pub struct EvidencePool {
	store: Arc<KeyValueStore>,
	state_store: Arc<dyn StateStore>,
	block_store: Arc<dyn BlockStore>,

	/// Coarse lock over the cached consensus state, the consensus buffer and
	/// the pruning cursor.
	inner: Mutex<Inner>,

	/// Number of items in the pending set, kept separate from store
	/// iteration so `size` is O(1) and lock free.
	evidence_size: AtomicUsize,

	/// Pending evidence in insertion order, iterated by gossip loops.
	broadcast: BroadcastQueue,
}

struct Inner {
	state: ChainState,
	/// Conflicting vote pairs reported by consensus mid-height. They only
	/// become evidence once the offending height commits, when their
	/// timestamp and validator set are final.
	consensus_buffer: Vec<(Vote, Vote)>,
	/// Earliest `(height, time)` at which a pending item can expire next;
	/// pruning is skipped until the committed chain passes this cursor.
	pruning_height: i64,
	pruning_time: DateTime<Utc>,
}

impl EvidencePool {
	/// Creates the pool on top of an opened store, loading the current
	/// consensus state. Pending evidence left behind by a previous run is
	/// recovered by scanning the pending key space, rebuilding the size
	/// counter and the broadcast queue.
	pub fn new(
		store: Arc<KeyValueStore>,
		state_store: Arc<dyn StateStore>,
		block_store: Arc<dyn BlockStore>,
	) -> Result<Self> {
		let state = state_store.load().context("Failed to load the current consensus state")?;

		let pool = EvidencePool {
			store,
			state_store,
			block_store,
			inner: Mutex::new(Inner {
				state,
				consensus_buffer: Vec::new(),
				pruning_height: 0,
				pruning_time: DateTime::<Utc>::MIN_UTC,
			}),
			evidence_size: AtomicUsize::new(0),
			broadcast: BroadcastQueue::new(),
		};

		let pending = pool
			.list_evidence(PENDING_PREFIX, -1)
			.context("Failed to scan the pending evidence key space")?;
		pool.evidence_size.store(pending.len(), Ordering::SeqCst);
		for evidence in pending {
			pool.broadcast.push_back(evidence);
		}
		EVIDENCE_POOL_SIZE.set(pool.size() as i64);

		Ok(pool)
	}

	/// Ingest one piece of evidence received from a peer or over RPC.
	/// Evidence that is already pending or already committed is a silent
	/// no-op: the sender is merely behind, not misbehaving.
	pub fn add_evidence(&self, evidence: Evidence) -> Result<(), Error> {
		if self.is_pending(&evidence) {
			debug!("Evidence already pending: {evidence}");
			return Ok(());
		}
		if self.is_committed(&evidence) {
			debug!("Evidence was already committed: {evidence}");
			return Ok(());
		}

		let state = self.state();
		verify(&evidence, &state, &*self.block_store, &*self.state_store).map_err(|e| {
			EVIDENCE_REJECTED.with_label_values(&["invalid"]).inc();
			e
		})?;

		self.add_pending(&evidence)?;
		info!("Verified new evidence of byzantine behavior: {evidence}");
		Ok(())
	}

	/// Buffer a conflicting vote pair observed by consensus mid-height.
	///
	/// The votes are not verified here; consensus must only report pairs it
	/// has already validated. Nothing is persisted until the next
	/// [`update`](Self::update), when the offending height has committed.
	pub fn report_conflicting_votes(&self, vote_a: Vote, vote_b: Vote) {
		self.lock_inner().consensus_buffer.push((vote_a, vote_b));
	}

	/// Validate the evidence list of a proposed block. Fails if any item is
	/// neither in the pool nor independently verifiable, or if the block
	/// carries the same evidence twice.
	pub fn check_evidence(&self, evidence_list: &[Evidence]) -> Result<(), Error> {
		let mut hashes = HashSet::with_capacity(evidence_list.len());
		for evidence in evidence_list {
			if !self.fast_check(evidence) {
				if self.is_committed(evidence) {
					return Err(Error::invalid(evidence, "evidence was already committed"));
				}
				let state = self.state();
				verify(evidence, &state, &*self.block_store, &*self.state_store)?;
				// An attack sharing the conflicting header of a stored one
				// has the same key; never double-count it.
				if !self.is_pending(evidence) {
					// The evidence is valid either way; failing to persist
					// it must not reject the block.
					if let Err(e) = self.add_pending(evidence) {
						error!("Failed to persist checked evidence: {e}");
					}
				}
			}

			// A block may not carry the same evidence twice.
			if !hashes.insert(evidence.hash()) {
				return Err(Error::invalid(evidence, "duplicate evidence within a single block"));
			}
		}
		Ok(())
	}

	/// Reconcile the pool with a newly committed block: turn buffered
	/// conflicting votes into evidence, retire the evidence the block
	/// committed, and prune what has expired.
	///
	/// Called by the block executor exactly once per height, in height order.
	///
	/// # Panics
	///
	/// Panics if `state.last_block_height` does not increase.
	pub fn update(&self, state: ChainState, committed_evidence: &[Evidence]) {
		let buffered = {
			let mut inner = self.lock_inner();
			assert!(
				state.last_block_height > inner.state.last_block_height,
				"evidence pool updated with a non-increasing height: {} -> {}",
				inner.state.last_block_height,
				state.last_block_height,
			);
			std::mem::take(&mut inner.consensus_buffer)
		};

		// Drain the buffer first (against the new state), so evidence for the
		// block that just committed is available to the next proposer.
		self.process_consensus_buffer(&state, buffered);

		self.lock_inner().state = state.clone();

		self.mark_committed(committed_evidence, state.last_block_height);

		// Prune once the committed chain passes the expiry cursor.
		if self.size() > 0 {
			let past_cursor = {
				let inner = self.lock_inner();
				state.last_block_height > inner.pruning_height &&
					state.last_block_time > inner.pruning_time
			};
			if past_cursor {
				let (pruning_height, pruning_time) = self.remove_expired_pending_evidence(&state);
				let mut inner = self.lock_inner();
				inner.pruning_height = pruning_height;
				inner.pruning_time = pruning_time;
			}
		}

		EVIDENCE_POOL_SIZE.set(self.size() as i64);
	}

	/// Pending evidence in `(height, hash)` order, up to `max_bytes` of
	/// serialized evidence (negative for no limit). This is what a proposer
	/// calls with the byte budget remaining in its block.
	pub fn pending_evidence(&self, max_bytes: i64) -> Vec<Evidence> {
		match self.list_evidence(PENDING_PREFIX, max_bytes) {
			Ok(evidence) => evidence,
			Err(e) => {
				error!("Failed to read pending evidence: {e:#}");
				Vec::new()
			},
		}
	}

	/// Number of pending evidence items.
	pub fn size(&self) -> usize {
		self.evidence_size.load(Ordering::SeqCst)
	}

	/// The most recent consensus state the pool was updated with.
	pub fn state(&self) -> ChainState {
		self.lock_inner().state.clone()
	}

	/// The broadcast queue of pending evidence, safe for gossip loops to
	/// iterate without further coordination.
	pub fn broadcast(&self) -> &BroadcastQueue {
		&self.broadcast
	}

	/// The first entry of the broadcast queue, if any.
	pub fn evidence_front(&self) -> Option<Evidence> {
		self.broadcast.front()
	}

	/// Completes once the broadcast queue holds at least one entry.
	pub async fn wait_for_evidence(&self) {
		self.broadcast.wait_non_empty().await
	}

	/// Turns buffered conflicting vote pairs into duplicate vote evidence.
	/// Runs inside `update`, before anything else, so nothing reported
	/// mid-consensus ever reaches the pending set early. Verification is
	/// skipped: consensus is trusted for these votes.
	fn process_consensus_buffer(&self, state: &ChainState, buffered: Vec<(Vote, Vote)>) {
		for (vote_a, vote_b) in buffered {
			let height = vote_a.height;
			let duplicate = match height.cmp(&state.last_block_height) {
				std::cmp::Ordering::Equal => DuplicateVoteEvidence::new(
					vote_a,
					vote_b,
					state.last_block_time,
					&state.last_validators,
				),
				std::cmp::Ordering::Less => {
					// Votes from an earlier height: the timestamp and
					// validator set must come from that height's history.
					let validators = match self.state_store.load_validators(height) {
						Ok(validators) => validators,
						Err(e) => {
							error!("Failed to load validator set at height {height}: {e:#}");
							continue;
						},
					};
					let Some(block_meta) = self.block_store.load_block_meta(height) else {
						error!("Failed to load block meta at height {height}");
						continue;
					};
					DuplicateVoteEvidence::new(
						vote_a,
						vote_b,
						block_meta.header.time,
						&validators,
					)
				},
				std::cmp::Ordering::Greater => {
					// Consensus must never hand the pool votes from a height
					// that has not committed yet.
					error!(
						"Conflicting votes reported for height {height}, ahead of the last block height {}",
						state.last_block_height,
					);
					continue;
				},
			};

			let Some(duplicate) = duplicate else {
				warn!("Conflicting votes from a validator missing from the set at height {height}");
				continue;
			};
			let evidence = Evidence::DuplicateVote(duplicate);

			if self.is_pending(&evidence) || self.is_committed(&evidence) {
				continue;
			}

			match self.add_pending(&evidence) {
				Ok(()) => info!("Duplicate vote evidence created from consensus: {evidence}"),
				Err(e) => error!("Failed to persist evidence from consensus: {e}"),
			}
		}
	}

	fn is_pending(&self, evidence: &Evidence) -> bool {
		let key = pending_key(evidence.height(), &evidence.hash());
		self.store.exists(&key).unwrap_or_else(|e| {
			// Treated as absent: a duplicate that slips through is caught
			// again by verification.
			error!("Failed to look up pending evidence: {e:#}");
			false
		})
	}

	fn is_committed(&self, evidence: &Evidence) -> bool {
		let key = committed_key(evidence.height(), &evidence.hash());
		self.store.exists(&key).unwrap_or_else(|e| {
			error!("Failed to look up committed evidence: {e:#}");
			false
		})
	}

	/// Persist `evidence` into the pending set and append it to the
	/// broadcast queue. The caller must have checked `is_pending`.
	fn add_pending(&self, evidence: &Evidence) -> Result<(), Error> {
		let key = pending_key(evidence.height(), &evidence.hash());
		self.store.put(&key, &evidence.to_bytes()).map_err(Error::Storage)?;
		self.evidence_size.fetch_add(1, Ordering::SeqCst);
		self.broadcast.push_back(evidence.clone());
		EVIDENCE_POOL_SIZE.set(self.size() as i64);
		Ok(())
	}

	/// Mark every item of `committed_evidence` as committed at `height` and
	/// drop those that were pending. Storage failures are logged and
	/// skipped; the in-memory structures are only touched after the batch
	/// has been written.
	fn mark_committed(&self, committed_evidence: &[Evidence], height: i64) {
		let mut batch = self.store.batch();
		let mut removed = HashSet::new();

		for evidence in committed_evidence {
			if self.is_pending(evidence) {
				batch.delete(&pending_key(evidence.height(), &evidence.hash()));
				removed.insert(evidence.hash());
			}

			// The block itself retains the full evidence; the marker only has
			// to suppress re-proposal and re-ingest, so it carries just the
			// commit height.
			let marker =
				bincode::serialize(&height).expect("Serialization is not expected to fail");
			if let Err(e) =
				self.store.put(&committed_key(evidence.height(), &evidence.hash()), &marker)
			{
				error!("Failed to write committed evidence marker: {e:#}");
			}
		}

		if removed.is_empty() {
			return;
		}
		if let Err(e) = batch.write_sync() {
			error!("Failed to remove committed evidence from the pending set: {e:#}");
			return;
		}
		self.broadcast.remove_all(&removed);
		// Only the block executor removes pending evidence, so the counter
		// cannot underflow.
		debug_assert!(self.size() >= removed.len());
		self.evidence_size.fetch_sub(removed.len(), Ordering::SeqCst);
	}

	/// Walk the pending set in key order, dropping every expired item. Stops
	/// at the first non-expired item and returns the `(height, time)` past
	/// which expiry has to be re-checked.
	fn remove_expired_pending_evidence(&self, state: &ChainState) -> (i64, DateTime<Utc>) {
		let mut batch = self.store.batch();
		let mut removed = HashSet::new();
		let mut next_check = (state.last_block_height, state.last_block_time);

		for (key, value) in self.store.iter_prefix(PENDING_PREFIX) {
			let evidence = match Evidence::from_bytes(&value) {
				Ok(evidence) => evidence,
				Err(e) => {
					error!("Failed to decode pending evidence while pruning: {e:#}");
					continue;
				},
			};
			if !state.is_expired(evidence.height(), evidence.time()) {
				// Pending keys are in height order, so nothing beyond this
				// point has expired by height; re-check once this item
				// itself can expire.
				let max_age_duration =
					chrono::Duration::from_std(state.evidence_params.max_age_duration)
						.expect("max_age_duration should fit a chrono duration");
				next_check = (
					evidence.height() + state.evidence_params.max_age_num_blocks + 1,
					evidence.time() + max_age_duration + chrono::Duration::seconds(1),
				);
				break;
			}
			batch.delete(&key);
			removed.insert(evidence.hash());
		}

		if removed.is_empty() {
			return next_check;
		}
		if let Err(e) = batch.write_sync() {
			error!("Failed to prune expired evidence from the pending set: {e:#}");
			return next_check;
		}
		debug!("Pruned {} expired evidence items", removed.len());
		self.broadcast.remove_all(&removed);
		debug_assert!(self.size() >= removed.len());
		self.evidence_size.fetch_sub(removed.len(), Ordering::SeqCst);
		next_check
	}

	/// Cheap sufficiency check used while validating a proposed block:
	/// whatever sits in the pending set has already been fully verified.
	fn fast_check(&self, evidence: &Evidence) -> bool {
		let key = pending_key(evidence.height(), &evidence.hash());
		match evidence {
			Evidence::DuplicateVote(_) => self.is_pending(evidence),
			Evidence::LightClientAttack(attack) => {
				// Same conflicting header, but the proposed byzantine
				// validator list could still differ from the one we verified;
				// compare it against the stored evidence.
				let stored = match self.store.get(&key) {
					Ok(Some(bytes)) => bytes,
					Ok(None) => return false,
					Err(e) => {
						error!("Failed to look up pending evidence: {e:#}");
						return false;
					},
				};
				let stored_attack = match Evidence::from_bytes(&stored) {
					Ok(Evidence::LightClientAttack(stored_attack)) => stored_attack,
					Ok(_) | Err(_) => return false,
				};

				let mut proposed = attack.byzantine_validators.clone();
				sort_by_voting_power(&mut proposed);
				stored_attack.byzantine_validators == proposed
			},
		}
	}

	/// Evidence under `prefix` in key order, accumulating until the
	/// serialized aggregate would exceed `max_bytes` (negative for no
	/// limit).
	fn list_evidence(
		&self,
		prefix: &[u8; PREFIX_SIZE],
		max_bytes: i64,
	) -> Result<Vec<Evidence>> {
		let mut evidence_list = Vec::new();
		let mut total_bytes: i64 = 0;

		for (_key, value) in self.store.iter_prefix(prefix) {
			total_bytes += value.len() as i64;
			if max_bytes >= 0 && total_bytes > max_bytes {
				break;
			}
			let evidence =
				Evidence::from_bytes(&value).context("Failed to decode stored evidence")?;
			evidence_list.push(evidence);
		}

		Ok(evidence_list)
	}

	fn lock_inner(&self) -> MutexGuard<'_, Inner> {
		self.inner.lock().expect("evidence pool lock should not be poisoned")
	}
}
