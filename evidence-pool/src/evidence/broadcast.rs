
use std::{
	collections::{HashSet, VecDeque},
	sync::{Mutex, MutexGuard},
};

use tokio::sync::watch;

use crate::types::{Evidence, Hash};

/// FIFO queue of pending evidence, iterated by gossip loops while adders and
/// removers mutate it concurrently.
///
/// Entries carry a monotonically increasing sequence number and readers keep
/// their position as a [`Cursor`]; removing entries never invalidates a
/// reader, which simply resumes from the next surviving sequence number. A
/// `watch` channel carries the edge-triggered "non-empty" signal a gossip
/// loop awaits before iterating.
pub struct BroadcastQueue {
	inner: Mutex<Inner>,
	non_empty: watch::Sender<bool>,
}

struct Inner {
	entries: VecDeque<Entry>,
	next_seq: u64,
}

struct Entry {
	seq: u64,
	evidence: Evidence,
}

/// A reader's position in the queue. The zero cursor starts at the front.
#[derive(Clone, Copy, Debug, Default)]
pub struct Cursor {
	last_seq: u64,
}

impl Default for BroadcastQueue {
	fn default() -> Self {
		Self::new()
	}
}

impl BroadcastQueue {
	pub fn new() -> Self {
		let (non_empty, _) = watch::channel(false);
		BroadcastQueue {
			inner: Mutex::new(Inner { entries: VecDeque::new(), next_seq: 1 }),
			non_empty,
		}
	}

	pub fn push_back(&self, evidence: Evidence) {
		let mut inner = self.lock();
		let seq = inner.next_seq;
		inner.next_seq += 1;
		inner.entries.push_back(Entry { seq, evidence });
		if inner.entries.len() == 1 {
			// Empty to non-empty edge: wake waiting gossip loops.
			self.non_empty.send_replace(true);
		}
	}

	/// Unlink every entry whose hash is in `hashes`. Readers already past an
	/// unlinked entry continue forward unaffected.
	pub fn remove_all(&self, hashes: &HashSet<Hash>) {
		let mut inner = self.lock();
		inner.entries.retain(|entry| !hashes.contains(&entry.evidence.hash()));
		if inner.entries.is_empty() {
			self.non_empty.send_replace(false);
		}
	}

	pub fn front(&self) -> Option<Evidence> {
		self.lock().entries.front().map(|entry| entry.evidence.clone())
	}

	/// The first entry after `cursor`, advancing the cursor past it.
	pub fn next(&self, cursor: &mut Cursor) -> Option<Evidence> {
		let inner = self.lock();
		let entry = inner.entries.iter().find(|entry| entry.seq > cursor.last_seq)?;
		cursor.last_seq = entry.seq;
		Some(entry.evidence.clone())
	}

	pub fn len(&self) -> usize {
		self.lock().entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.lock().entries.is_empty()
	}

	/// Every queued item in broadcast (insertion) order.
	pub fn snapshot(&self) -> Vec<Evidence> {
		self.lock().entries.iter().map(|entry| entry.evidence.clone()).collect()
	}

	/// The non-empty signal as a receiver, for callers that want to select
	/// over it.
	pub fn subscribe_non_empty(&self) -> watch::Receiver<bool> {
		self.non_empty.subscribe()
	}

	/// Wait until the queue holds at least one entry.
	pub async fn wait_non_empty(&self) {
		let mut receiver = self.non_empty.subscribe();
		loop {
			if *receiver.borrow_and_update() {
				return;
			}
			if receiver.changed().await.is_err() {
				return;
			}
		}
	}

	fn lock(&self) -> MutexGuard<'_, Inner> {
		self.inner.lock().expect("broadcast queue lock should not be poisoned")
	}
}
