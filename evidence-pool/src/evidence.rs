//! The evidence pool: collects, verifies, persists and broadcasts evidence of
//! byzantine behavior by validators, feeds pending evidence to block
//! proposers, and retires evidence once it has been committed or expired.

pub mod broadcast;
pub mod error;
pub mod pool;
pub mod verify;

use anyhow::Result;

use crate::types::{BlockMeta, ChainState, Commit, ValidatorSet};

pub use broadcast::{BroadcastQueue, Cursor};
pub use error::Error;
pub use pool::EvidencePool;

/// Read-only access to historical consensus state.
pub trait StateStore: Send + Sync {
	/// The state as of the latest committed block.
	fn load(&self) -> Result<ChainState>;

	/// The validator set that was active at `height`.
	fn load_validators(&self, height: i64) -> Result<ValidatorSet>;
}

/// Read-only access to the committed block history.
pub trait BlockStore: Send + Sync {
	fn load_block_meta(&self, height: i64) -> Option<BlockMeta>;

	fn load_block_commit(&self, height: i64) -> Option<Commit>;
}
