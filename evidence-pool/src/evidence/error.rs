use crate::types::{Evidence, Hash};

/// Errors surfaced by user-initiated pool operations.
///
/// Duplicate submissions (already pending or already committed) are not
/// errors; those paths are silent no-ops. Reconciliation paths driven by the
/// block executor log storage failures and continue instead of returning
/// them.
#[derive(Debug, thiserror::Error)]
pub enum Error {
	/// The evidence failed structural or historical verification. The peer
	/// that sent it can be punished upstream.
	#[error("invalid evidence {hash}: {reason}")]
	Invalid { hash: Hash, reason: String },

	/// The underlying store failed while persisting evidence.
	#[error("evidence storage failure: {0:#}")]
	Storage(anyhow::Error),
}

impl Error {
	pub(crate) fn invalid(evidence: &Evidence, reason: impl Into<String>) -> Self {
		Error::Invalid { hash: evidence.hash(), reason: reason.into() }
	}
}
