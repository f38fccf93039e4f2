//! Core chain data types the evidence pool operates on.

pub mod evidence;
pub mod header;
pub mod state;
pub mod validator;
pub mod vote;

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub use evidence::{DuplicateVoteEvidence, Evidence, LightClientAttackEvidence};
pub use header::{
	BlockId, BlockIdFlag, BlockMeta, Commit, CommitSig, Header, LightBlock, SignedHeader,
};
pub use state::{ChainState, EvidenceParams};
pub use validator::{Validator, ValidatorSet};
pub use vote::{Vote, VoteType};

pub const HASH_SIZE: usize = 32;
pub const ADDRESS_SIZE: usize = 20;

/// A 32 byte content hash.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Hash(pub [u8; HASH_SIZE]);

impl Hash {
	pub fn of(bytes: &[u8]) -> Self {
		let digest = Sha256::digest(bytes);
		let mut hash = [0u8; HASH_SIZE];
		hash.copy_from_slice(&digest);
		Hash(hash)
	}

	pub fn as_bytes(&self) -> &[u8] {
		&self.0
	}
}

impl fmt::Display for Hash {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "{}", hex::encode(self.0))
	}
}

impl fmt::Debug for Hash {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "Hash({self})")
	}
}

/// A validator account address, derived from its public key.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address(pub [u8; ADDRESS_SIZE]);

impl fmt::Display for Address {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "{}", hex::encode(self.0))
	}
}

impl fmt::Debug for Address {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "Address({self})")
	}
}

/// An ed25519 public key.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKey(pub [u8; 32]);

impl PublicKey {
	/// The account address of this key: the first [`ADDRESS_SIZE`] bytes of
	/// its sha256 digest.
	pub fn address(&self) -> Address {
		let digest = Sha256::digest(self.0);
		let mut address = [0u8; ADDRESS_SIZE];
		address.copy_from_slice(&digest[..ADDRESS_SIZE]);
		Address(address)
	}

	/// Whether `signature` is a valid signature of `message` under this key.
	/// Malformed keys and signatures simply fail verification.
	pub fn verify(&self, message: &[u8], signature: &Signature) -> bool {
		use ed25519_dalek::Verifier;

		let Ok(key) = ed25519_dalek::VerifyingKey::from_bytes(&self.0) else {
			return false;
		};
		let Ok(signature) = ed25519_dalek::Signature::from_slice(signature.as_bytes()) else {
			return false;
		};
		key.verify(message, &signature).is_ok()
	}
}

impl fmt::Debug for PublicKey {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "PublicKey({})", hex::encode(self.0))
	}
}

/// Raw ed25519 signature bytes.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature(#[serde(with = "serde_bytes")] Vec<u8>);

impl Signature {
	pub fn new(bytes: Vec<u8>) -> Self {
		Signature(bytes)
	}

	pub fn as_bytes(&self) -> &[u8] {
		&self.0
	}
}

impl fmt::Debug for Signature {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "Signature({})", hex::encode(&self.0))
	}
}
