//! Order-preserving key codec. Keys are `(prefix, height, hash)`; byte-wise
//! ascending iteration within a prefix equals `(height, hash)` ascending
//! iteration.

use crate::types::Hash;

/// A fixed length prefix is used on the data column so the column's prefix
/// extractor can serve ordered iteration of either key space.
pub const PREFIX_SIZE: usize = 10;

/// Key space of verified evidence awaiting inclusion in a block.
pub const PENDING_PREFIX: &[u8; PREFIX_SIZE] = b"pending___";
/// Key space of markers for evidence that appeared in a committed block.
pub const COMMITTED_PREFIX: &[u8; PREFIX_SIZE] = b"committed_";

/// The `(height, hash)` key suffix. Heights are encoded as fixed width
/// big-endian so byte order over the suffix equals tuple order.
pub fn height_hash_suffix(height: i64, hash: &Hash) -> Vec<u8> {
	debug_assert!(height >= 0, "block heights are never negative");
	[&(height as u64).to_be_bytes()[..], hash.as_bytes()].concat()
}

pub fn pending_key(height: i64, hash: &Hash) -> Vec<u8> {
	[&PENDING_PREFIX[..], &height_hash_suffix(height, hash)].concat()
}

pub fn committed_key(height: i64, hash: &Hash) -> Vec<u8> {
	[&COMMITTED_PREFIX[..], &height_hash_suffix(height, hash)].concat()
}
