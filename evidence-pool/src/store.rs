//! Persistence for the evidence pool: an ordered key-value store with two
//! disjoint key spaces, one for pending evidence and one for committed
//! markers.

pub mod keys;
pub mod kv;

pub use kv::KeyValueStore;
