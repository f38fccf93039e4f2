//! Evidence pool of a byzantine fault tolerant replica.
//!
//! The pool collects evidence of byzantine behavior by validators (duplicate
//! votes and light client attacks), verifies it against the committed chain,
//! persists it across restarts, feeds it to block proposers and gossip, and
//! retires it once it has been committed in a block or has expired.

pub mod evidence;
pub mod logging;
pub mod metrics;
pub mod settings;
pub mod store;
pub mod types;

#[cfg(test)]
pub mod testing;

pub use evidence::{BlockStore, Error, EvidencePool, StateStore};
pub use store::KeyValueStore;
