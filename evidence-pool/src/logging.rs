//! Tracing subscriber setup for hosts embedding the pool. The pool itself
//! only emits events through the global dispatcher.

use tracing_subscriber::EnvFilter;

fn env_filter() -> EnvFilter {
	EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install a global subscriber printing human-readable events, filtered by
/// `RUST_LOG` (defaulting to `info`).
pub fn init_logging() {
	tracing_subscriber::fmt().with_env_filter(env_filter()).init();
}

/// As [`init_logging`], but emitting one JSON object per event, for log
/// collectors.
pub fn init_json_logging() {
	tracing_subscriber::fmt().json().with_env_filter(env_filter()).init();
}
