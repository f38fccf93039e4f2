//! Prometheus metrics of the evidence pool. The host exposes them however it
//! serves the rest of its metrics; this module only maintains the registry.

use lazy_static::lazy_static;
use prometheus::{IntCounterVec, IntGauge, Opts, Registry};

lazy_static! {
	static ref REGISTRY: Registry = Registry::new();
	pub static ref EVIDENCE_POOL_SIZE: IntGauge =
		IntGauge::new("evidence_pool_size", "Number of pending evidence items in the pool")
			.expect("Metric should be created");
	pub static ref EVIDENCE_REJECTED: IntCounterVec = IntCounterVec::new(
		Opts::new("evidence_rejected", "Count of evidence items rejected by the pool"),
		&["reason"]
	)
	.expect("Metric should be created");
}

pub fn register_metrics() {
	REGISTRY
		.register(Box::new(EVIDENCE_POOL_SIZE.clone()))
		.expect("Metric should register");
	REGISTRY
		.register(Box::new(EVIDENCE_REJECTED.clone()))
		.expect("Metric should register");
}

/// The registered metrics in the prometheus text exposition format.
pub fn gather() -> String {
	use prometheus::Encoder;

	let encoder = prometheus::TextEncoder::new();
	let mut buffer = Vec::new();
	if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
		tracing::error!("Could not encode metrics: {e}");
	}
	String::from_utf8(buffer).unwrap_or_default()
}
