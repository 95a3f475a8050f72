/*
 * src/dispatch/dedup.rs
 *
 * Turn Deduplicator
 *
 * Purpose:
 *   Short-lived idempotency so a retried webhook replays its Decision
 *   instead of being processed twice
 */

use std::sync::Arc;
use std::time::Duration;

use moka::sync::Cache;
use tracing::info;

use crate::http_models::dispatch::{Decision, DispatchRequest};

/// Process-local LRU with TTL. Suitable for single-instance deployments;
/// horizontal scaling wants an external store with the same get/record
/// semantics.
#[derive(Clone)]
pub struct DedupCache {
	cache: Cache<String, Arc<Decision>>,
}

impl DedupCache {
	pub fn new(capacity: u64, ttl_hours: u64) -> Self {
		DedupCache {
			cache: Cache::builder()
				.max_capacity(capacity)
				.time_to_live(Duration::from_secs(ttl_hours * 3600))
				.build(),
		}
	}

	// The sid alone would replay turn 1 for the whole conversation; folding
	// in the turn fingerprint keeps retries idempotent while genuine new
	// turns pass through.
	fn key(req: &DispatchRequest) -> String {
		format!(
			"{}:{}:{}",
			req.conversation_sid,
			req.conversation_history.len(),
			req.current_message
		)
	}

	pub fn lookup(&self, req: &DispatchRequest) -> Option<Arc<Decision>> {
		let hit = self.cache.get(&Self::key(req));
		if hit.is_some() {
			info!(
				"DEDUP ->> replaying decision for conversation {}",
				req.conversation_sid
			);
		}
		hit
	}

	pub fn record(&self, req: &DispatchRequest, decision: &Decision) {
		self.cache.insert(Self::key(req), Arc::new(decision.clone()));
	}

	pub fn len(&self) -> u64 {
		self.cache.entry_count()
	}
}
