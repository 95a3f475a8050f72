/*
 * src/dispatch/mediator.rs
 *
 * External-call mediation
 *
 * Purpose:
 *   Per-provider deadlines, bounded retries with jitter, and circuit
 *   breaking for geocoding, LLM, and traffic calls
 */

use std::fmt;
use std::future::Future;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use rand::Rng;
use tracing::{debug, warn};

use crate::global::*;

/// How a provider call failed. `Transient` errors are retried; the rest are
/// handed straight back so the caller can pick its fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
	/// The per-provider deadline elapsed
	Timeout,
	/// Network failure, 5xx, or rate limit; worth retrying
	Transient(String),
	/// The provider answered and the answer is final (bad key, zero results)
	Fatal(String),
	/// The breaker is open; the call was never attempted
	CircuitOpen,
}

impl ProviderError {
	pub fn is_transient(&self) -> bool {
		matches!(self, ProviderError::Timeout | ProviderError::Transient(_))
	}
}

impl fmt::Display for ProviderError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ProviderError::Timeout => write!(f, "deadline exceeded"),
			ProviderError::Transient(msg) => write!(f, "transient failure: {msg}"),
			ProviderError::Fatal(msg) => write!(f, "failure: {msg}"),
			ProviderError::CircuitOpen => write!(f, "circuit open"),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
	Closed,
	Open,
	HalfOpen,
}

#[derive(Debug)]
struct BreakerInner {
	state: CircuitState,
	consecutive_failures: u32,
	first_failure_at: Option<Instant>,
	opened_at: Option<Instant>,
}

/// Consecutive-failure circuit breaker. Opens after `threshold` failures
/// inside the failure window, half-opens one probe after `reset` elapses.
/// Every critical section is a handful of field updates under one mutex.
pub struct CircuitBreaker {
	inner: Mutex<BreakerInner>,
	threshold: u32,
	reset: Duration,
	window: Duration,
}

impl CircuitBreaker {
	pub fn new(threshold: u32, reset: Duration) -> Self {
		CircuitBreaker {
			inner: Mutex::new(BreakerInner {
				state: CircuitState::Closed,
				consecutive_failures: 0,
				first_failure_at: None,
				opened_at: None,
			}),
			threshold,
			reset,
			window: Duration::from_secs(BREAKER_FAILURE_WINDOW_SECS),
		}
	}

	/// Whether a call may proceed. Transitions Open -> HalfOpen once the
	/// reset interval has elapsed, admitting a single probe.
	pub fn try_acquire(&self) -> bool {
		let mut inner = self.inner.lock().unwrap();
		match inner.state {
			CircuitState::Closed | CircuitState::HalfOpen => true,
			CircuitState::Open => {
				let elapsed = inner
					.opened_at
					.map(|t| t.elapsed() >= self.reset)
					.unwrap_or(true);
				if elapsed {
					inner.state = CircuitState::HalfOpen;
					true
				} else {
					false
				}
			}
		}
	}

	pub fn record_success(&self) {
		let mut inner = self.inner.lock().unwrap();
		inner.state = CircuitState::Closed;
		inner.consecutive_failures = 0;
		inner.first_failure_at = None;
		inner.opened_at = None;
	}

	pub fn record_failure(&self) {
		let mut inner = self.inner.lock().unwrap();
		let now = Instant::now();

		// A half-open probe failing re-opens immediately
		if inner.state == CircuitState::HalfOpen {
			inner.state = CircuitState::Open;
			inner.opened_at = Some(now);
			return;
		}

		// Failures only accumulate within the window; an old streak restarts
		match inner.first_failure_at {
			Some(first) if now.duration_since(first) <= self.window => {
				inner.consecutive_failures += 1;
			}
			_ => {
				inner.first_failure_at = Some(now);
				inner.consecutive_failures = 1;
			}
		}

		if inner.consecutive_failures >= self.threshold {
			inner.state = CircuitState::Open;
			inner.opened_at = Some(now);
		}
	}

	pub fn state(&self) -> CircuitState {
		self.inner.lock().unwrap().state
	}
}

/// One breaker per upstream provider. The only process-wide mutable state
/// besides the dedup cache.
pub struct BreakerRegistry {
	pub geocoding: CircuitBreaker,
	pub llm: CircuitBreaker,
	pub traffic: CircuitBreaker,
}

impl BreakerRegistry {
	pub fn new(open_after: u32, reset_ms: u64) -> Self {
		let reset = Duration::from_millis(reset_ms);
		BreakerRegistry {
			geocoding: CircuitBreaker::new(open_after, reset),
			llm: CircuitBreaker::new(open_after, reset),
			traffic: CircuitBreaker::new(open_after, reset),
		}
	}
}

fn backoff_delay(attempt: u32) -> Duration {
	let base = RETRY_BASE_MS * (1 << attempt) as u64;
	let jitter = rand::thread_rng().gen_range(1.0 - RETRY_JITTER..=1.0 + RETRY_JITTER);
	Duration::from_millis((base as f64 * jitter) as u64)
}

/// Run `op` against a provider under its deadline, retrying transient
/// failures up to the retry cap, with breaker bookkeeping on the way out.
pub async fn guarded<T, F, Fut>(
	breaker: &CircuitBreaker,
	label: &str,
	deadline_ms: u64,
	op: F,
) -> Result<T, ProviderError>
where
	F: Fn() -> Fut,
	Fut: Future<Output = Result<T, ProviderError>>,
{
	if !breaker.try_acquire() {
		debug!("{label}: circuit open, skipping call");
		return Err(ProviderError::CircuitOpen);
	}

	let deadline = Duration::from_millis(deadline_ms);
	let mut last_err = ProviderError::Timeout;

	for attempt in 0..=RETRY_MAX_ATTEMPTS {
		if attempt > 0 {
			tokio::time::sleep(backoff_delay(attempt - 1)).await;
		}

		let outcome = tokio::time::timeout(deadline, op()).await;
		match outcome {
			Ok(Ok(value)) => {
				breaker.record_success();
				return Ok(value);
			}
			Ok(Err(err)) if err.is_transient() => {
				warn!("{label}: attempt {attempt} failed - {err}");
				last_err = err;
			}
			Ok(Err(err)) => {
				breaker.record_failure();
				return Err(err);
			}
			Err(_) => {
				warn!("{label}: attempt {attempt} timed out after {deadline_ms}ms");
				last_err = ProviderError::Timeout;
			}
		}
	}

	breaker.record_failure();
	Err(last_err)
}
