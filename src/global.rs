use std::env;
use std::fmt;
use std::str::FromStr;

pub const LOG_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/logs");
pub const CRASH_LOG: &str = "crash.log";
pub const LATEST_LOG: &str = "latest.log";

// Environment variable names
pub const ENV_PORT: &str = "PORT";
pub const ENV_REQUEST_DEADLINE_MS: &str = "REQUEST_DEADLINE_MS";
pub const ENV_GEOCODING_KEY: &str = "GEOCODING_KEY";
pub const ENV_LLM_KEY: &str = "LLM_KEY";
pub const ENV_LLM_MODEL: &str = "LLM_MODEL";
pub const ENV_LLM_MAX_TOKENS: &str = "LLM_MAX_TOKENS";
pub const ENV_LLM_TEMPERATURE: &str = "LLM_TEMPERATURE";
pub const ENV_TRAFFIC_URL: &str = "TRAFFIC_URL";
pub const ENV_TRAFFIC_KEY: &str = "TRAFFIC_KEY";
pub const ENV_CIRCUIT_OPEN_AFTER: &str = "CIRCUIT_OPEN_AFTER";
pub const ENV_CIRCUIT_RESET_MS: &str = "CIRCUIT_RESET_MS";
pub const ENV_DEDUP_CAPACITY: &str = "DEDUP_CAPACITY";
pub const ENV_DEDUP_TTL_HOURS: &str = "DEDUP_TTL_HOURS";
pub const ENV_LOG_LEVEL: &str = "LOG_LEVEL";

// Per-provider call deadlines
pub const GEOCODE_DEADLINE_MS: u64 = 1_500;
pub const LLM_DEADLINE_MS: u64 = 8_000;
pub const TRAFFIC_DEADLINE_MS: u64 = 1_000;

// Retry policy: transient errors only, exponential backoff with 10% jitter
pub const RETRY_MAX_ATTEMPTS: u32 = 2;
pub const RETRY_BASE_MS: u64 = 100;
pub const RETRY_JITTER: f64 = 0.10;

// Circuit breaker: open after N consecutive failures inside the window,
// half-open probe after the reset interval
pub const BREAKER_FAILURE_WINDOW_SECS: u64 = 60;
pub const DEFAULT_CIRCUIT_OPEN_AFTER: u32 = 5;
pub const DEFAULT_CIRCUIT_RESET_MS: u64 = 30_000;

pub const DEFAULT_REQUEST_DEADLINE_MS: u64 = 2_000;
pub const DEFAULT_DEDUP_CAPACITY: u64 = 50_000;
pub const DEFAULT_DEDUP_TTL_HOURS: u64 = 24;
pub const DEFAULT_LLM_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_LLM_MAX_TOKENS: u32 = 500;
pub const DEFAULT_LLM_TEMPERATURE: f32 = 0.1;
pub const DEFAULT_PORT: u16 = 3001;

// Conversation policy
pub const MAX_QUESTIONS_PER_CONVERSATION: usize = 2;
pub const FOLLOW_UP_DELAY_COLLECTING_MIN: u32 = 30;
pub const FOLLOW_UP_DELAY_CONFIRMING_MIN: u32 = 15;

// Scheduling model
pub const SLOT_ALIGN_MIN: i64 = 15;
pub const NEXT_DAY_LOOKAHEAD_DAYS: i64 = 7;
pub const NEXT_DAY_WINDOW_HOURS: i64 = 2;
pub const LONG_JOB_HOURS: f64 = 3.0;
pub const AVERAGE_SPEED_MPH: f64 = 30.0;
pub const TRAVEL_FIXED_OVERHEAD_MIN: u32 = 5;

/// Why startup configuration was rejected. Maps onto the process exit codes:
/// bad value -> 2, missing credential -> 3.
#[derive(Debug)]
pub enum ConfigError {
	BadValue { name: &'static str, value: String },
	MissingCredential { name: &'static str },
}

impl fmt::Display for ConfigError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ConfigError::BadValue { name, value } => {
				write!(f, "invalid value for {name}: {value:?}")
			}
			ConfigError::MissingCredential { name } => {
				write!(f, "required credential {name} is not set")
			}
		}
	}
}

impl std::error::Error for ConfigError {}

/// Everything the process reads from the environment at startup, parsed once.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
	pub port: u16,
	pub request_deadline_ms: u64,
	pub geocoding_key: String,
	pub llm_key: Option<String>,
	pub llm_model: String,
	pub llm_max_tokens: u32,
	pub llm_temperature: f32,
	pub traffic_url: Option<String>,
	pub traffic_key: Option<String>,
	pub circuit_open_after: u32,
	pub circuit_reset_ms: u64,
	pub dedup_capacity: u64,
	pub dedup_ttl_hours: u64,
}

fn parsed<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
	match env::var(name) {
		Ok(raw) => raw
			.trim()
			.parse()
			.map_err(|_| ConfigError::BadValue { name, value: raw }),
		Err(_) => Ok(default),
	}
}

fn optional(name: &'static str) -> Option<String> {
	env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl RuntimeConfig {
	/// Read and validate the full configuration. `GEOCODING_KEY` is the only
	/// required credential; the LLM and traffic providers fall back to their
	/// deterministic paths when unconfigured.
	pub fn from_env() -> Result<Self, ConfigError> {
		let geocoding_key = optional(ENV_GEOCODING_KEY).ok_or(ConfigError::MissingCredential {
			name: ENV_GEOCODING_KEY,
		})?;

		Ok(RuntimeConfig {
			port: parsed(ENV_PORT, DEFAULT_PORT)?,
			request_deadline_ms: parsed(ENV_REQUEST_DEADLINE_MS, DEFAULT_REQUEST_DEADLINE_MS)?,
			geocoding_key,
			llm_key: optional(ENV_LLM_KEY),
			llm_model: optional(ENV_LLM_MODEL).unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
			llm_max_tokens: parsed(ENV_LLM_MAX_TOKENS, DEFAULT_LLM_MAX_TOKENS)?,
			llm_temperature: parsed(ENV_LLM_TEMPERATURE, DEFAULT_LLM_TEMPERATURE)?,
			traffic_url: optional(ENV_TRAFFIC_URL),
			traffic_key: optional(ENV_TRAFFIC_KEY),
			circuit_open_after: parsed(ENV_CIRCUIT_OPEN_AFTER, DEFAULT_CIRCUIT_OPEN_AFTER)?,
			circuit_reset_ms: parsed(ENV_CIRCUIT_RESET_MS, DEFAULT_CIRCUIT_RESET_MS)?,
			dedup_capacity: parsed(ENV_DEDUP_CAPACITY, DEFAULT_DEDUP_CAPACITY)?,
			dedup_ttl_hours: parsed(ENV_DEDUP_TTL_HOURS, DEFAULT_DEDUP_TTL_HOURS)?,
		})
	}

	/// A config suitable for tests and offline runs: no live providers and a
	/// small dedup cache.
	pub fn offline() -> Self {
		RuntimeConfig {
			port: 0,
			request_deadline_ms: DEFAULT_REQUEST_DEADLINE_MS,
			geocoding_key: String::new(),
			llm_key: None,
			llm_model: DEFAULT_LLM_MODEL.to_string(),
			llm_max_tokens: DEFAULT_LLM_MAX_TOKENS,
			llm_temperature: DEFAULT_LLM_TEMPERATURE,
			traffic_url: None,
			traffic_key: None,
			circuit_open_after: DEFAULT_CIRCUIT_OPEN_AFTER,
			circuit_reset_ms: DEFAULT_CIRCUIT_RESET_MS,
			dedup_capacity: 1_024,
			dedup_ttl_hours: 1,
		}
	}
}
