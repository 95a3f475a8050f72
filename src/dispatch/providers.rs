/*
 * src/dispatch/providers.rs
 *
 * Upstream provider adapters
 *
 * Purpose:
 *   Thin trait seams over the geocoding, LLM, and traffic providers so the
 *   pipeline never sees a provider-specific shape
 */

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use langchain_rust::language_models::llm::LLM;
use langchain_rust::language_models::options::CallOptions;
use langchain_rust::llm::openai::{OpenAI, OpenAIConfig};
use num_traits::ToPrimitive;
use serde::Deserialize;
use serde_json::json;

use crate::dispatch::mediator::ProviderError;
use crate::global::RuntimeConfig;

/// A plain lat/lng pair used throughout the scheduling math.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
	pub lat: f64,
	pub lng: f64,
}

impl Coordinates {
	pub fn new(lat: f64, lng: f64) -> Self {
		Coordinates { lat, lng }
	}
}

/// A successful geocode: canonical address plus coordinates.
#[derive(Debug, Clone)]
pub struct GeocodeHit {
	pub formatted: String,
	pub lat: f64,
	pub lng: f64,
}

#[async_trait]
pub trait GeocodeProvider: Send + Sync {
	async fn geocode(&self, address: &str) -> Result<GeocodeHit, ProviderError>;
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
	async fn complete(&self, prompt: &str) -> Result<String, ProviderError>;
}

#[async_trait]
pub trait TrafficProvider: Send + Sync {
	/// Drive-time in whole minutes for a departure at business-local time.
	async fn route_minutes(
		&self,
		from: Coordinates,
		to: Coordinates,
		depart_local: NaiveDateTime,
	) -> Result<u32, ProviderError>;
}

/// Google Maps geocoding.
pub struct GoogleGeocoder {
	client: google_maps::Client,
}

impl GoogleGeocoder {
	pub fn new(api_key: &str) -> Result<Self, ProviderError> {
		let client = google_maps::Client::try_new(api_key)
			.map_err(|e| ProviderError::Fatal(format!("geocoding client init: {e}")))?;
		Ok(GoogleGeocoder { client })
	}
}

#[async_trait]
impl GeocodeProvider for GoogleGeocoder {
	async fn geocode(&self, address: &str) -> Result<GeocodeHit, ProviderError> {
		let response = self
			.client
			.geocoding()
			.with_address(address)
			.execute()
			.await
			.map_err(|e| ProviderError::Transient(e.to_string()))?;

		if let Some(err) = response.error_message {
			return Err(ProviderError::Fatal(format!(
				"geocoding status {} - {err}",
				response.status
			)));
		}
		match response.status {
			google_maps::geocoding::Status::Ok => {}
			google_maps::geocoding::Status::ZeroResults => {
				return Err(ProviderError::Fatal(String::from("zero results")));
			}
			google_maps::geocoding::Status::OverQueryLimit => {
				return Err(ProviderError::Transient(String::from("over query limit")));
			}
			other => {
				return Err(ProviderError::Fatal(format!("geocoding status {other}")));
			}
		}
		let hit = response
			.results
			.first()
			.ok_or_else(|| ProviderError::Fatal(String::from("empty result set")))?;

		let lat = hit
			.geometry
			.location
			.lat
			.to_f64()
			.ok_or_else(|| ProviderError::Fatal(String::from("latitude not representable")))?;
		let lng = hit
			.geometry
			.location
			.lng
			.to_f64()
			.ok_or_else(|| ProviderError::Fatal(String::from("longitude not representable")))?;

		Ok(GeocodeHit {
			formatted: hit.formatted_address.clone(),
			lat,
			lng,
		})
	}
}

/// OpenAI-compatible chat model behind langchain. One file to swap models.
pub struct LangChainLlm {
	llm: OpenAI<OpenAIConfig>,
}

impl LangChainLlm {
	pub fn new(config: &RuntimeConfig) -> Self {
		let mut openai_config = OpenAIConfig::default();
		if let Some(key) = &config.llm_key {
			openai_config = openai_config.with_api_key(key.clone());
		}
		let options = CallOptions::default()
			.with_max_tokens(config.llm_max_tokens)
			.with_temperature(config.llm_temperature);
		let llm = OpenAI::default()
			.with_config(openai_config)
			.with_model(config.llm_model.clone())
			.with_options(options);
		LangChainLlm { llm }
	}
}

#[async_trait]
impl LlmProvider for LangChainLlm {
	async fn complete(&self, prompt: &str) -> Result<String, ProviderError> {
		self.llm
			.invoke(prompt)
			.await
			.map_err(|e| ProviderError::Transient(e.to_string()))
	}
}

#[derive(Deserialize)]
struct RouteSummary {
	time: f64,
}

#[derive(Deserialize)]
struct RouteTrip {
	summary: RouteSummary,
}

#[derive(Deserialize)]
struct RouteResponse {
	trip: RouteTrip,
}

/// Valhalla-compatible routing endpoint used for live drive times.
pub struct ValhallaTraffic {
	http: reqwest::Client,
	base_url: String,
	api_key: Option<String>,
}

impl ValhallaTraffic {
	pub fn new(base_url: String, api_key: Option<String>) -> Self {
		ValhallaTraffic {
			http: reqwest::Client::new(),
			base_url: base_url.trim_end_matches('/').to_string(),
			api_key,
		}
	}
}

#[async_trait]
impl TrafficProvider for ValhallaTraffic {
	async fn route_minutes(
		&self,
		from: Coordinates,
		to: Coordinates,
		depart_local: NaiveDateTime,
	) -> Result<u32, ProviderError> {
		let body = json!({
			"locations": [
				{ "lat": from.lat, "lon": from.lng },
				{ "lat": to.lat, "lon": to.lng }
			],
			"costing": "auto",
			"date_time": {
				// type 1 = depart at the given local time
				"type": 1,
				"value": depart_local.format("%Y-%m-%dT%H:%M").to_string()
			}
		});

		let mut request = self.http.post(format!("{}/route", self.base_url)).json(&body);
		if let Some(key) = &self.api_key {
			request = request.query(&[("access_token", key.as_str())]);
		}

		let response = request
			.send()
			.await
			.map_err(|e| ProviderError::Transient(e.to_string()))?;

		let status = response.status();
		if status.as_u16() == 429 || status.is_server_error() {
			return Err(ProviderError::Transient(format!("routing status {status}")));
		}
		if !status.is_success() {
			return Err(ProviderError::Fatal(format!("routing status {status}")));
		}

		let parsed: RouteResponse = response
			.json()
			.await
			.map_err(|e| ProviderError::Fatal(format!("routing response: {e}")))?;

		// Seconds to whole minutes, ties round up
		Ok((parsed.trip.summary.time / 60.0).ceil() as u32)
	}
}

/// The set of live providers available to a turn. Tests substitute stubs;
/// an unset provider means the deterministic fallback runs unconditionally.
#[derive(Clone, Default)]
pub struct ProviderSet {
	pub geocoder: Option<Arc<dyn GeocodeProvider>>,
	pub llm: Option<Arc<dyn LlmProvider>>,
	pub traffic: Option<Arc<dyn TrafficProvider>>,
}

impl ProviderSet {
	pub fn from_config(config: &RuntimeConfig) -> Result<Self, ProviderError> {
		let geocoder: Option<Arc<dyn GeocodeProvider>> = if config.geocoding_key.is_empty() {
			None
		} else {
			Some(Arc::new(GoogleGeocoder::new(&config.geocoding_key)?))
		};
		let llm: Option<Arc<dyn LlmProvider>> = config
			.llm_key
			.as_ref()
			.map(|_| Arc::new(LangChainLlm::new(config)) as Arc<dyn LlmProvider>);
		let traffic: Option<Arc<dyn TrafficProvider>> = config.traffic_url.as_ref().map(|url| {
			Arc::new(ValhallaTraffic::new(url.clone(), config.traffic_key.clone()))
				as Arc<dyn TrafficProvider>
		});

		Ok(ProviderSet {
			geocoder,
			llm,
			traffic,
		})
	}
}
