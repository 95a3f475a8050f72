/*
 * src/controllers/health.rs
 *
 * File for Health Controller API Endpoint
 *
 * Purpose:
 *   Serve liveness plus per-provider circuit status
 */

use axum::{Extension, Json, routing::get};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{OpenApi, ToSchema};

use crate::controllers::AxumRouter;
use crate::dispatch::AppState;
use crate::dispatch::mediator::{CircuitBreaker, CircuitState};

#[derive(OpenApi)]
#[openapi(
	paths(api_health),
	info(
		title = "Health Routes",
		description = "Liveness and provider circuit status."
	),
	tags((name = "Health"))
)]
pub struct HealthApiDoc;

#[derive(Serialize, Deserialize, ToSchema)]
pub struct ProviderStatus {
	pub geocoding: String,
	pub llm: String,
	pub traffic: String,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
	pub status: String,
	pub version: String,
	pub uptime_seconds: u64,
	pub providers: ProviderStatus,
}

fn breaker_status(configured: bool, breaker: &CircuitBreaker) -> String {
	if !configured {
		return String::from("unconfigured");
	}
	match breaker.state() {
		CircuitState::Closed => String::from("ok"),
		CircuitState::HalfOpen => String::from("recovering"),
		CircuitState::Open => String::from("degraded"),
	}
}

/// Report service liveness and the circuit state of each upstream provider.
///
/// # Method
/// `GET /health`
///
/// # Responses
/// - `200 OK` - [HealthResponse]
///
/// # Examples
/// ```bash
/// curl -X GET http://localhost:3001/health
/// ```
#[utoipa::path(
	get,
	path = "/health",
	summary = "Service liveness and provider status",
	responses(
		(
			status = 200,
			description = "Service is up",
			body = HealthResponse,
			content_type = "application/json",
			example = json!({
				"status": "ok",
				"version": "0.1.0",
				"uptime_seconds": 4312,
				"providers": {
					"geocoding": "ok",
					"llm": "ok",
					"traffic": "unconfigured"
				}
			})
		)
	),
	tag = "Health"
)]
pub async fn api_health(Extension(state): Extension<Arc<AppState>>) -> Json<HealthResponse> {
	Json(HealthResponse {
		status: String::from("ok"),
		version: String::from(env!("CARGO_PKG_VERSION")),
		uptime_seconds: state.started_at.elapsed().as_secs(),
		providers: ProviderStatus {
			geocoding: breaker_status(
				state.providers.geocoder.is_some(),
				&state.breakers.geocoding,
			),
			llm: breaker_status(state.providers.llm.is_some(), &state.breakers.llm),
			traffic: breaker_status(state.providers.traffic.is_some(), &state.breakers.traffic),
		},
	})
}

/// Create the health route.
///
/// # Routes
/// - `GET /health` - liveness and provider circuit status (public)
pub fn health_routes() -> AxumRouter {
	AxumRouter::new().route("/health", get(api_health))
}
