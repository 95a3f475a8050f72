/*
 * src/dispatch/address.rs
 *
 * Address Resolver
 *
 * Purpose:
 *   Geocode free-form customer addresses and enforce the service radius
 */

use once_cell::sync::Lazy;
use regex::Regex;

use crate::dispatch::mediator::{self, BreakerRegistry};
use crate::dispatch::providers::{Coordinates, GeocodeProvider, ProviderSet};
use crate::global::GEOCODE_DEADLINE_MS;
use crate::http_models::profile::AnchorAddress;

static STREET_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+\s+\w+").unwrap());
static POSTAL_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d{5}\b").unwrap());

/// A geocoded, radius-checked customer address.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedAddress {
	pub formatted: String,
	pub lat: f64,
	pub lng: f64,
	pub in_service_area: bool,
	pub distance_miles: f64,
	pub geocoded: bool,
}

impl ResolvedAddress {
	pub fn coordinates(&self) -> Coordinates {
		Coordinates::new(self.lat, self.lng)
	}
}

/// Why a candidate address could not be resolved. Each maps to one targeted
/// conversational branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unresolved {
	/// Too vague to geocode; ask for a street address
	NeedSpecificAddress,
	/// The provider failed or returned nothing usable
	GeocodeFailed,
}

/// Whitespace normalization plus stripping stray leading/trailing
/// punctuation customers type around addresses.
pub fn normalize(text: &str) -> String {
	let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
	collapsed
		.trim_matches(|c: char| c.is_ascii_punctuation() && c != '#')
		.trim()
		.to_string()
}

/// An address is worth geocoding when it has a leading street number or a
/// 5-digit postal token. Anything else gets a clarifying question instead of
/// a wasted provider call.
pub fn looks_specific(text: &str) -> bool {
	STREET_NUMBER.is_match(text) || POSTAL_CODE.is_match(text)
}

/// Great-circle distance in miles.
pub fn haversine_miles(from: Coordinates, to: Coordinates) -> f64 {
	const EARTH_RADIUS_MILES: f64 = 3958.8;
	let d_lat = (to.lat - from.lat).to_radians();
	let d_lng = (to.lng - from.lng).to_radians();
	let a = (d_lat / 2.0).sin().powi(2)
		+ from.lat.to_radians().cos() * to.lat.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
	let c = 2.0 * a.sqrt().asin();
	EARTH_RADIUS_MILES * c
}

/// Resolve a free-form address against the business anchor and radius.
pub async fn resolve(
	text: &str,
	anchor: &AnchorAddress,
	radius_miles: f64,
	providers: &ProviderSet,
	breakers: &BreakerRegistry,
	diagnostics: &mut Vec<String>,
) -> Result<ResolvedAddress, Unresolved> {
	let normalized = normalize(text);
	if normalized.is_empty() || !looks_specific(&normalized) {
		return Err(Unresolved::NeedSpecificAddress);
	}

	let Some(geocoder) = providers.geocoder.as_ref() else {
		diagnostics.push(String::from("geocoding unavailable: no provider configured"));
		return Err(Unresolved::GeocodeFailed);
	};

	let hit = mediator::guarded(&breakers.geocoding, "geocoding", GEOCODE_DEADLINE_MS, || {
		let geocoder: &dyn GeocodeProvider = geocoder.as_ref();
		let address = normalized.clone();
		async move { geocoder.geocode(&address).await }
	})
	.await;

	match hit {
		Ok(hit) => {
			let anchor_point = Coordinates::new(anchor.lat, anchor.lng);
			let customer = Coordinates::new(hit.lat, hit.lng);
			let distance_miles = haversine_miles(anchor_point, customer);
			Ok(ResolvedAddress {
				formatted: hit.formatted,
				lat: hit.lat,
				lng: hit.lng,
				in_service_area: distance_miles <= radius_miles,
				distance_miles,
				geocoded: true,
			})
		}
		Err(err) => {
			diagnostics.push(format!("geocoding failed: {err}"));
			Err(Unresolved::GeocodeFailed)
		}
	}
}
