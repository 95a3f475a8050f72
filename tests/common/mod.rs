#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use dispatchline::dispatch::AppState;
use dispatchline::dispatch::mediator::ProviderError;
use dispatchline::dispatch::providers::{GeocodeHit, GeocodeProvider, ProviderSet};
use dispatchline::global::RuntimeConfig;
use dispatchline::http_models::dispatch::DispatchRequest;
use dispatchline::http_models::profile::{
	AnchorAddress, BookingType, BusinessProfile, CalendarEvent, CapacityRules, DayHours,
	EmergencyMultipliers, EventLocation, JobEstimate, Trade, TravelLimits, WeekHours,
};

/// Deterministic geocoder: two known ZIPs, zero results otherwise. Keeps the
/// whole pipeline runnable with no network.
pub struct StubGeocoder;

#[async_trait]
impl GeocodeProvider for StubGeocoder {
	async fn geocode(&self, address: &str) -> Result<GeocodeHit, ProviderError> {
		if address.contains("90210") {
			Ok(GeocodeHit {
				formatted: String::from("789 Sunset Blvd, Beverly Hills, CA 90210"),
				lat: 34.0901,
				lng: -118.4065,
			})
		} else if address.contains("93555") {
			Ok(GeocodeHit {
				formatted: String::from("456 Remote Rd, Ridgecrest, CA 93555"),
				lat: 35.6225,
				lng: -117.6709,
			})
		} else {
			Err(ProviderError::Fatal(String::from("zero results")))
		}
	}
}

pub fn stub_state() -> AppState {
	AppState::new(
		RuntimeConfig::offline(),
		ProviderSet {
			geocoder: Some(Arc::new(StubGeocoder)),
			llm: None,
			traffic: None,
		},
	)
}

fn hours(start: &str, end: &str) -> Option<DayHours> {
	Some(DayHours {
		start: start.to_string(),
		end: end.to_string(),
	})
}

fn week(start: &str, end: &str, include_sunday: bool) -> WeekHours {
	WeekHours {
		monday: hours(start, end),
		tuesday: hours(start, end),
		wednesday: hours(start, end),
		thursday: hours(start, end),
		friday: hours(start, end),
		saturday: hours(start, end),
		sunday: if include_sunday { hours(start, end) } else { None },
	}
}

fn estimate(job: &str, est_hours: f64, min: f64, max: f64) -> JobEstimate {
	JobEstimate {
		job_type: job.to_string(),
		estimated_hours: est_hours,
		cost_min: min,
		cost_max: max,
		urgency_multiplier: None,
	}
}

/// LA plumbing outfit: 25mi radius, PDT, 07:00-18:00 business hours,
/// 06:00-22:00 phone hours, six jobs a day, 15 minute buffers.
pub fn test_profile() -> BusinessProfile {
	BusinessProfile {
		business_name: String::from("Reliable Plumbing"),
		trade: Trade::Plumbing,
		address: AnchorAddress {
			address: String::from("100 Main St, Los Angeles, CA 90012"),
			lat: 34.0522,
			lng: -118.2437,
		},
		service_radius_miles: 25.0,
		utc_offset_minutes: -420,
		business_hours: week("07:00", "18:00", false),
		phone_hours: week("06:00", "22:00", true),
		capacity: CapacityRules {
			max_jobs_per_day: 6,
			min_buffer_between_jobs_minutes: 15,
			max_after_hours_jobs_per_day: 2,
		},
		travel: TravelLimits {
			max_travel_time_minutes: 30,
			max_travel_distance_miles: 25.0,
		},
		accept_emergencies: true,
		out_of_office: false,
		overtime_allowed: true,
		accept_after_hours_emergency: true,
		pricing: vec![
			estimate("water_heater", 2.5, 150.0, 300.0),
			estimate("toilet", 1.5, 125.0, 250.0),
			estimate("faucet", 1.0, 100.0, 200.0),
			estimate("drain_clog", 1.5, 150.0, 275.0),
			estimate("leak", 2.0, 150.0, 350.0),
			estimate("diagnostic", 1.0, 75.0, 150.0),
		],
		emergency_multipliers: EmergencyMultipliers::default(),
		emergency_phone: Some(String::from("+13105550199")),
	}
}

pub fn utc(s: &str) -> DateTime<Utc> {
	DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
}

pub fn calendar_event(id: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> CalendarEvent {
	CalendarEvent {
		event_id: id.to_string(),
		start,
		end,
		location: EventLocation {
			address: String::from("321 Existing Job Ln"),
			lat: 34.0736,
			lng: -118.4004,
		},
		booking_type: BookingType::Confirmed,
		job_type: None,
	}
}

pub fn base_request(message: &str, current_time: DateTime<Utc>) -> DispatchRequest {
	DispatchRequest {
		caller_phone: String::from("+13105551234"),
		called_number: String::from("+12135550100"),
		conversation_sid: String::from("CA0001"),
		current_message: message.to_string(),
		conversation_history: Vec::new(),
		business_profile: test_profile(),
		calendar: Vec::new(),
		current_time,
	}
}
