use crate::dispatch::address::{self, ResolvedAddress};
use crate::dispatch::conversation::{self, OFFER_PROMPT};
use crate::dispatch::emergency;
use crate::dispatch::mediator::{self, BreakerRegistry, CircuitBreaker, CircuitState, ProviderError};
use crate::dispatch::nlu;
use crate::dispatch::pricing::{self, TimeBucket};
use crate::dispatch::providers::{Coordinates, ProviderSet};
use crate::dispatch::scheduling::{self, ScheduleResult};
use crate::dispatch::travel;
use crate::dispatch::dedup::DedupCache;
use crate::http_models::dispatch::{
	Confirmation, ConversationStage, ConversationTurn, DispatchRequest, Extraction, Sender,
	SlotKind, Urgency, ValidationError,
};
use crate::http_models::profile::{
	AnchorAddress, BookingType, BusinessProfile, CalendarEvent, CapacityRules, DayHours,
	EmergencyMultipliers, EventLocation, JobEstimate, Trade, TravelLimits, WeekHours,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

// TEST FIXTURES

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
		sunday: if include_sunday {
			hours(start, end)
		} else {
			None
		},
	}
}

fn estimate(job: &str, hours: f64, min: f64, max: f64) -> JobEstimate {
	JobEstimate {
		job_type: job.to_string(),
		estimated_hours: hours,
		cost_min: min,
		cost_max: max,
		urgency_multiplier: None,
	}
}

/// A plumbing profile in Los Angeles: 25mi radius, Pacific daylight time,
/// 07:00-18:00 business hours, 06:00-22:00 phone hours.
fn test_profile() -> BusinessProfile {
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

/// Customer coordinates used across scheduling tests: Beverly Hills-ish,
/// about 9.7 miles from the anchor.
fn customer_point() -> ResolvedAddress {
	let anchor = Coordinates::new(34.0522, -118.2437);
	let customer = Coordinates::new(34.0901, -118.4065);
	ResolvedAddress {
		formatted: String::from("789 Sunset Blvd, Beverly Hills, CA 90210"),
		lat: customer.lat,
		lng: customer.lng,
		in_service_area: true,
		distance_miles: address::haversine_miles(anchor, customer),
		geocoded: true,
	}
}

fn calendar_event(id: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> CalendarEvent {
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

fn utc(s: &str) -> DateTime<Utc> {
	DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
}

fn local(s: &str) -> NaiveDateTime {
	NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S").unwrap()
}

fn base_request(message: &str, current_time: DateTime<Utc>) -> DispatchRequest {
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

// ADDRESS RESOLVER

/// Whitespace collapses and stray punctuation around the address goes away
#[test]
fn test_address_normalize() {
	assert_eq!(
		address::normalize("  789   Sunset Blvd,  90210. "),
		"789 Sunset Blvd, 90210"
	);
	assert_eq!(address::normalize("!!help!!"), "help");
}

/// Street numbers or ZIP tokens make an address worth geocoding
#[test]
fn test_address_specificity_gate() {
	assert!(address::looks_specific("789 Sunset Blvd"));
	assert!(address::looks_specific("somewhere in 90210"));
	assert!(!address::looks_specific("the house with the red door"));
	assert!(!address::looks_specific("my place"));
}

/// Haversine sanity: zero distance and a known LA pair
#[test]
fn test_haversine() {
	let anchor = Coordinates::new(34.0522, -118.2437);
	assert_eq!(address::haversine_miles(anchor, anchor), 0.0);

	let beverly_hills = Coordinates::new(34.0901, -118.4065);
	let miles = address::haversine_miles(anchor, beverly_hills);
	assert!(miles > 9.0 && miles < 10.5, "got {miles}");
}

/// Vague text never reaches the provider
#[tokio::test]
async fn test_resolve_rejects_vague_address() {
	let profile = test_profile();
	let breakers = BreakerRegistry::new(5, 30_000);
	let mut diagnostics = Vec::new();
	let outcome = address::resolve(
		"the blue house",
		&profile.address,
		profile.service_radius_miles,
		&ProviderSet::default(),
		&breakers,
		&mut diagnostics,
	)
	.await;
	assert_eq!(outcome, Err(address::Unresolved::NeedSpecificAddress));
}

/// No geocoder configured behaves like a provider failure
#[tokio::test]
async fn test_resolve_without_provider_fails_geocode() {
	let profile = test_profile();
	let breakers = BreakerRegistry::new(5, 30_000);
	let mut diagnostics = Vec::new();
	let outcome = address::resolve(
		"789 Sunset Blvd, 90210",
		&profile.address,
		profile.service_radius_miles,
		&ProviderSet::default(),
		&breakers,
		&mut diagnostics,
	)
	.await;
	assert_eq!(outcome, Err(address::Unresolved::GeocodeFailed));
	assert!(!diagnostics.is_empty());
}

// TRAVEL-TIME ESTIMATOR

/// Rush-hour curve: weekday peaks, Saturday midday, free flow elsewhere
#[test]
fn test_rush_factor() {
	// 2025-08-06 is a Wednesday, 2025-08-09 a Saturday, 2025-08-10 a Sunday
	assert_eq!(travel::rush_factor(local("2025-08-06T08:00:00")), 1.9);
	assert_eq!(travel::rush_factor(local("2025-08-06T17:00:00")), 1.9);
	assert_eq!(travel::rush_factor(local("2025-08-06T12:00:00")), 1.0);
	assert_eq!(travel::rush_factor(local("2025-08-09T11:00:00")), 1.2);
	assert_eq!(travel::rush_factor(local("2025-08-09T08:00:00")), 1.0);
	assert_eq!(travel::rush_factor(local("2025-08-10T08:00:00")), 1.0);
}

/// Model minutes: base at 30mph, factor applied, 5 minute overhead, ceil
#[test]
fn test_model_minutes() {
	assert_eq!(travel::model_minutes(15.0, local("2025-08-06T12:00:00")), 35);
	assert_eq!(travel::model_minutes(15.0, local("2025-08-06T08:00:00")), 62);
	assert_eq!(travel::model_minutes(0.0, local("2025-08-06T12:00:00")), 5);
}

// NLU EXTRACTOR

/// Balanced-object extraction cuts through prose and code fences
#[test]
fn test_first_json_object() {
	let wrapped = "Sure! Here is the JSON:\n```json\n{\"a\": {\"b\": 1}, \"c\": \"}\"}\n``` hope that helps";
	assert_eq!(
		nlu::first_json_object(wrapped),
		Some("{\"a\": {\"b\": 1}, \"c\": \"}\"}")
	);
	assert_eq!(nlu::first_json_object("no json here"), None);
	assert_eq!(nlu::first_json_object("{unclosed"), None);
}

/// Table ordering: the named appliance wins over the generic symptom
#[test]
fn test_fallback_job_ordering() {
	let extraction = nlu::fallback_extract("Water heater burst in basement!", Trade::Plumbing);
	assert_eq!(extraction.job_type.as_deref(), Some("water_heater"));
	assert_eq!(extraction.job_confidence, 0.6);
}

/// An emergency keyword with a negation within three tokens does not count
#[test]
fn test_fallback_negated_emergency() {
	let extraction = nlu::fallback_extract("no flooding here, just annoyed", Trade::Plumbing);
	assert_eq!(extraction.urgency_hint, Urgency::Normal);

	let extraction = nlu::fallback_extract("basement is flooding", Trade::Plumbing);
	assert_eq!(extraction.urgency_hint, Urgency::Emergency);
}

/// Intensifiers raise normal to urgent
#[test]
fn test_fallback_intensifier() {
	let extraction = nlu::fallback_extract("faucet is leaking bad", Trade::Plumbing);
	assert_eq!(extraction.urgency_hint, Urgency::Urgent);
	assert_eq!(extraction.job_type.as_deref(), Some("faucet"));
}

/// The address regex finds the street-and-ZIP run inside a sentence
#[test]
fn test_fallback_address_regex() {
	let extraction = nlu::fallback_extract(
		"Water heater burst in basement! 789 Sunset Blvd, 90210",
		Trade::Plumbing,
	);
	assert_eq!(
		extraction.address_text.as_deref(),
		Some("789 Sunset Blvd, 90210")
	);

	let extraction = nlu::fallback_extract("Bathroom faucet dripping, 789 Oak St 90210", Trade::Plumbing);
	assert_eq!(extraction.address_text.as_deref(), Some("789 Oak St 90210"));
}

/// Literal confirmation sets, trimmed and lowercased
#[test]
fn test_fallback_confirmation() {
	assert_eq!(
		nlu::fallback_extract("YES", Trade::Plumbing).confirmation,
		Confirmation::Yes
	);
	assert_eq!(
		nlu::fallback_extract("  book it ", Trade::Plumbing).confirmation,
		Confirmation::Yes
	);
	assert_eq!(
		nlu::fallback_extract("different time", Trade::Plumbing).confirmation,
		Confirmation::No
	);
	assert_eq!(
		nlu::fallback_extract("maybe tomorrow", Trade::Plumbing).confirmation,
		Confirmation::Unknown
	);
}

/// A locksmith lockout reads as that trade's emergency
#[test]
fn test_fallback_locksmith() {
	let extraction = nlu::fallback_extract("I'm locked out of my house", Trade::Locksmith);
	assert_eq!(extraction.job_type.as_deref(), Some("lockout"));
	assert_eq!(extraction.urgency_hint, Urgency::Emergency);
}

// EMERGENCY CLASSIFIER

/// Keyword re-check upgrades a soft NLU reading
#[test]
fn test_classifier_keyword_upgrade() {
	let profile = test_profile();
	let extraction = Extraction {
		urgency_hint: Urgency::Normal,
		urgency_confidence: 0.4,
		..Extraction::default()
	};
	let assessment = emergency::classify(
		&extraction,
		"water is gushing everywhere",
		local("2025-08-06T14:00:00"),
		&profile,
	);
	assert_eq!(assessment.urgency, Urgency::Emergency);
	assert!(assessment.is_emergency);
}

/// Emergencies at a business that refuses them are not emergencies
#[test]
fn test_classifier_respects_toggle() {
	let mut profile = test_profile();
	profile.accept_emergencies = false;
	let extraction = Extraction {
		urgency_hint: Urgency::Emergency,
		urgency_confidence: 0.9,
		..Extraction::default()
	};
	let assessment = emergency::classify(
		&extraction,
		"burst pipe",
		local("2025-08-06T14:00:00"),
		&profile,
	);
	assert_eq!(assessment.urgency, Urgency::Emergency);
	assert!(!assessment.is_emergency);
}

// PRICING CALCULATOR

#[test]
fn test_time_buckets() {
	assert_eq!(pricing::bucket_for(local("2025-08-06T06:10:00")), TimeBucket::EarlySix);
	assert_eq!(pricing::bucket_for(local("2025-08-06T06:45:00")), TimeBucket::EarlySixThirty);
	assert_eq!(pricing::bucket_for(local("2025-08-06T12:00:00")), TimeBucket::Work);
	assert_eq!(pricing::bucket_for(local("2025-08-06T18:30:00")), TimeBucket::Evening);
	assert_eq!(pricing::bucket_for(local("2025-08-06T23:00:00")), TimeBucket::Night);
	assert_eq!(pricing::bucket_for(local("2025-08-06T02:00:00")), TimeBucket::Night);
}

/// Work-hours emergency runs the 1.5-2.0 multiplier range
#[test]
fn test_pricing_work_emergency() {
	let profile = test_profile();
	let row = profile.estimate_for("water_heater").unwrap();
	let price = pricing::price(row, local("2025-08-06T17:30:00"), Urgency::Emergency, &profile);
	assert_eq!(price.min, 225);
	assert_eq!(price.max, 600);
}

/// Night emergency runs 2.5-3.0
#[test]
fn test_pricing_night_emergency() {
	let profile = test_profile();
	let row = profile.estimate_for("water_heater").unwrap();
	let price = pricing::price(row, local("2025-08-06T23:00:00"), Urgency::Emergency, &profile);
	assert_eq!(price.min, 375);
	assert_eq!(price.max, 900);
}

/// Weekend adds half a multiplier on top of the bucket
#[test]
fn test_pricing_weekend_uplift() {
	let profile = test_profile();
	let row = profile.estimate_for("faucet").unwrap();
	// Saturday work hours, not an emergency: 1.0 + 0.5
	let price = pricing::price(row, local("2025-08-09T10:00:00"), Urgency::Normal, &profile);
	assert_eq!(price.min, 150);
	assert_eq!(price.max, 300);
}

/// Early-morning factors at 06:00 and 06:30
#[test]
fn test_pricing_early_morning() {
	let profile = test_profile();
	let row = profile.estimate_for("faucet").unwrap();
	let six = pricing::price(row, local("2025-08-06T06:10:00"), Urgency::Normal, &profile);
	assert_eq!((six.min, six.max), (150, 300));
	let six_thirty = pricing::price(row, local("2025-08-06T06:40:00"), Urgency::Normal, &profile);
	assert_eq!((six_thirty.min, six_thirty.max), (125, 250));
}

/// Per-job override replaces both emergency bounds
#[test]
fn test_pricing_override() {
	let profile = test_profile();
	let mut row = profile.estimate_for("water_heater").unwrap().clone();
	row.urgency_multiplier = Some(2.5);
	let price = pricing::price(&row, local("2025-08-06T12:00:00"), Urgency::Emergency, &profile);
	assert_eq!(price.min, 375);
	assert_eq!(price.max, 750);
}

/// Identical inputs, identical outputs
#[test]
fn test_pricing_idempotent() {
	let profile = test_profile();
	let row = profile.estimate_for("leak").unwrap();
	let at = local("2025-08-06T09:00:00");
	assert_eq!(
		pricing::price(row, at, Urgency::Emergency, &profile),
		pricing::price(row, at, Urgency::Emergency, &profile)
	);
}

// SCHEDULING ENGINE

/// Same-day emergency lands after the existing job plus travel and buffer,
/// aligned to the quarter hour: 17:30-20:00 local
#[tokio::test]
async fn test_same_day_emergency_slot() {
	let mut req = base_request(
		"Water heater burst in basement! 789 Sunset Blvd, 90210",
		utc("2025-08-06T21:15:00Z"),
	);
	// 15:30-17:00 local existing job
	req.calendar = vec![calendar_event(
		"ev1",
		utc("2025-08-06T22:30:00Z"),
		utc("2025-08-07T00:00:00Z"),
	)];

	let breakers = BreakerRegistry::new(5, 30_000);
	let mut diagnostics = Vec::new();
	let row = req.business_profile.estimate_for("water_heater").unwrap().clone();
	let result = scheduling::find_slot(
		&req,
		&customer_point(),
		Urgency::Emergency,
		true,
		&row,
		&ProviderSet::default(),
		&breakers,
		&mut diagnostics,
	)
	.await;

	let slot = result.slot.expect("expected a same-day slot");
	assert_eq!(slot.start, utc("2025-08-07T00:30:00Z")); // 17:30 local
	assert_eq!(slot.end, utc("2025-08-07T03:00:00Z")); // 20:00 local
	assert_eq!(slot.booking_type, BookingType::Confirmed);
	// Runs past the 18:00 close, so it burns an after-hours slot
	assert_eq!(slot.slot_kind, SlotKind::AfterHoursEmergency);
	assert!(slot.travel_in.minutes <= req.business_profile.travel.max_travel_time_minutes);
}

/// With tonight's after-hours quota already spent, an in-hours emergency
/// cannot spill past close; it lands inside business hours instead.
#[tokio::test]
async fn test_in_hours_emergency_respects_quota() {
	let mut req = base_request(
		"Water heater burst! 789 Sunset Blvd, 90210",
		utc("2025-08-06T21:15:00Z"), // 14:15 local
	);
	// Two after-hours jobs already booked tonight: 18:30-19:30 and 20:00-21:00
	req.calendar = vec![
		calendar_event("ah1", utc("2025-08-07T01:30:00Z"), utc("2025-08-07T02:30:00Z")),
		calendar_event("ah2", utc("2025-08-07T03:00:00Z"), utc("2025-08-07T04:00:00Z")),
	];

	let breakers = BreakerRegistry::new(5, 30_000);
	let mut diagnostics = Vec::new();
	let row = req.business_profile.estimate_for("water_heater").unwrap().clone();
	let result = scheduling::find_slot(
		&req,
		&customer_point(),
		Urgency::Emergency,
		true,
		&row,
		&ProviderSet::default(),
		&breakers,
		&mut diagnostics,
	)
	.await;

	let slot = result.slot.expect("expected an in-hours slot");
	assert_eq!(slot.slot_kind, SlotKind::Regular);
	// 18:00 local close
	assert!(slot.end <= utc("2025-08-07T01:00:00Z"));
}

/// A full day rolls over to a tentative next-day offer, with the capacity
/// violation still reported
#[tokio::test]
async fn test_capacity_rolls_to_next_day() {
	let mut req = base_request(
		"Bathroom faucet dripping, 789 Oak St 90210",
		utc("2025-08-06T21:15:00Z"),
	);
	// Six one-hour jobs booked today (max_jobs_per_day = 6)
	req.calendar = (0..6)
		.map(|i| {
			let start = utc("2025-08-06T14:00:00Z") + chrono::Duration::hours(i);
			calendar_event(&format!("ev{i}"), start, start + chrono::Duration::minutes(50))
		})
		.collect();

	let breakers = BreakerRegistry::new(5, 30_000);
	let mut diagnostics = Vec::new();
	let row = req.business_profile.estimate_for("faucet").unwrap().clone();
	let result = scheduling::find_slot(
		&req,
		&customer_point(),
		Urgency::Normal,
		false,
		&row,
		&ProviderSet::default(),
		&breakers,
		&mut diagnostics,
	)
	.await;

	assert!(result.has(ValidationError::CapacityExceeded));
	let slot = result.slot.expect("expected a next-day slot");
	assert_eq!(slot.booking_type, BookingType::Tentative);
	// Next day, inside business hours
	let start_local = req.business_profile.local_time(slot.start);
	assert_eq!(start_local.date(), NaiveDate::from_ymd_opt(2025, 8, 7).unwrap());
}

/// Outside the radius nothing is offered
#[tokio::test]
async fn test_out_of_service_area_rejects() {
	let req = base_request("Toilet clogged, 456 Remote Rd, 93555", utc("2025-08-06T21:15:00Z"));
	let far = ResolvedAddress {
		formatted: String::from("456 Remote Rd, Ridgecrest, CA 93555"),
		lat: 35.6225,
		lng: -117.6709,
		in_service_area: false,
		distance_miles: 110.0,
		geocoded: true,
	};

	let breakers = BreakerRegistry::new(5, 30_000);
	let mut diagnostics = Vec::new();
	let row = req.business_profile.estimate_for("toilet").unwrap().clone();
	let result = scheduling::find_slot(
		&req,
		&far,
		Urgency::Normal,
		false,
		&row,
		&ProviderSet::default(),
		&breakers,
		&mut diagnostics,
	)
	.await;

	assert!(result.slot.is_none());
	assert_eq!(result.errors, vec![ValidationError::OutOfServiceArea]);
}

/// After-hours emergencies stop at the nightly quota
#[tokio::test]
async fn test_after_hours_quota() {
	let mut req = base_request(
		"Pipe burst! 789 Sunset Blvd 90210",
		utc("2025-08-07T02:45:00Z"), // 19:45 local, after close
	);
	// Two after-hours jobs already tonight (max_after_hours_jobs_per_day = 2)
	req.calendar = vec![
		calendar_event("ah1", utc("2025-08-07T01:30:00Z"), utc("2025-08-07T02:15:00Z")),
		calendar_event("ah2", utc("2025-08-07T03:00:00Z"), utc("2025-08-07T04:00:00Z")),
	];

	let breakers = BreakerRegistry::new(5, 30_000);
	let mut diagnostics = Vec::new();
	let row = req.business_profile.estimate_for("burst_pipe")
		.cloned()
		.unwrap_or_else(|| req.business_profile.estimate_for("diagnostic").unwrap().clone());
	let result = scheduling::find_slot(
		&req,
		&customer_point(),
		Urgency::Emergency,
		true,
		&row,
		&ProviderSet::default(),
		&breakers,
		&mut diagnostics,
	)
	.await;

	assert!(result.has(ValidationError::AfterHoursQuotaReached));
	// The next-day funnel still offers tomorrow
	let slot = result.slot.expect("expected a next-day fallback slot");
	assert_eq!(slot.booking_type, BookingType::Tentative);
}

/// An eligible after-hours emergency ends inside phone hours
#[tokio::test]
async fn test_after_hours_slot_within_phone_hours() {
	let req = base_request(
		"Toilet overflowing everywhere! 789 Sunset Blvd 90210",
		utc("2025-08-07T02:00:00Z"), // 19:00 local
	);

	let breakers = BreakerRegistry::new(5, 30_000);
	let mut diagnostics = Vec::new();
	let row = req.business_profile.estimate_for("toilet").unwrap().clone();
	let result = scheduling::find_slot(
		&req,
		&customer_point(),
		Urgency::Emergency,
		true,
		&row,
		&ProviderSet::default(),
		&breakers,
		&mut diagnostics,
	)
	.await;

	let slot = result.slot.expect("expected an after-hours slot");
	assert_eq!(slot.slot_kind, crate::http_models::dispatch::SlotKind::AfterHoursEmergency);
	let end_local = req.business_profile.local_time(slot.end);
	assert!(end_local.time() <= NaiveTime::from_hms_opt(22, 0, 0).unwrap());
}

// CONVERSATION ORCHESTRATOR

#[test]
fn test_prior_stage_derivation() {
	assert_eq!(conversation::prior_stage(&[]), ConversationStage::Initial);

	let asked = vec![ConversationTurn {
		sender: Sender::Bot,
		text: String::from("What's the service address?"),
		timestamp: utc("2025-08-06T21:00:00Z"),
	}];
	assert_eq!(conversation::prior_stage(&asked), ConversationStage::CollectingInfo);

	let offered = vec![ConversationTurn {
		sender: Sender::Bot,
		text: format!("We can come today 2-4 PM for $100-$200. {OFFER_PROMPT}"),
		timestamp: utc("2025-08-06T21:00:00Z"),
	}];
	assert_eq!(conversation::prior_stage(&offered), ConversationStage::Confirming);
}

/// Offers do not count against the two-question cap
#[test]
fn test_questions_asked_excludes_offers() {
	let history = vec![
		ConversationTurn {
			sender: Sender::Bot,
			text: String::from("What's going on, and what's the service address?"),
			timestamp: utc("2025-08-06T21:00:00Z"),
		},
		ConversationTurn {
			sender: Sender::Customer,
			text: String::from("Leak at 789 Oak St 90210"),
			timestamp: utc("2025-08-06T21:01:00Z"),
		},
		ConversationTurn {
			sender: Sender::Bot,
			text: format!("We can come today 2-4 PM for $100-$200. {OFFER_PROMPT}"),
			timestamp: utc("2025-08-06T21:02:00Z"),
		},
	];
	assert_eq!(conversation::questions_asked(&history), 1);
}

/// A re-sent question is one distinct question, not two
#[test]
fn test_questions_asked_distinct() {
	let question = |at: &str| ConversationTurn {
		sender: Sender::Bot,
		text: String::from("What's the full service address, including street number and ZIP code?"),
		timestamp: utc(at),
	};
	let history = vec![
		question("2025-08-06T21:00:00Z"),
		ConversationTurn {
			sender: Sender::Customer,
			text: String::from("huh?"),
			timestamp: utc("2025-08-06T21:01:00Z"),
		},
		question("2025-08-06T21:02:00Z"),
	];
	assert_eq!(conversation::questions_asked(&history), 1);
}

#[test]
fn test_format_window() {
	assert_eq!(
		conversation::format_window(
			NaiveTime::from_hms_opt(17, 30, 0).unwrap(),
			NaiveTime::from_hms_opt(20, 0, 0).unwrap()
		),
		"5:30-8:00 PM"
	);
	assert_eq!(
		conversation::format_window(
			NaiveTime::from_hms_opt(11, 30, 0).unwrap(),
			NaiveTime::from_hms_opt(13, 0, 0).unwrap()
		),
		"11:30 AM-1:00 PM"
	);
}

#[test]
fn test_format_day() {
	let today = NaiveDate::from_ymd_opt(2025, 8, 6).unwrap();
	assert_eq!(conversation::format_day(today, today), "today");
	assert_eq!(
		conversation::format_day(today.succ_opt().unwrap(), today),
		"tomorrow"
	);
	assert_eq!(
		conversation::format_day(NaiveDate::from_ymd_opt(2025, 8, 8).unwrap(), today),
		"Friday"
	);
}

// EXTERNAL-CALL MEDIATOR

/// The breaker opens at the threshold and half-opens after the reset
#[test]
fn test_breaker_lifecycle() {
	let breaker = CircuitBreaker::new(3, Duration::from_millis(50));
	assert!(breaker.try_acquire());

	breaker.record_failure();
	breaker.record_failure();
	assert_eq!(breaker.state(), CircuitState::Closed);
	breaker.record_failure();
	assert_eq!(breaker.state(), CircuitState::Open);
	assert!(!breaker.try_acquire());

	std::thread::sleep(Duration::from_millis(60));
	assert!(breaker.try_acquire());
	assert_eq!(breaker.state(), CircuitState::HalfOpen);

	breaker.record_success();
	assert_eq!(breaker.state(), CircuitState::Closed);
}

/// Transient errors are retried to the cap; the attempt count shows it
#[tokio::test]
async fn test_guarded_retries_transient() {
	let breaker = CircuitBreaker::new(5, Duration::from_millis(100));
	let attempts = Arc::new(AtomicU32::new(0));
	let seen = attempts.clone();

	let outcome: Result<(), ProviderError> =
		mediator::guarded(&breaker, "test", 1_000, move || {
			let seen = seen.clone();
			async move {
				seen.fetch_add(1, Ordering::SeqCst);
				Err(ProviderError::Transient(String::from("boom")))
			}
		})
		.await;

	assert!(outcome.is_err());
	assert_eq!(attempts.load(Ordering::SeqCst), 3); // initial + 2 retries
}

/// Fatal answers are not retried
#[tokio::test]
async fn test_guarded_fatal_no_retry() {
	let breaker = CircuitBreaker::new(5, Duration::from_millis(100));
	let attempts = Arc::new(AtomicU32::new(0));
	let seen = attempts.clone();

	let outcome: Result<(), ProviderError> =
		mediator::guarded(&breaker, "test", 1_000, move || {
			let seen = seen.clone();
			async move {
				seen.fetch_add(1, Ordering::SeqCst);
				Err(ProviderError::Fatal(String::from("bad key")))
			}
		})
		.await;

	assert_eq!(outcome, Err(ProviderError::Fatal(String::from("bad key"))));
	assert_eq!(attempts.load(Ordering::SeqCst), 1);
}

/// An open circuit means the call is never attempted
#[tokio::test]
async fn test_guarded_open_circuit_skips() {
	let breaker = CircuitBreaker::new(1, Duration::from_secs(60));
	breaker.record_failure();
	let outcome: Result<(), ProviderError> = mediator::guarded(&breaker, "test", 1_000, || async {
		panic!("should not be called");
	})
	.await;
	assert_eq!(outcome, Err(ProviderError::CircuitOpen));
}

// TURN DEDUPLICATOR

/// Identical turns replay; a new message in the same conversation does not
#[test]
fn test_dedup_keying() {
	let cache = DedupCache::new(16, 1);
	let req = base_request("hello", utc("2025-08-06T21:15:00Z"));
	assert!(cache.lookup(&req).is_none());

	let decision = crate::http_models::dispatch::Decision {
		extracted_info: Extraction::default(),
		validation: Default::default(),
		proposed_slot: None,
		next_action: crate::http_models::dispatch::NextAction::ContinueConversation,
		message_to_customer: String::from("hi"),
		conversation_stage: ConversationStage::CollectingInfo,
		follow_up_needed: true,
		follow_up_delay_minutes: Some(30),
		diagnostics: Vec::new(),
	};
	cache.record(&req, &decision);
	assert_eq!(cache.lookup(&req).unwrap().message_to_customer, "hi");

	let mut next_turn = req.clone();
	next_turn.current_message = String::from("something else");
	assert!(cache.lookup(&next_turn).is_none());
}

// REQUEST VALIDATION

#[test]
fn test_request_validation() {
	let good = base_request("help", utc("2025-08-06T21:15:00Z"));
	assert!(good.validate().is_ok());

	let mut bad_phone = good.clone();
	bad_phone.caller_phone = String::from("310-555-1234");
	assert!(bad_phone.validate().is_err());

	let mut long_message = good.clone();
	long_message.current_message = "x".repeat(1001);
	assert!(long_message.validate().is_err());

	let mut bad_radius = good.clone();
	bad_radius.business_profile.service_radius_miles = 500.0;
	assert!(bad_radius.validate().is_err());

	let mut bad_hours = good.clone();
	bad_hours.business_profile.business_hours.monday = Some(DayHours {
		start: String::from("7am"),
		end: String::from("18:00"),
	});
	assert!(bad_hours.validate().is_err());
}

// SCHEDULE RESULT PLUMBING

#[test]
fn test_schedule_result_default() {
	let result = ScheduleResult::default();
	assert!(result.slot.is_none());
	assert!(result.errors.is_empty());
	assert!(!result.has(ValidationError::CapacityExceeded));
}
