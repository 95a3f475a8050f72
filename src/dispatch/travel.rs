/*
 * src/dispatch/travel.rs
 *
 * Travel-Time Estimator
 *
 * Purpose:
 *   Minute-accurate drive estimates between two coordinates at a given
 *   local departure time, live provider first, rush-hour model otherwise
 */

use chrono::{Datelike, NaiveDateTime, NaiveTime, Weekday};
use tracing::debug;

use crate::dispatch::address::haversine_miles;
use crate::dispatch::mediator::{self, BreakerRegistry};
use crate::dispatch::providers::{Coordinates, ProviderSet, TrafficProvider};
use crate::global::{AVERAGE_SPEED_MPH, TRAFFIC_DEADLINE_MS, TRAVEL_FIXED_OVERHEAD_MIN};

/// A single travel leg.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TravelEstimate {
	pub minutes: u32,
	pub miles: f64,
	/// Whether the minutes came from the live provider
	pub live: bool,
}

/// Congestion multiplier for the rush-hour model: weekday commute peaks at
/// 1.9, Saturday midday at 1.2, free flow otherwise.
pub fn rush_factor(depart_local: NaiveDateTime) -> f64 {
	let t = depart_local.time();
	let within = |from: (u32, u32), to: (u32, u32)| {
		t >= NaiveTime::from_hms_opt(from.0, from.1, 0).unwrap()
			&& t < NaiveTime::from_hms_opt(to.0, to.1, 0).unwrap()
	};
	match depart_local.weekday() {
		Weekday::Sat => {
			if within((10, 0), (14, 0)) {
				1.2
			} else {
				1.0
			}
		}
		Weekday::Sun => 1.0,
		_ => {
			if within((7, 0), (10, 0)) || within((16, 0), (19, 0)) {
				1.9
			} else {
				1.0
			}
		}
	}
}

/// Model-only estimate: base minutes at average speed, scaled by the
/// rush-hour factor, plus the fixed origin/destination overhead. Rounds up.
pub fn model_minutes(miles: f64, depart_local: NaiveDateTime) -> u32 {
	let base = miles / AVERAGE_SPEED_MPH * 60.0;
	(base * rush_factor(depart_local)).ceil() as u32 + TRAVEL_FIXED_OVERHEAD_MIN
}

/// Estimate one leg. `use_live` is false for next-day planning, where the
/// averaged model is the contract.
pub async fn estimate(
	from: Coordinates,
	to: Coordinates,
	depart_local: NaiveDateTime,
	providers: &ProviderSet,
	breakers: &BreakerRegistry,
	use_live: bool,
	diagnostics: &mut Vec<String>,
) -> TravelEstimate {
	let miles = haversine_miles(from, to);

	if use_live {
		if let Some(traffic) = providers.traffic.as_ref() {
			let live = mediator::guarded(&breakers.traffic, "traffic", TRAFFIC_DEADLINE_MS, || {
				let traffic: &dyn TrafficProvider = traffic.as_ref();
				async move { traffic.route_minutes(from, to, depart_local).await }
			})
			.await;

			match live {
				Ok(minutes) => {
					return TravelEstimate {
						minutes,
						miles,
						live: true,
					};
				}
				Err(err) => {
					debug!("traffic fallback to model: {err}");
					diagnostics.push(format!("traffic provider unavailable: {err}"));
				}
			}
		}
	}

	TravelEstimate {
		minutes: model_minutes(miles, depart_local),
		miles,
		live: false,
	}
}
