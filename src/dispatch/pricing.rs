/*
 * src/dispatch/pricing.rs
 *
 * Pricing Calculator
 *
 * Purpose:
 *   Per-trade base estimates scaled by time-of-day bucket, emergency
 *   multipliers, and the weekend uplift
 */

use chrono::{Datelike, NaiveDateTime, NaiveTime, Weekday};

use crate::http_models::dispatch::Urgency;
use crate::http_models::profile::{BusinessProfile, JobEstimate};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeBucket {
	/// 07:00-18:00
	Work,
	/// 18:00-19:30
	Evening,
	/// 19:30-06:00
	Night,
	/// 06:00-06:30
	EarlySix,
	/// 06:30-07:00
	EarlySixThirty,
}

pub fn bucket_for(local: NaiveDateTime) -> TimeBucket {
	let t = local.time();
	let at = |h, m| NaiveTime::from_hms_opt(h, m, 0).unwrap();
	if t >= at(6, 0) && t < at(6, 30) {
		TimeBucket::EarlySix
	} else if t >= at(6, 30) && t < at(7, 0) {
		TimeBucket::EarlySixThirty
	} else if t >= at(7, 0) && t < at(18, 0) {
		TimeBucket::Work
	} else if t >= at(18, 0) && t < at(19, 30) {
		TimeBucket::Evening
	} else {
		TimeBucket::Night
	}
}

pub fn is_weekend(local: NaiveDateTime) -> bool {
	matches!(local.weekday(), Weekday::Sat | Weekday::Sun)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceRange {
	pub min: u32,
	pub max: u32,
}

/// Price a job at a slot start. Deterministic: identical inputs always give
/// identical output. Output is whole currency units, rounded up.
pub fn price(
	estimate: &JobEstimate,
	slot_start_local: NaiveDateTime,
	urgency: Urgency,
	profile: &BusinessProfile,
) -> PriceRange {
	let m = &profile.emergency_multipliers;
	let emergency = urgency == Urgency::Emergency;

	let (mut factor_min, mut factor_max) = match bucket_for(slot_start_local) {
		TimeBucket::Work => {
			if emergency {
				(m.work_min, m.work_max)
			} else {
				(1.0, 1.0)
			}
		}
		TimeBucket::Evening => {
			if emergency {
				(m.evening_min, m.evening_max)
			} else {
				// Non-emergencies are quoted next-morning rates; the
				// scheduler only lands them there anyway
				(1.0, 1.0)
			}
		}
		TimeBucket::Night => {
			if emergency {
				(m.night_min, m.night_max)
			} else {
				(1.0, 1.0)
			}
		}
		TimeBucket::EarlySix => (m.early_6am, m.early_6am),
		TimeBucket::EarlySixThirty => (m.early_630am, m.early_630am),
	};

	// Per-job override replaces the bucket bounds for emergency work
	if emergency {
		if let Some(override_factor) = estimate.urgency_multiplier {
			factor_min = override_factor;
			factor_max = override_factor;
		}
	}

	if is_weekend(slot_start_local) {
		factor_min += m.weekend_uplift;
		factor_max += m.weekend_uplift;
	}

	PriceRange {
		min: (estimate.cost_min * factor_min).ceil() as u32,
		max: (estimate.cost_max * factor_max).ceil() as u32,
	}
}

/// The estimate row for a job type, falling back to the diagnostic visit.
pub fn estimate_or_diagnostic<'a>(
	profile: &'a BusinessProfile,
	job_type: Option<&str>,
) -> Option<&'a JobEstimate> {
	match job_type {
		Some(job) => profile
			.estimate_for(job)
			.or_else(|| profile.diagnostic_estimate()),
		None => profile.diagnostic_estimate(),
	}
}
