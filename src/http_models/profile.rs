/*
 * src/http_models/profile.rs
 *
 * Business configuration carried on every dispatch request
 *
 * Purpose:
 *   Strongly-typed business profile, pricing table, and calendar payloads
 */

use chrono::{DateTime, Datelike, Duration, NaiveDateTime, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

/// The five supported trades. A request's `called_number` routes to exactly
/// one profile, and the profile pins the trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Trade {
	Plumbing,
	Electrical,
	Hvac,
	Locksmith,
	GarageDoor,
}

impl fmt::Display for Trade {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			Trade::Plumbing => "plumbing",
			Trade::Electrical => "electrical",
			Trade::Hvac => "HVAC",
			Trade::Locksmith => "locksmith",
			Trade::GarageDoor => "garage door",
		};
		write!(f, "{name}")
	}
}

/// The business's home base. Slots with no prior calendar event measure their
/// inbound travel leg from here.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AnchorAddress {
	pub address: String,
	pub lat: f64,
	pub lng: f64,
}

/// Opening window for one weekday, `"HH:MM"` 24-hour strings.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DayHours {
	pub start: String,
	pub end: String,
}

impl DayHours {
	/// Parse into `NaiveTime` bounds. `Err` carries the offending string.
	pub fn parse(&self) -> Result<(NaiveTime, NaiveTime), String> {
		let start = NaiveTime::parse_from_str(&self.start, "%H:%M")
			.map_err(|_| self.start.clone())?;
		let end = NaiveTime::parse_from_str(&self.end, "%H:%M").map_err(|_| self.end.clone())?;
		Ok((start, end))
	}
}

/// Per-weekday opening windows. A missing day means closed.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct WeekHours {
	pub monday: Option<DayHours>,
	pub tuesday: Option<DayHours>,
	pub wednesday: Option<DayHours>,
	pub thursday: Option<DayHours>,
	pub friday: Option<DayHours>,
	pub saturday: Option<DayHours>,
	pub sunday: Option<DayHours>,
}

impl WeekHours {
	pub fn for_weekday(&self, weekday: Weekday) -> Option<&DayHours> {
		match weekday {
			Weekday::Mon => self.monday.as_ref(),
			Weekday::Tue => self.tuesday.as_ref(),
			Weekday::Wed => self.wednesday.as_ref(),
			Weekday::Thu => self.thursday.as_ref(),
			Weekday::Fri => self.friday.as_ref(),
			Weekday::Sat => self.saturday.as_ref(),
			Weekday::Sun => self.sunday.as_ref(),
		}
	}

	pub fn days(&self) -> [&Option<DayHours>; 7] {
		[
			&self.monday,
			&self.tuesday,
			&self.wednesday,
			&self.thursday,
			&self.friday,
			&self.saturday,
			&self.sunday,
		]
	}

	/// Parsed window for the weekday of `local`, or `None` when closed.
	pub fn window_on(&self, local: NaiveDateTime) -> Option<(NaiveTime, NaiveTime)> {
		self.for_weekday(local.weekday())
			.and_then(|hours| hours.parse().ok())
	}

	/// Whether `local` falls inside the day's open window.
	pub fn contains(&self, local: NaiveDateTime) -> bool {
		match self.window_on(local) {
			Some((start, end)) => local.time() >= start && local.time() < end,
			None => false,
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CapacityRules {
	pub max_jobs_per_day: u32,
	pub min_buffer_between_jobs_minutes: u32,
	pub max_after_hours_jobs_per_day: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TravelLimits {
	pub max_travel_time_minutes: u32,
	pub max_travel_distance_miles: f64,
}

/// Emergency price multipliers by time bucket, plus the weekend uplift added
/// on top of whichever bucket applies. Defaults match the documented rates.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct EmergencyMultipliers {
	pub work_min: f64,
	pub work_max: f64,
	pub evening_min: f64,
	pub evening_max: f64,
	pub night_min: f64,
	pub night_max: f64,
	pub early_6am: f64,
	pub early_630am: f64,
	pub weekend_uplift: f64,
}

impl Default for EmergencyMultipliers {
	fn default() -> Self {
		EmergencyMultipliers {
			work_min: 1.5,
			work_max: 2.0,
			evening_min: 1.5,
			evening_max: 2.5,
			night_min: 2.5,
			night_max: 3.0,
			early_6am: 1.5,
			early_630am: 1.25,
			weekend_uplift: 0.5,
		}
	}
}

/// One row of the profile's pricing table. The row with job type
/// `"diagnostic"` doubles as the fallback quote when classification
/// confidence is too low to pick a specific estimate.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct JobEstimate {
	pub job_type: String,
	pub estimated_hours: f64,
	pub cost_min: f64,
	pub cost_max: f64,
	/// Per-job override of the urgency multiplier range. When set, replaces
	/// both bucket bounds for emergency pricing of this job.
	#[serde(default)]
	pub urgency_multiplier: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum BookingType {
	Confirmed,
	Tentative,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EventLocation {
	pub address: String,
	pub lat: f64,
	pub lng: f64,
}

/// An existing appointment supplied by the caller's calendar service.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CalendarEvent {
	pub event_id: String,
	pub start: DateTime<Utc>,
	pub end: DateTime<Utc>,
	pub location: EventLocation,
	pub booking_type: BookingType,
	#[serde(default)]
	pub job_type: Option<String>,
}

/// Full per-tenant configuration, supplied on every request.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BusinessProfile {
	pub business_name: String,
	pub trade: Trade,
	pub address: AnchorAddress,
	pub service_radius_miles: f64,
	/// Offset of the business's wall clock from UTC, e.g. -420 for Pacific
	/// daylight time. Lets the engine derive local time without a tz lookup.
	pub utc_offset_minutes: i32,
	pub business_hours: WeekHours,
	pub phone_hours: WeekHours,
	pub capacity: CapacityRules,
	pub travel: TravelLimits,
	pub accept_emergencies: bool,
	#[serde(default)]
	pub out_of_office: bool,
	#[serde(default)]
	pub overtime_allowed: bool,
	#[serde(default)]
	pub accept_after_hours_emergency: bool,
	pub pricing: Vec<JobEstimate>,
	#[serde(default)]
	pub emergency_multipliers: EmergencyMultipliers,
	#[serde(default)]
	pub emergency_phone: Option<String>,
}

impl BusinessProfile {
	/// Business-local wall-clock time for a UTC instant.
	pub fn local_time(&self, utc: DateTime<Utc>) -> NaiveDateTime {
		(utc + Duration::minutes(self.utc_offset_minutes as i64)).naive_utc()
	}

	/// UTC instant for a business-local wall-clock time.
	pub fn utc_time(&self, local: NaiveDateTime) -> DateTime<Utc> {
		DateTime::from_naive_utc_and_offset(
			local - Duration::minutes(self.utc_offset_minutes as i64),
			Utc,
		)
	}

	/// Pricing row for a job type, case-insensitive.
	pub fn estimate_for(&self, job_type: &str) -> Option<&JobEstimate> {
		self.pricing
			.iter()
			.find(|e| e.job_type.eq_ignore_ascii_case(job_type))
	}

	/// The diagnostic-visit fallback row, when the table carries one.
	pub fn diagnostic_estimate(&self) -> Option<&JobEstimate> {
		self.estimate_for("diagnostic")
	}
}
