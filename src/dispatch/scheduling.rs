/*
 * src/dispatch/scheduling.rs
 *
 * Scheduling Engine
 *
 * Purpose:
 *   Same-day and next-day slot search against the supplied calendar under
 *   business-hours, capacity, travel, and buffer constraints
 */

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use tracing::debug;

use crate::dispatch::address::ResolvedAddress;
use crate::dispatch::mediator::BreakerRegistry;
use crate::dispatch::providers::{Coordinates, ProviderSet};
use crate::dispatch::travel::{self, TravelEstimate};
use crate::global::{LONG_JOB_HOURS, NEXT_DAY_LOOKAHEAD_DAYS, NEXT_DAY_WINDOW_HOURS, SLOT_ALIGN_MIN};
use crate::http_models::dispatch::{DispatchRequest, SlotKind, Urgency, ValidationError};
use crate::http_models::profile::{BookingType, BusinessProfile, CalendarEvent, JobEstimate};

/// A feasible placement before pricing is applied.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotPlan {
	pub start: DateTime<Utc>,
	pub end: DateTime<Utc>,
	pub booking_type: BookingType,
	pub slot_kind: SlotKind,
	pub travel_in: TravelEstimate,
	pub travel_out: Option<TravelEstimate>,
	/// Width of the arrival window quoted to the customer; zero for
	/// exact-time same-day offers
	pub arrival_window_hours: i64,
}

/// The funnel output: a slot, the rule violations met along the way, or
/// both (a same-day rejection can still yield a next-day offer).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScheduleResult {
	pub slot: Option<SlotPlan>,
	pub errors: Vec<ValidationError>,
}

impl ScheduleResult {
	fn reject(errors: Vec<ValidationError>) -> Self {
		ScheduleResult { slot: None, errors }
	}

	pub fn has(&self, error: ValidationError) -> bool {
		self.errors.contains(&error)
	}
}

fn push_unique(errors: &mut Vec<ValidationError>, error: ValidationError) {
	if !errors.contains(&error) {
		errors.push(error);
	}
}

fn duration_of(estimate: &JobEstimate) -> Duration {
	Duration::minutes((estimate.estimated_hours * 60.0).round() as i64)
}

/// Calendar events starting on a given business-local date, time-sorted.
/// Indices over a sorted Vec, never a linked structure.
fn events_on_day<'a>(
	calendar: &'a [CalendarEvent],
	profile: &BusinessProfile,
	date: NaiveDate,
) -> Vec<&'a CalendarEvent> {
	let mut events: Vec<&CalendarEvent> = calendar
		.iter()
		.filter(|e| profile.local_time(e.start).date() == date)
		.collect();
	events.sort_by_key(|e| e.start);
	events
}

/// The location the crew departs from at `at`: the latest event ending at or
/// before that instant, else the business anchor.
fn departure_point(
	calendar: &[CalendarEvent],
	profile: &BusinessProfile,
	at: DateTime<Utc>,
) -> Coordinates {
	calendar
		.iter()
		.filter(|e| e.end <= at)
		.max_by_key(|e| e.end)
		.map(|e| Coordinates::new(e.location.lat, e.location.lng))
		.unwrap_or_else(|| Coordinates::new(profile.address.lat, profile.address.lng))
}

/// Events starting today outside the business-hours window; compared to the
/// after-hours quota.
fn after_hours_count(calendar: &[CalendarEvent], profile: &BusinessProfile, date: NaiveDate) -> u32 {
	events_on_day(calendar, profile, date)
		.iter()
		.filter(|e| !profile.business_hours.contains(profile.local_time(e.start)))
		.count() as u32
}

fn align_up(at: DateTime<Utc>) -> DateTime<Utc> {
	let step = SLOT_ALIGN_MIN * 60;
	let secs = at.timestamp();
	let rem = secs.rem_euclid(step);
	if rem == 0 {
		at
	} else {
		DateTime::from_timestamp(secs + step - rem, 0).unwrap_or(at)
	}
}

fn within_travel_limits(profile: &BusinessProfile, leg: &TravelEstimate) -> bool {
	leg.minutes <= profile.travel.max_travel_time_minutes
		&& leg.miles <= profile.travel.max_travel_distance_miles
}

struct DayScan {
	slot: Option<SlotPlan>,
	travel_violated: bool,
}

/// First-fit scan of one day's gaps. Candidates are taken in start order,
/// which realizes the earliest-start tie-break; among same-start candidates
/// the one with less total travel would win, but a linear scan never
/// produces two.
#[allow(clippy::too_many_arguments)]
async fn scan_window(
	req: &DispatchRequest,
	customer: Coordinates,
	duration: Duration,
	window_start: DateTime<Utc>,
	window_end: DateTime<Utc>,
	slot_kind: SlotKind,
	booking_type: BookingType,
	arrival_window_hours: i64,
	use_live_traffic: bool,
	providers: &ProviderSet,
	breakers: &BreakerRegistry,
	diagnostics: &mut Vec<String>,
) -> DayScan {
	let profile = &req.business_profile;
	let buffer = Duration::minutes(profile.capacity.min_buffer_between_jobs_minutes as i64);
	let date = profile.local_time(window_start).date();
	let events = events_on_day(&req.calendar, profile, date);

	let mut cursor = window_start;
	let mut travel_violated = false;

	// Each upcoming event closes one gap; one final gap runs to the window
	// end. The "previous" location resets as the cursor passes each event.
	let mut gap_ends: Vec<(DateTime<Utc>, Option<&CalendarEvent>)> = events
		.iter()
		.filter(|e| e.end > cursor)
		.map(|e| (e.start, Some(*e)))
		.collect();
	gap_ends.push((window_end, None));

	for (gap_end, next_event) in gap_ends {
		if cursor >= window_end {
			break;
		}
		let gap_end = gap_end.min(window_end);
		if gap_end > cursor {
			let origin = departure_point(&req.calendar, profile, cursor);
			let depart_local = profile.local_time(cursor);
			let travel_in = travel::estimate(
				origin,
				customer,
				depart_local,
				providers,
				breakers,
				use_live_traffic,
				diagnostics,
			)
			.await;

			let start = align_up(cursor + Duration::minutes(travel_in.minutes as i64) + buffer);
			let end = start + duration;

			if end <= gap_end {
				let travel_out = match next_event {
					Some(event) => Some(
						travel::estimate(
							customer,
							Coordinates::new(event.location.lat, event.location.lng),
							profile.local_time(end),
							providers,
							breakers,
							use_live_traffic,
							diagnostics,
						)
						.await,
					),
					None => None,
				};

				let out_fits = match &travel_out {
					Some(leg) => end + Duration::minutes(leg.minutes as i64) <= gap_end,
					None => true,
				};
				let limits_ok = within_travel_limits(profile, &travel_in)
					&& travel_out
						.as_ref()
						.map_or(true, |leg| within_travel_limits(profile, leg));

				if out_fits && limits_ok {
					return DayScan {
						slot: Some(SlotPlan {
							start,
							end,
							booking_type,
							slot_kind,
							travel_in,
							travel_out,
							arrival_window_hours,
						}),
						travel_violated,
					};
				}
				if out_fits && !limits_ok {
					travel_violated = true;
				}
			}
		}

		if let Some(event) = next_event {
			cursor = cursor.max(event.end);
		}
	}

	DayScan {
		slot: None,
		travel_violated,
	}
}

fn day_window(
	profile: &BusinessProfile,
	date: NaiveDate,
	hours: &crate::http_models::profile::WeekHours,
) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
	let noon = date.and_time(NaiveTime::from_hms_opt(12, 0, 0).unwrap());
	let (open, close) = hours.window_on(noon)?;
	Some((
		profile.utc_time(date.and_time(open)),
		profile.utc_time(date.and_time(close)),
	))
}

/// Find a slot for the request, same-day funnel first where it applies,
/// next-day funnel otherwise. Rule violations accumulate in the result even
/// when a later funnel succeeds.
pub async fn find_slot(
	req: &DispatchRequest,
	resolved: &ResolvedAddress,
	urgency: Urgency,
	is_emergency: bool,
	estimate: &JobEstimate,
	providers: &ProviderSet,
	breakers: &BreakerRegistry,
	diagnostics: &mut Vec<String>,
) -> ScheduleResult {
	let profile = &req.business_profile;
	let local_now = req.local_now();
	let today = local_now.date();

	// Hard gates: nothing schedulable past any of these
	if profile.out_of_office {
		return ScheduleResult::reject(vec![ValidationError::OutOfOffice]);
	}
	if !resolved.in_service_area {
		return ScheduleResult::reject(vec![ValidationError::OutOfServiceArea]);
	}
	if !profile.phone_hours.contains(local_now) {
		return ScheduleResult::reject(vec![ValidationError::OutsidePhoneHours]);
	}
	if profile.pricing.is_empty() {
		return ScheduleResult::reject(vec![ValidationError::TradeUnsupported]);
	}

	let customer = resolved.coordinates();
	let duration = duration_of(estimate);
	let mut errors = Vec::new();

	// ---- Same-day funnel ----
	let today_window = day_window(profile, today, &profile.business_hours);
	let phone_window = day_window(profile, today, &profile.phone_hours);
	let in_business_hours = profile.business_hours.contains(local_now);

	// The bounded after-hours emergency path: quota must hold today. Also
	// consulted for an in-hours emergency whose job would run past close.
	let after_hours_eligible = profile.accept_after_hours_emergency
		&& after_hours_count(&req.calendar, profile, today)
			< profile.capacity.max_after_hours_jobs_per_day;

	let same_day_allowed = match today_window {
		Some((open, close)) => {
			if req.current_time < close && (in_business_hours || req.current_time < open) {
				true
			} else if is_emergency {
				// After close: only the bounded after-hours emergency path
				if !after_hours_eligible {
					push_unique(&mut errors, ValidationError::OutsideBusinessHours);
					if profile.accept_after_hours_emergency {
						push_unique(&mut errors, ValidationError::AfterHoursQuotaReached);
					}
				}
				after_hours_eligible
			} else {
				push_unique(&mut errors, ValidationError::OutsideBusinessHours);
				false
			}
		}
		None => {
			push_unique(&mut errors, ValidationError::OutsideBusinessHours);
			false
		}
	};

	if same_day_allowed {
		let jobs_today = events_on_day(&req.calendar, profile, today).len() as u32;
		if jobs_today >= profile.capacity.max_jobs_per_day {
			debug!("same-day funnel: capacity {jobs_today} reached");
			push_unique(&mut errors, ValidationError::CapacityExceeded);
		} else {
			let (business_open, business_close) = today_window.unwrap();
			let after_close = req.current_time >= business_close;

			// Emergencies may run past close into phone hours, but only on
			// the quota-bounded after-hours path; the slot still has to end
			// inside phone hours
			let window_end = if is_emergency && after_hours_eligible {
				phone_window.map(|(_, close)| close).unwrap_or(business_close)
			} else {
				business_close
			};
			// Emergencies dispatch immediately; regular work waits for open
			let window_start = if is_emergency {
				req.current_time
			} else {
				req.current_time.max(business_open)
			};
			let slot_kind = if after_close {
				SlotKind::AfterHoursEmergency
			} else if req.current_time < business_open {
				SlotKind::EarlyMorningPriority
			} else {
				SlotKind::Regular
			};

			let scan = scan_window(
				req,
				customer,
				duration,
				window_start,
				window_end,
				slot_kind,
				BookingType::Confirmed,
				0,
				true,
				providers,
				breakers,
				diagnostics,
			)
			.await;

			if scan.travel_violated {
				push_unique(&mut errors, ValidationError::TravelLimitsExceeded);
			}
			if let Some(mut slot) = scan.slot {
				// Any slot running past close is an after-hours emergency
				// slot, wherever the request arrived in the day
				if slot.end > business_close {
					slot.slot_kind = SlotKind::AfterHoursEmergency;
				}
				return ScheduleResult {
					slot: Some(slot),
					errors,
				};
			}
		}
	}

	// ---- Next-day funnel ----
	let long_job = estimate.estimated_hours >= LONG_JOB_HOURS;

	for offset in 1..=NEXT_DAY_LOOKAHEAD_DAYS {
		let date = today + Duration::days(offset);
		let Some((open, close)) = day_window(profile, date, &profile.business_hours) else {
			continue;
		};

		let day_events = events_on_day(&req.calendar, profile, date);
		if day_events.len() as u32 >= profile.capacity.max_jobs_per_day {
			push_unique(&mut errors, ValidationError::CapacityExceeded);
			continue;
		}
		// Job-mix: at most one long job per day
		if long_job
			&& day_events
				.iter()
				.any(|e| e.end - e.start >= Duration::minutes((LONG_JOB_HOURS * 60.0) as i64))
		{
			continue;
		}

		let slot_kind = if urgency >= Urgency::Urgent && offset == 1 {
			SlotKind::EarlyMorningPriority
		} else {
			SlotKind::Regular
		};

		let scan = scan_window(
			req,
			customer,
			duration,
			open,
			close,
			slot_kind,
			BookingType::Tentative,
			NEXT_DAY_WINDOW_HOURS,
			false,
			providers,
			breakers,
			diagnostics,
		)
		.await;

		if scan.travel_violated {
			push_unique(&mut errors, ValidationError::TravelLimitsExceeded);
		}
		if let Some(slot) = scan.slot {
			return ScheduleResult {
				slot: Some(slot),
				errors,
			};
		}
	}

	if errors.is_empty() {
		push_unique(&mut errors, ValidationError::CapacityExceeded);
	}
	ScheduleResult::reject(errors)
}

/// Morning/afternoon/evening label for the offer message.
pub fn day_part(local: NaiveDateTime) -> &'static str {
	let t = local.time();
	if t < NaiveTime::from_hms_opt(12, 0, 0).unwrap() {
		"morning"
	} else if t < NaiveTime::from_hms_opt(17, 0, 0).unwrap() {
		"afternoon"
	} else {
		"evening"
	}
}
