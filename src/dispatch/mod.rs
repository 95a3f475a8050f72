/*
 * src/dispatch/mod.rs
 *
 * The per-turn dispatch pipeline
 *
 * Purpose:
 *   Compose dedup -> NLU -> address -> urgency -> scheduling -> pricing ->
 *   orchestration under the request deadline
 */

pub mod address;
pub mod conversation;
pub mod dedup;
pub mod emergency;
pub mod keywords;
pub mod mediator;
pub mod nlu;
pub mod pricing;
pub mod providers;
pub mod scheduling;
pub mod travel;

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::NaiveTime;
use tracing::{info, warn};

use crate::global::RuntimeConfig;
use crate::http_models::dispatch::{Decision, DispatchRequest, Extraction, ProposedSlot, SlotKind, Urgency, ValidationError};
use address::{ResolvedAddress, Unresolved};
use dedup::DedupCache;
use mediator::BreakerRegistry;
use pricing::PriceRange;
use providers::ProviderSet;

/// Job classifications below this confidence are treated as unknown and get
/// a clarifying question instead of a guessed quote.
pub const MIN_JOB_CONFIDENCE: f64 = 0.3;

/// Shared process state: configuration, provider adapters, and the only two
/// pieces of mutable cross-request state (breakers, dedup cache).
#[derive(Clone)]
pub struct AppState {
	pub config: RuntimeConfig,
	pub providers: ProviderSet,
	pub breakers: Arc<BreakerRegistry>,
	pub dedup: DedupCache,
	pub started_at: Instant,
}

impl AppState {
	pub fn new(config: RuntimeConfig, providers: ProviderSet) -> Self {
		let breakers = Arc::new(BreakerRegistry::new(
			config.circuit_open_after,
			config.circuit_reset_ms,
		));
		let dedup = DedupCache::new(config.dedup_capacity, config.dedup_ttl_hours);
		AppState {
			config,
			providers,
			breakers,
			dedup,
			started_at: Instant::now(),
		}
	}
}

/// Process one turn. Always yields a Decision: when the request deadline
/// fires mid-flight, the turn re-runs on deterministic fallbacks only,
/// which involve no I/O and complete immediately.
pub async fn process(state: &AppState, req: &DispatchRequest) -> Decision {
	if let Some(prior) = state.dedup.lookup(req) {
		return (*prior).clone();
	}

	let deadline = Duration::from_millis(state.config.request_deadline_ms);
	let decision = match tokio::time::timeout(deadline, run_turn(state, req, true)).await {
		Ok(decision) => decision,
		Err(_) => {
			warn!(
				"DISPATCH ->> deadline of {}ms exceeded for conversation {}, replaying offline",
				state.config.request_deadline_ms, req.conversation_sid
			);
			run_turn(state, req, false).await
		}
	};

	state.dedup.record(req, &decision);
	decision
}

/// Backfill job, address, and urgency from earlier customer turns. The
/// service is stateless, so everything already said has to be re-read from
/// the history the caller supplies.
fn merge_from_history(extraction: &mut Extraction, req: &DispatchRequest) {
	use crate::http_models::dispatch::Sender;

	for turn in req.conversation_history.iter().rev() {
		if turn.sender != Sender::Customer {
			continue;
		}
		if extraction.job_type.is_some() && extraction.address_text.is_some() {
			break;
		}
		let prior = nlu::fallback_extract(&turn.text, req.business_profile.trade);
		if extraction.job_type.is_none() && prior.job_type.is_some() {
			extraction.job_type = prior.job_type;
			extraction.job_confidence = prior.job_confidence;
		}
		if extraction.address_text.is_none() && prior.address_text.is_some() {
			extraction.address_text = prior.address_text;
		}
		if prior.urgency_hint > extraction.urgency_hint {
			extraction.urgency_hint = prior.urgency_hint;
			extraction.urgency_confidence = prior.urgency_confidence;
		}
	}
}

fn all_customer_text(req: &DispatchRequest) -> String {
	use crate::http_models::dispatch::Sender;

	let mut text: Vec<&str> = req
		.conversation_history
		.iter()
		.filter(|t| t.sender == Sender::Customer)
		.map(|t| t.text.as_str())
		.collect();
	text.push(req.current_message.as_str());
	text.join("\n")
}

async fn run_turn(state: &AppState, req: &DispatchRequest, online: bool) -> Decision {
	let profile = &req.business_profile;
	let trade = profile.trade;
	let mut diagnostics = Vec::new();
	let providers = if online {
		state.providers.clone()
	} else {
		diagnostics.push(String::from("deadline exceeded, deterministic fallbacks only"));
		ProviderSet::default()
	};

	// The regex pass is free; when it already sees an address we can start
	// geocoding while the model call is still in flight
	let preview = nlu::fallback_extract(&req.current_message, trade);
	let mut geocode_diag = Vec::new();
	let (mut extraction, preview_resolution) = tokio::join!(
		nlu::extract(
			&req.current_message,
			&req.conversation_history,
			trade,
			&providers,
			&state.breakers,
			&mut diagnostics,
		),
		async {
			match &preview.address_text {
				Some(text) => Some((
					text.clone(),
					address::resolve(
						text,
						&profile.address,
						profile.service_radius_miles,
						&providers,
						&state.breakers,
						&mut geocode_diag,
					)
					.await,
				)),
				None => None,
			}
		}
	);
	diagnostics.append(&mut geocode_diag);

	if extraction.job_confidence < MIN_JOB_CONFIDENCE {
		extraction.job_type = None;
	}
	merge_from_history(&mut extraction, req);

	// Reuse the raced geocode when the final extraction agrees on the text
	let resolution: Option<Result<ResolvedAddress, Unresolved>> = match &extraction.address_text {
		Some(text) => match preview_resolution {
			Some((preview_text, outcome)) if preview_text == *text => Some(outcome),
			_ => Some(
				address::resolve(
					text,
					&profile.address,
					profile.service_radius_miles,
					&providers,
					&state.breakers,
					&mut diagnostics,
				)
				.await,
			),
		},
		None => None,
	};

	let assessment = emergency::classify(
		&extraction,
		&all_customer_text(req),
		req.local_now(),
		profile,
	);

	// Scheduling needs a geocoded address and a priceable job
	let mut errors: Vec<ValidationError> = Vec::new();
	if let Some(Err(Unresolved::GeocodeFailed)) = &resolution {
		// Recorded for the caller; the conversation itself just asks for
		// the address again
		errors.push(ValidationError::GeocodeFailed);
	}
	let estimate = match &extraction.job_type {
		Some(job) => {
			let found = pricing::estimate_or_diagnostic(profile, Some(job));
			if found.is_none() {
				errors.push(ValidationError::JobUnsupported);
			}
			found
		}
		None => None,
	};

	let mut proposed: Option<ProposedSlot> = None;
	let mut morning_price: Option<PriceRange> = None;

	if let (Some(Ok(resolved)), Some(estimate)) = (&resolution, estimate) {
		let schedule = scheduling::find_slot(
			req,
			resolved,
			assessment.urgency,
			assessment.is_emergency,
			estimate,
			&providers,
			&state.breakers,
			&mut diagnostics,
		)
		.await;

		for error in &schedule.errors {
			if !errors.contains(error) {
				errors.push(*error);
			}
		}

		// Emergency multipliers only apply when the business actually runs
		// the job as an emergency
		let pricing_urgency = if assessment.is_emergency {
			Urgency::Emergency
		} else if assessment.urgency == Urgency::Emergency {
			Urgency::Urgent
		} else {
			assessment.urgency
		};

		proposed = schedule.slot.map(|plan| {
			let start_local = profile.local_time(plan.start);
			let price = pricing::price(estimate, start_local, pricing_urgency, profile);
			ProposedSlot {
				start: plan.start,
				end: plan.end,
				resource_id: String::from("crew-1"),
				booking_type: plan.booking_type,
				travel_from_prev_minutes: plan.travel_in.minutes,
				travel_to_next_minutes: plan.travel_out.map(|leg| leg.minutes).unwrap_or(0),
				price_min: price.min,
				price_max: price.max,
				slot_kind: plan.slot_kind,
			}
		});

		// The tonight-vs-tomorrow choice quotes both rates
		if let Some(slot) = &proposed {
			if slot.slot_kind == SlotKind::AfterHoursEmergency {
				let tomorrow_morning = (req.local_now().date() + chrono::Duration::days(1))
					.and_time(NaiveTime::from_hms_opt(8, 0, 0).unwrap());
				morning_price = Some(pricing::price(
					estimate,
					tomorrow_morning,
					Urgency::Normal,
					profile,
				));
			}
		}
	} else if let Some(Ok(resolved)) = &resolution {
		// Address checked even before the job is known: an out-of-area
		// caller should hear that now, not after another question
		if !resolved.in_service_area {
			errors.push(ValidationError::OutOfServiceArea);
		}
	}

	let decision = conversation::decide(
		req,
		extraction,
		resolution.as_ref(),
		assessment,
		errors,
		proposed,
		morning_price,
		diagnostics,
	);

	info!(
		"DISPATCH ->> conversation {} stage {:?} action {:?}",
		req.conversation_sid, decision.conversation_stage, decision.next_action
	);
	decision
}
