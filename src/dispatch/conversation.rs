/*
 * src/dispatch/conversation.rs
 *
 * Conversation Orchestrator
 *
 * Purpose:
 *   Per-turn state machine, reply composition, and the two-question policy
 */

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};

use crate::dispatch::address::{ResolvedAddress, Unresolved};
use crate::dispatch::emergency::UrgencyAssessment;
use crate::dispatch::pricing::PriceRange;
use crate::global::{
	FOLLOW_UP_DELAY_COLLECTING_MIN, FOLLOW_UP_DELAY_CONFIRMING_MIN,
	MAX_QUESTIONS_PER_CONVERSATION,
};
use crate::http_models::dispatch::{
	Confirmation, ConversationStage, ConversationTurn, Decision, DispatchRequest, Extraction,
	NextAction, ProposedSlot, Sender, SlotKind, ValidationError, ValidationOutcome,
};
use crate::http_models::profile::BookingType;

/// Every offer ends with this literal prompt; it doubles as the marker the
/// stage derivation looks for on the next turn.
pub const OFFER_PROMPT: &str = "Reply YES to confirm or NO for other options.";

fn is_offer(text: &str) -> bool {
	text.to_lowercase().contains("reply yes")
}

/// Where the conversation stood before this turn, recomputed from history
/// alone: the service holds nothing between requests.
pub fn prior_stage(history: &[ConversationTurn]) -> ConversationStage {
	match history.iter().rev().find(|t| t.sender == Sender::Bot) {
		None => ConversationStage::Initial,
		Some(turn) if is_offer(&turn.text) => ConversationStage::Confirming,
		Some(_) => ConversationStage::CollectingInfo,
	}
}

/// Distinct questions already asked: bot turns that ask something and are
/// not offers. A re-sent question counts once.
pub fn questions_asked(history: &[ConversationTurn]) -> usize {
	let mut seen: Vec<String> = Vec::new();
	for turn in history {
		if turn.sender != Sender::Bot || !turn.text.contains('?') || is_offer(&turn.text) {
			continue;
		}
		let normalized = turn.text.trim().to_lowercase();
		if !seen.contains(&normalized) {
			seen.push(normalized);
		}
	}
	seen.len()
}

fn clock(t: NaiveTime) -> String {
	let hour12 = ((t.hour() + 11) % 12) + 1;
	format!("{}:{:02}", hour12, t.minute())
}

fn meridiem(t: NaiveTime) -> &'static str {
	if t < NaiveTime::from_hms_opt(12, 0, 0).unwrap() {
		"AM"
	} else {
		"PM"
	}
}

/// `5:30-8:00 PM`, or `11:30 AM-1:00 PM` across noon.
pub fn format_window(start: NaiveTime, end: NaiveTime) -> String {
	if meridiem(start) == meridiem(end) {
		format!("{}-{} {}", clock(start), clock(end), meridiem(end))
	} else {
		format!(
			"{} {}-{} {}",
			clock(start),
			meridiem(start),
			clock(end),
			meridiem(end)
		)
	}
}

fn format_time(t: NaiveTime) -> String {
	format!("{} {}", clock(t), meridiem(t))
}

/// `today`, `tomorrow`, or the weekday name inside the 7-day offer horizon.
pub fn format_day(date: NaiveDate, today: NaiveDate) -> String {
	match (date - today).num_days() {
		0 => String::from("today"),
		1 => String::from("tomorrow"),
		_ => format!("{}", date.format("%A")),
	}
}

fn format_price(price_min: u32, price_max: u32) -> String {
	format!("${price_min}-${price_max}")
}

struct Reply {
	stage: ConversationStage,
	action: NextAction,
	message: String,
	keep_slot: bool,
	follow_up_delay: Option<u32>,
}

fn phone_hours_line(req: &DispatchRequest, local_now: NaiveDateTime) -> String {
	match req.business_profile.phone_hours.window_on(local_now) {
		Some((start, end)) => format!(
			"We answer {} to {}",
			format_time(start),
			format_time(end)
		),
		None => String::from("We are closed today"),
	}
}

fn offer_message(
	req: &DispatchRequest,
	slot: &ProposedSlot,
	morning_price: Option<PriceRange>,
	today: NaiveDate,
) -> String {
	let profile = &req.business_profile;
	let start_local = profile.local_time(slot.start);
	let end_local = profile.local_time(slot.end);
	let day = format_day(start_local.date(), today);
	let price = format_price(slot.price_min, slot.price_max);

	match slot.slot_kind {
		SlotKind::AfterHoursEmergency => {
			let tonight = format!(
				"We can send a {} technician out tonight, {}, for an after-hours rate of {}",
				profile.trade,
				format_window(start_local.time(), end_local.time()),
				price
			);
			let alternative = match morning_price {
				Some(morning) => format!(
					" First thing tomorrow morning would run {} instead.",
					format_price(morning.min, morning.max)
				),
				None => String::new(),
			};
			format!("{tonight}.{alternative} {OFFER_PROMPT}")
		}
		_ if slot.booking_type == BookingType::Tentative => {
			format!(
				"We can have a {} technician out {} {} with an arrival window starting around {}. Estimated cost {}. {}",
				profile.trade,
				day,
				crate::dispatch::scheduling::day_part(start_local),
				format_time(start_local.time()),
				price,
				OFFER_PROMPT
			)
		}
		_ => {
			format!(
				"We can have a {} technician out {} between {}. Estimated cost {}. {}",
				profile.trade,
				day,
				format_window(start_local.time(), end_local.time()),
				price,
				OFFER_PROMPT
			)
		}
	}
}

fn rejection_message(req: &DispatchRequest, errors: &[ValidationError]) -> String {
	let name = &req.business_profile.business_name;
	if errors.contains(&ValidationError::TravelLimitsExceeded) {
		return format!(
			"Unfortunately that address is beyond the area {name} can reach. A provider closer to you will be able to help faster."
		);
	}
	if errors.contains(&ValidationError::JobUnsupported) {
		return format!(
			"That isn't a job {name} handles, sorry. A specialist in that kind of work would be the right call."
		);
	}
	format!(
		"We're sorry, {name} is fully booked for the coming week and can't take this job on. Thank you for thinking of us."
	)
}

/// Build the Decision for this turn. Pure: every input was computed by the
/// pipeline, so the same request always yields the same decision.
#[allow(clippy::too_many_arguments)]
pub fn decide(
	req: &DispatchRequest,
	extraction: Extraction,
	resolution: Option<&Result<ResolvedAddress, Unresolved>>,
	assessment: UrgencyAssessment,
	errors: Vec<ValidationError>,
	proposed: Option<ProposedSlot>,
	morning_price: Option<PriceRange>,
	diagnostics: Vec<String>,
) -> Decision {
	let profile = &req.business_profile;
	let local_now = req.local_now();
	let today = local_now.date();
	let stage_before = prior_stage(&req.conversation_history);
	let questions = questions_asked(&req.conversation_history);

	let resolved = resolution.and_then(|r| r.as_ref().ok());
	let validation = ValidationOutcome {
		address_validated: resolved.is_some(),
		service_area_valid: resolved.map(|r| r.in_service_area).unwrap_or(false),
		within_business_hours: profile.business_hours.contains(local_now),
		capacity_available: !errors.contains(&ValidationError::CapacityExceeded),
		validation_errors: errors.clone(),
	};

	let reply = compose(
		req,
		&extraction,
		resolution,
		&assessment,
		&errors,
		proposed.as_ref(),
		morning_price,
		stage_before,
		questions,
		local_now,
		today,
	);

	Decision {
		extracted_info: extraction,
		validation,
		proposed_slot: if reply.keep_slot { proposed } else { None },
		next_action: reply.action,
		message_to_customer: reply.message,
		conversation_stage: reply.stage,
		follow_up_needed: reply.follow_up_delay.is_some(),
		follow_up_delay_minutes: reply.follow_up_delay,
		diagnostics,
	}
}

#[allow(clippy::too_many_arguments)]
fn compose(
	req: &DispatchRequest,
	extraction: &Extraction,
	resolution: Option<&Result<ResolvedAddress, Unresolved>>,
	assessment: &UrgencyAssessment,
	errors: &[ValidationError],
	proposed: Option<&ProposedSlot>,
	morning_price: Option<PriceRange>,
	stage_before: ConversationStage,
	questions: usize,
	local_now: NaiveDateTime,
	today: NaiveDate,
) -> Reply {
	let profile = &req.business_profile;
	let name = &profile.business_name;

	// Outside phone hours nothing proceeds, confirmations included
	if !profile.phone_hours.contains(local_now) {
		let emergency_line = match &profile.emergency_phone {
			Some(number) => format!(" If this can't wait, call our emergency line at {number}."),
			None => String::new(),
		};
		return Reply {
			stage: ConversationStage::Complete,
			action: NextAction::EndConversation,
			message: format!(
				"You've reached {name} outside our phone hours. {}; please text again then and we'll get you scheduled.{emergency_line}",
				phone_hours_line(req, local_now)
			),
			keep_slot: false,
			follow_up_delay: None,
		};
	}

	// A standing offer being answered
	if stage_before == ConversationStage::Confirming {
		match extraction.confirmation {
			Confirmation::Yes => {
				return match proposed {
					Some(slot) => {
						let start_local = profile.local_time(slot.start);
						let end_local = profile.local_time(slot.end);
						Reply {
							stage: ConversationStage::Complete,
							action: NextAction::BookAppointment,
							message: format!(
								"You're all set! A {} technician is booked {}, {}. We'll text when they're on the way.",
								profile.trade,
								format_day(start_local.date(), today),
								format_window(start_local.time(), end_local.time())
							),
							keep_slot: true,
							follow_up_delay: None,
						}
					}
					None => Reply {
						stage: ConversationStage::Escalated,
						action: NextAction::EscalateToOwner,
						message: format!(
							"That time was just taken on our end; the owner of {name} will call you shortly to lock in a new one."
						),
						keep_slot: false,
						follow_up_delay: None,
					},
				};
			}
			Confirmation::No => {
				return if questions < MAX_QUESTIONS_PER_CONVERSATION {
					Reply {
						stage: ConversationStage::CollectingInfo,
						action: NextAction::ContinueConversation,
						message: String::from(
							"No problem. What day or time would work better for you?",
						),
						keep_slot: false,
						follow_up_delay: Some(FOLLOW_UP_DELAY_COLLECTING_MIN),
					}
				} else {
					Reply {
						stage: ConversationStage::Complete,
						action: NextAction::EndConversation,
						message: format!(
							"Understood, we'll leave it there for now. Text {name} any time and we'll get you scheduled."
						),
						keep_slot: false,
						follow_up_delay: None,
					}
				};
			}
			Confirmation::Unknown => {}
		}
	}

	// Closed for vacation or similar
	if profile.out_of_office {
		return if assessment.is_emergency {
			Reply {
				stage: ConversationStage::Escalated,
				action: NextAction::EscalateToOwner,
				message: format!(
					"{name} is currently away, but this sounds serious, so the owner has been notified and will call you back as soon as possible."
				),
				keep_slot: false,
				follow_up_delay: None,
			}
		} else {
			Reply {
				stage: ConversationStage::Rejected,
				action: NextAction::EndConversation,
				message: format!(
					"{name} is currently closed and not taking new appointments. Please reach out again soon!"
				),
				keep_slot: false,
				follow_up_delay: None,
			}
		};
	}

	// A geocoded address outside the radius is a hard stop
	if errors.contains(&ValidationError::OutOfServiceArea) {
		let detail = resolution
			.and_then(|r| r.as_ref().ok())
			.map(|r| {
				let radius = profile.service_radius_miles;
				let beyond = (r.distance_miles - radius).max(0.0).ceil();
				format!(
					"that's about {:.0} miles from us, {beyond} miles beyond our {radius:.0}-mile service area",
					r.distance_miles.ceil()
				)
			})
			.unwrap_or_else(|| String::from("that's outside our service area"));
		return Reply {
			stage: ConversationStage::Rejected,
			action: NextAction::EndConversation,
			message: format!(
				"We'd love to help, but {detail}. Searching for a provider local to you will get someone out faster."
			),
			keep_slot: false,
			follow_up_delay: None,
		};
	}

	// Still missing the job or a usable address: ask, within the question cap
	let need_job = extraction.job_type.is_none();
	let need_address = match resolution {
		None => true,
		Some(Err(_)) => true,
		Some(Ok(_)) => false,
	};
	if need_job || need_address {
		if questions >= MAX_QUESTIONS_PER_CONVERSATION {
			return Reply {
				stage: ConversationStage::Escalated,
				action: NextAction::EscalateToOwner,
				message: format!(
					"Let me hand this to a person; the owner of {name} will call you shortly to sort out the details."
				),
				keep_slot: false,
				follow_up_delay: None,
			};
		}
		let question = if need_job && need_address {
			String::from(
				"Sorry to hear that! What's going on, and what's the service address (street and ZIP)?",
			)
		} else if need_job {
			String::from("Got it. Can you tell me a bit more about what needs fixing?")
		} else {
			match resolution {
				Some(Err(Unresolved::GeocodeFailed)) => String::from(
					"I couldn't place that address. Could you send it again with the street number and ZIP code?",
				),
				_ => String::from(
					"What's the full service address, including street number and ZIP code?",
				),
			}
		};
		return Reply {
			stage: ConversationStage::CollectingInfo,
			action: NextAction::ContinueConversation,
			message: question,
			keep_slot: false,
			follow_up_delay: Some(FOLLOW_UP_DELAY_COLLECTING_MIN),
		};
	}

	// Feasible slot: make the offer
	if let Some(slot) = proposed {
		return Reply {
			stage: ConversationStage::Confirming,
			action: NextAction::RequestConfirmation,
			message: offer_message(req, slot, morning_price, today),
			keep_slot: true,
			follow_up_delay: Some(FOLLOW_UP_DELAY_CONFIRMING_MIN),
		};
	}

	// Nothing feasible anywhere in the horizon
	Reply {
		stage: ConversationStage::Rejected,
		action: NextAction::EndConversation,
		message: rejection_message(req, errors),
		keep_slot: false,
		follow_up_delay: None,
	}
}
