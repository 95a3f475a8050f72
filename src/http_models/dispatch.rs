/*
 * src/http_models/dispatch.rs
 *
 * Wire types for POST /dispatch/process
 *
 * Purpose:
 *   Request and Decision payloads plus the extraction/validation records
 *   embedded in them
 */

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::AppError;
use crate::http_models::profile::{BookingType, BusinessProfile, CalendarEvent};

static E164: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\+\d{10,15}$").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
	Bot,
	Customer,
}

/// One prior SMS in the conversation, oldest first.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ConversationTurn {
	pub sender: Sender,
	pub text: String,
	pub timestamp: DateTime<Utc>,
}

/// Everything needed to process one turn. The dispatcher holds no state
/// between requests; the caller supplies the world.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DispatchRequest {
	/// Customer phone, E.164
	pub caller_phone: String,
	/// The business number that was called, E.164; routes to a trade profile
	pub called_number: String,
	/// Idempotency key for this conversation
	pub conversation_sid: String,
	pub current_message: String,
	#[serde(default)]
	pub conversation_history: Vec<ConversationTurn>,
	pub business_profile: BusinessProfile,
	#[serde(default)]
	pub calendar: Vec<CalendarEvent>,
	pub current_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
	Normal,
	Urgent,
	Emergency,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Confirmation {
	Yes,
	No,
	Unknown,
}

/// What the NLU layer understood from the latest customer message. Both the
/// LLM path and the deterministic fallback emit exactly this shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Extraction {
	#[serde(default)]
	pub job_type: Option<String>,
	pub job_confidence: f64,
	pub urgency_hint: Urgency,
	pub urgency_confidence: f64,
	#[serde(default)]
	pub address_text: Option<String>,
	pub confirmation: Confirmation,
}

impl Default for Extraction {
	fn default() -> Self {
		Extraction {
			job_type: None,
			job_confidence: 0.0,
			urgency_hint: Urgency::Normal,
			urgency_confidence: 0.0,
			address_text: None,
			confirmation: Confirmation::Unknown,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SlotKind {
	Regular,
	AfterHoursEmergency,
	EarlyMorningPriority,
}

/// The concrete offer made to the customer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ProposedSlot {
	pub start: DateTime<Utc>,
	pub end: DateTime<Utc>,
	/// Single crew for now, so always `"crew-1"`
	pub resource_id: String,
	pub booking_type: BookingType,
	pub travel_from_prev_minutes: u32,
	pub travel_to_next_minutes: u32,
	pub price_min: u32,
	pub price_max: u32,
	pub slot_kind: SlotKind,
}

/// Enumerated reasons a turn could not produce a bookable slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ValidationError {
	OutOfServiceArea,
	OutsidePhoneHours,
	OutsideBusinessHours,
	CapacityExceeded,
	AfterHoursQuotaReached,
	TravelLimitsExceeded,
	TradeUnsupported,
	JobUnsupported,
	OutOfOffice,
	GeocodeFailed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ValidationOutcome {
	pub address_validated: bool,
	pub service_area_valid: bool,
	pub within_business_hours: bool,
	pub capacity_available: bool,
	#[serde(default)]
	pub validation_errors: Vec<ValidationError>,
}

impl Default for ValidationOutcome {
	fn default() -> Self {
		ValidationOutcome {
			address_validated: false,
			service_area_valid: false,
			within_business_hours: false,
			capacity_available: false,
			validation_errors: Vec::new(),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum NextAction {
	ContinueConversation,
	RequestConfirmation,
	BookAppointment,
	EscalateToOwner,
	EndConversation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStage {
	Initial,
	CollectingInfo,
	Confirming,
	Confirmed,
	Rejected,
	Escalated,
	Complete,
	Timeout,
}

/// The machine-readable outcome of one turn. Always produced: business-rule
/// rejections and provider faults surface here, never as HTTP errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Decision {
	pub extracted_info: Extraction,
	pub validation: ValidationOutcome,
	#[serde(default)]
	pub proposed_slot: Option<ProposedSlot>,
	pub next_action: NextAction,
	pub message_to_customer: String,
	pub conversation_stage: ConversationStage,
	pub follow_up_needed: bool,
	#[serde(default)]
	pub follow_up_delay_minutes: Option<u32>,
	/// Provider-fault notes for the operator log; never shown to customers
	#[serde(default)]
	pub diagnostics: Vec<String>,
}

impl DispatchRequest {
	/// Field validation per the API contract. First failure wins; the caller
	/// maps it to a 422.
	pub fn validate(&self) -> Result<(), AppError> {
		if !E164.is_match(&self.caller_phone) {
			return Err(AppError::validation_field(
				"invalid_phone",
				"caller_phone must be E.164 (+ followed by 10-15 digits)",
				"caller_phone",
			));
		}
		if !E164.is_match(&self.called_number) {
			return Err(AppError::validation_field(
				"invalid_phone",
				"called_number must be E.164 (+ followed by 10-15 digits)",
				"called_number",
			));
		}
		if self.conversation_sid.trim().is_empty() {
			return Err(AppError::validation_field(
				"missing_sid",
				"conversation_sid must not be empty",
				"conversation_sid",
			));
		}
		let message_len = self.current_message.chars().count();
		if message_len < 1 || message_len > 1000 {
			return Err(AppError::validation_field(
				"invalid_message",
				"current_message must be 1-1000 characters",
				"current_message",
			));
		}

		let profile = &self.business_profile;
		if !(1.0..=100.0).contains(&profile.service_radius_miles) {
			return Err(AppError::validation_field(
				"invalid_radius",
				"service_radius_miles must be between 1 and 100",
				"business_profile.service_radius_miles",
			));
		}
		if !(-14 * 60..=14 * 60).contains(&profile.utc_offset_minutes) {
			return Err(AppError::validation_field(
				"invalid_offset",
				"utc_offset_minutes must be a real UTC offset",
				"business_profile.utc_offset_minutes",
			));
		}
		for day in profile.business_hours.days() {
			if let Some(hours) = day {
				if let Err(bad) = hours.parse() {
					return Err(AppError::validation_field(
						"invalid_hours",
						format!("business_hours contains a non-HH:MM value: {bad:?}"),
						"business_profile.business_hours",
					));
				}
			}
		}
		for day in profile.phone_hours.days() {
			if let Some(hours) = day {
				if let Err(bad) = hours.parse() {
					return Err(AppError::validation_field(
						"invalid_hours",
						format!("phone_hours contains a non-HH:MM value: {bad:?}"),
						"business_profile.phone_hours",
					));
				}
			}
		}
		for event in &self.calendar {
			if event.end <= event.start {
				return Err(AppError::validation_field(
					"invalid_calendar",
					format!("calendar event {} ends before it starts", event.event_id),
					"calendar",
				));
			}
		}

		Ok(())
	}

	/// Business-local time of this turn.
	pub fn local_now(&self) -> chrono::NaiveDateTime {
		self.business_profile.local_time(self.current_time)
	}
}
