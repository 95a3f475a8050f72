/*
 * src/dispatch/emergency.rs
 *
 * Emergency Classifier
 *
 * Purpose:
 *   Final urgency level from the NLU hint plus trade keyword re-check and
 *   the profile's emergency toggles
 */

use chrono::NaiveDateTime;

use crate::dispatch::keywords;
use crate::http_models::dispatch::{Extraction, Urgency};
use crate::http_models::profile::BusinessProfile;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UrgencyAssessment {
	pub urgency: Urgency,
	pub confidence: f64,
	/// Emergency AND the business takes emergencies at all
	pub is_emergency: bool,
}

/// Simple containment re-check of the trade's emergency vocabulary. The
/// LLM path can miss a scream the keyword table catches, and vice versa.
fn keyword_emergency(message: &str, profile: &BusinessProfile) -> bool {
	let lowered = message.to_lowercase();
	keywords::lexicon(profile.trade)
		.emergency
		.iter()
		.any(|kw| lowered.contains(kw))
}

/// Combine the NLU hint with the keyword dictionaries and the profile
/// toggles into the final urgency.
pub fn classify(
	extraction: &Extraction,
	message: &str,
	local_now: NaiveDateTime,
	profile: &BusinessProfile,
) -> UrgencyAssessment {
	let mut urgency = extraction.urgency_hint;
	let mut confidence = extraction.urgency_confidence;

	if urgency < Urgency::Emergency && keyword_emergency(message, profile) {
		urgency = Urgency::Emergency;
		confidence = confidence.max(0.7);
	}

	// A plain after-hours request is at least urgent to the caller; the
	// scheduler decides whether anything can actually happen tonight
	if urgency == Urgency::Normal && !profile.business_hours.contains(local_now) {
		if profile.phone_hours.contains(local_now) {
			urgency = Urgency::Urgent;
			confidence = confidence.max(0.5);
		}
	}

	UrgencyAssessment {
		urgency,
		confidence,
		is_emergency: urgency == Urgency::Emergency && profile.accept_emergencies,
	}
}
