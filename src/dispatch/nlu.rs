/*
 * src/dispatch/nlu.rs
 *
 * NLU Extractor
 *
 * Purpose:
 *   Turn the latest customer message plus history into a typed Extraction;
 *   LLM primary path with a deterministic keyword/regex fallback
 */

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use crate::dispatch::keywords::{self, CONFIRM_NO, CONFIRM_YES, INTENSIFIERS, NEGATIONS};
use crate::dispatch::mediator::{self, BreakerRegistry};
use crate::dispatch::providers::{LlmProvider, ProviderSet};
use crate::global::LLM_DEADLINE_MS;
use crate::http_models::dispatch::{Confirmation, ConversationTurn, Extraction, Sender, Urgency};
use crate::http_models::profile::Trade;

// Street-address shape: number, street name, suffix, optional city and
// ZIP tail
static ADDRESS: Lazy<Regex> = Lazy::new(|| {
	Regex::new(
		r"(?i)\d+\s+[A-Za-z0-9'.\- ]+(st|street|ave|avenue|rd|road|blvd|dr|drive|way|ln|lane)\b[^,]*,?\s*[A-Za-z .]*,?\s*\d{5}?",
	)
	.unwrap()
});

/// Cap on fallback job confidence; the keyword tables are coarse.
const FALLBACK_JOB_CONFIDENCE: f64 = 0.6;

/// Loose mirror of the JSON the model is asked for. Anything missing or
/// mistyped falls back to defaults rather than failing the turn.
#[derive(Debug, Deserialize)]
struct LlmExtraction {
	#[serde(default)]
	job_type: Option<String>,
	#[serde(default)]
	job_confidence: Option<f64>,
	#[serde(default)]
	urgency: Option<String>,
	#[serde(default)]
	urgency_confidence: Option<f64>,
	#[serde(default)]
	address: Option<String>,
	#[serde(default)]
	confirmation: Option<String>,
}

fn render_history(history: &[ConversationTurn]) -> String {
	if history.is_empty() {
		return String::from("(no prior messages)");
	}
	history
		.iter()
		.map(|turn| {
			let who = match turn.sender {
				Sender::Bot => "dispatcher",
				Sender::Customer => "customer",
			};
			format!("{who}: {}", turn.text)
		})
		.collect::<Vec<_>>()
		.join("\n")
}

/// The first balanced `{...}` region of `text`, respecting string literals.
/// Models wrap their JSON in prose and code fences; this cuts through both.
pub fn first_json_object(text: &str) -> Option<&str> {
	let bytes = text.as_bytes();
	let start = text.find('{')?;
	let mut depth = 0usize;
	let mut in_string = false;
	let mut escaped = false;

	for (offset, &byte) in bytes[start..].iter().enumerate() {
		if in_string {
			if escaped {
				escaped = false;
			} else if byte == b'\\' {
				escaped = true;
			} else if byte == b'"' {
				in_string = false;
			}
			continue;
		}
		match byte {
			b'"' => in_string = true,
			b'{' => depth += 1,
			b'}' => {
				depth -= 1;
				if depth == 0 {
					return Some(&text[start..=start + offset]);
				}
			}
			_ => {}
		}
	}
	None
}

fn clamp(value: f64) -> f64 {
	value.clamp(0.0, 1.0)
}

fn parse_llm_response(text: &str) -> Option<Extraction> {
	let region = first_json_object(text)?;
	// json5 tolerates the trailing commas and unquoted keys models produce
	let raw: LlmExtraction = json5::from_str(region).ok()?;

	let urgency = match raw.urgency.as_deref().map(str::trim) {
		Some("emergency") => Urgency::Emergency,
		Some("urgent") => Urgency::Urgent,
		Some("normal") | None => Urgency::Normal,
		Some(_) => return None,
	};
	let confirmation = match raw.confirmation.as_deref().map(str::trim) {
		Some("yes") => Confirmation::Yes,
		Some("no") => Confirmation::No,
		_ => Confirmation::Unknown,
	};

	Some(Extraction {
		job_type: raw.job_type.filter(|j| !j.trim().is_empty()),
		job_confidence: clamp(raw.job_confidence.unwrap_or(0.0)),
		urgency_hint: urgency,
		urgency_confidence: clamp(raw.urgency_confidence.unwrap_or(0.0)),
		address_text: raw.address.filter(|a| !a.trim().is_empty()),
		confirmation,
	})
}

fn tokens(message: &str) -> Vec<String> {
	message
		.split_whitespace()
		.map(|t| {
			t.trim_matches(|c: char| c.is_ascii_punctuation())
				.to_lowercase()
		})
		.filter(|t| !t.is_empty())
		.collect()
}

/// Index of the token where `phrase` begins, if the phrase occurs as a
/// token run.
fn phrase_position(toks: &[String], phrase: &str) -> Option<usize> {
	let parts: Vec<&str> = phrase.split_whitespace().collect();
	if parts.is_empty() || parts.len() > toks.len() {
		return None;
	}
	(0..=toks.len() - parts.len())
		.find(|&i| parts.iter().enumerate().all(|(j, p)| toks[i + j] == *p))
}

fn negated_within(toks: &[String], position: usize, window: usize) -> bool {
	let from = position.saturating_sub(window);
	toks[from..position]
		.iter()
		.any(|t| NEGATIONS.contains(&t.as_str()))
}

/// The deterministic path. Keyword tables, the address regex, and literal
/// confirmation sets; always succeeds.
pub fn fallback_extract(message: &str, trade: Trade) -> Extraction {
	let lexicon = keywords::lexicon(trade);
	let toks = tokens(message);
	let trimmed = message.trim().to_lowercase();

	let confirmation = if CONFIRM_YES.contains(&trimmed.as_str()) {
		Confirmation::Yes
	} else if CONFIRM_NO.contains(&trimmed.as_str()) {
		Confirmation::No
	} else {
		Confirmation::Unknown
	};

	// First matching job row wins; the table ordering is the tie-break
	let mut job_type = None;
	'job: for (job, kws) in lexicon.jobs {
		for kw in *kws {
			if phrase_position(&toks, kw).is_some() {
				job_type = Some(job.to_string());
				break 'job;
			}
		}
	}

	// Emergency terms count only without a negation in the 3 tokens before
	let emergency_hit = lexicon.emergency.iter().any(|kw| {
		phrase_position(&toks, kw).map_or(false, |pos| !negated_within(&toks, pos, 3))
	});
	let intensified = INTENSIFIERS
		.iter()
		.any(|kw| phrase_position(&toks, kw).is_some());

	let (urgency_hint, urgency_confidence) = if emergency_hit {
		(Urgency::Emergency, 0.8)
	} else if intensified {
		(Urgency::Urgent, 0.6)
	} else {
		(Urgency::Normal, 0.5)
	};

	let address_text = ADDRESS
		.find(message)
		.map(|m| m.as_str().trim().to_string());

	Extraction {
		job_confidence: if job_type.is_some() {
			FALLBACK_JOB_CONFIDENCE
		} else {
			0.0
		},
		job_type,
		urgency_hint,
		urgency_confidence,
		address_text,
		confirmation,
	}
}

/// Extract a typed reading of the newest message. LLM first, deterministic
/// rules when the model is unavailable or answers with an unusable shape.
/// The caller never learns which path ran.
pub async fn extract(
	message: &str,
	history: &[ConversationTurn],
	trade: Trade,
	providers: &ProviderSet,
	breakers: &BreakerRegistry,
	diagnostics: &mut Vec<String>,
) -> Extraction {
	if let Some(llm) = providers.llm.as_ref() {
		let prompt = format!(
			include_str!("prompts/extract.md"),
			trade = trade,
			history = render_history(history),
			message = message
		);

		let response = mediator::guarded(&breakers.llm, "llm", LLM_DEADLINE_MS, || {
			let llm: &dyn LlmProvider = llm.as_ref();
			let prompt = prompt.clone();
			async move { llm.complete(&prompt).await }
		})
		.await;

		match response {
			Ok(text) => match parse_llm_response(&text) {
				Some(extraction) => return extraction,
				None => {
					debug!("llm returned an unusable extraction, using fallback rules");
					diagnostics.push(String::from("nlu: model output unusable, rules applied"));
				}
			},
			Err(err) => {
				diagnostics.push(format!("nlu: model unavailable ({err}), rules applied"));
			}
		}
	}

	fallback_extract(message, trade)
}
