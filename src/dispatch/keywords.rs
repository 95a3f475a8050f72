/*
 * src/dispatch/keywords.rs
 *
 * Per-trade keyword lexicons for the deterministic NLU path
 *
 * Purpose:
 *   Ordered job-type tables (first match wins) and emergency vocabularies
 */

use crate::http_models::profile::Trade;

/// One trade's vocabulary. Job rows are checked top to bottom and the first
/// keyword hit wins, so specific appliances sit above generic symptoms.
pub struct TradeLexicon {
	pub jobs: &'static [(&'static str, &'static [&'static str])],
	pub emergency: &'static [&'static str],
}

// Ordering: named fixtures/appliances first, then failure modes, then the
// generic symptom rows that would otherwise shadow them.
static PLUMBING: TradeLexicon = TradeLexicon {
	jobs: &[
		("water_heater", &["water heater", "hot water"]),
		("garbage_disposal", &["garbage disposal", "disposal"]),
		("sump_pump", &["sump pump", "sump"]),
		("toilet", &["toilet"]),
		("faucet", &["faucet", "tap", "dripping"]),
		("burst_pipe", &["burst", "pipe"]),
		("drain_clog", &["drain", "clog", "clogged", "backed up"]),
		("leak", &["leak", "leaking", "wet", "water damage"]),
	],
	emergency: &[
		"burst",
		"flood",
		"flooding",
		"overflow",
		"overflowing",
		"gushing",
		"sewage",
		"no water",
	],
};

static ELECTRICAL: TradeLexicon = TradeLexicon {
	jobs: &[
		("panel", &["panel", "breaker box", "fuse box"]),
		("breaker", &["breaker", "tripped", "trips"]),
		("outlet", &["outlet", "socket", "receptacle"]),
		("lighting", &["light", "fixture", "ceiling fan"]),
		("wiring", &["wiring", "wire", "rewire"]),
		("generator", &["generator"]),
	],
	emergency: &[
		"sparks",
		"sparking",
		"burning smell",
		"smoke",
		"shock",
		"shocked",
		"exposed wire",
		"power out",
	],
};

static HVAC: TradeLexicon = TradeLexicon {
	jobs: &[
		("thermostat", &["thermostat"]),
		("no_cooling", &["air conditioning", "air conditioner", "a/c", "ac", "cooling"]),
		("no_heat", &["furnace", "heater", "no heat", "heating"]),
		("ductwork", &["duct", "vents", "airflow"]),
		("refrigerant_leak", &["refrigerant", "freon"]),
	],
	emergency: &[
		"gas smell",
		"gas leak",
		"smell gas",
		"carbon monoxide",
		"smoke",
		"sparking",
	],
};

static LOCKSMITH: TradeLexicon = TradeLexicon {
	jobs: &[
		("lockout", &["locked out", "lockout", "lost my key", "lost keys"]),
		("broken_key", &["broken key", "key stuck", "snapped"]),
		("rekey", &["rekey", "re-key", "change the locks"]),
		("lock_replacement", &["replace lock", "new lock", "deadbolt"]),
		("smart_lock", &["smart lock", "keypad"]),
	],
	emergency: &[
		"locked out",
		"break in",
		"break-in",
		"broken into",
		"burglary",
		"kicked in",
	],
};

static GARAGE_DOOR: TradeLexicon = TradeLexicon {
	jobs: &[
		("broken_spring", &["spring"]),
		("opener", &["opener", "remote", "keypad"]),
		("off_track", &["off track", "off the track", "crooked"]),
		("door_stuck", &["stuck", "won't open", "wont open", "won't close", "wont close"]),
		("panel_damage", &["dent", "dented", "panel"]),
	],
	emergency: &[
		"car trapped",
		"trapped",
		"won't close",
		"wont close",
		"fell off",
		"came off",
	],
};

pub fn lexicon(trade: Trade) -> &'static TradeLexicon {
	match trade {
		Trade::Plumbing => &PLUMBING,
		Trade::Electrical => &ELECTRICAL,
		Trade::Hvac => &HVAC,
		Trade::Locksmith => &LOCKSMITH,
		Trade::GarageDoor => &GARAGE_DOOR,
	}
}

/// Words that raise a normal request to urgent when they co-occur with a
/// job symptom.
pub const INTENSIFIERS: &[&str] = &["bad", "badly", "everywhere", "asap", "urgent", "right away"];

/// Negators that disarm an emergency keyword within a 3-token window.
pub const NEGATIONS: &[&str] = &["no", "not", "isn't", "wasn't", "don't", "didn't", "never"];

pub const CONFIRM_YES: &[&str] = &["yes", "y", "ok", "confirm", "book it"];
pub const CONFIRM_NO: &[&str] = &["no", "n", "cancel", "different time"];
