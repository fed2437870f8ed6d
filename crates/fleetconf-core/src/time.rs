// crates/fleetconf-core/src/time.rs
// ============================================================================
// Module: fleetconf Time Helpers
// Description: Wall-clock helpers for persisted timestamps.
// Purpose: Keep timestamp encoding consistent across crates.
// Dependencies: time
// ============================================================================

//! ## Overview
//! Rows store unix milliseconds. The LKG cache file carries RFC 3339 text.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns the current unix time in milliseconds.
#[must_use]
pub fn unix_millis() -> i64 {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    i64::try_from(now.as_millis()).unwrap_or(i64::MAX)
}

/// Returns the current UTC time formatted as RFC 3339.
#[must_use]
pub fn rfc3339_now() -> String {
    OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_else(|_| unix_millis().to_string())
}

/// Returns true when `value` parses as an RFC 3339 timestamp.
#[must_use]
pub fn is_rfc3339(value: &str) -> bool {
    OffsetDateTime::parse(value, &Rfc3339).is_ok()
}
