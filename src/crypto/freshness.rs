//! Event timestamp replay window.

use crate::clock::Clock;
use crate::LicenseKitError;
use chrono::{DateTime, TimeZone, Utc};

/// Default replay window for webhook events (5 minutes).
pub const DEFAULT_TOLERANCE_SECONDS: i64 = 5 * 60;

/// Integers above this are read as Unix milliseconds rather than seconds.
const MILLIS_THRESHOLD: i64 = 100_000_000_000;

/// Parse an event timestamp.
///
/// Accepts, in order: RFC 3339 (`2025-01-15T12:00:00Z`), RFC 2822
/// (`Wed, 15 Jan 2025 12:00:00 GMT`), and integer Unix time in seconds or
/// milliseconds.
pub fn parse_event_timestamp(raw: &str) -> Result<DateTime<Utc>, LicenseKitError> {
    let raw = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(n) = raw.parse::<i64>() {
        let parsed = if n.abs() >= MILLIS_THRESHOLD {
            Utc.timestamp_millis_opt(n).single()
        } else {
            Utc.timestamp_opt(n, 0).single()
        };
        if let Some(dt) = parsed {
            return Ok(dt);
        }
    }

    Err(LicenseKitError::InvalidPayload(format!(
        "Invalid event timestamp: {}",
        raw
    )))
}

/// Signed age of `timestamp` in whole seconds; negative when it is in the future.
pub fn age_seconds<C: Clock + ?Sized>(timestamp: DateTime<Utc>, clock: &C) -> i64 {
    (clock.now_utc() - timestamp).num_seconds()
}

/// Whether `timestamp` lies within `tolerance_seconds` of now, in either direction.
///
/// The boundary is inclusive and compared at full precision, so an event
/// 300.1s old falls outside a 300s window.
pub fn within_tolerance<C: Clock + ?Sized>(
    timestamp: DateTime<Utc>,
    tolerance_seconds: i64,
    clock: &C,
) -> bool {
    // A window too wide to represent admits everything.
    let Some(millis) = tolerance_seconds.checked_mul(1000) else {
        return tolerance_seconds > 0;
    };
    let tolerance = chrono::Duration::milliseconds(millis);
    let age = clock.now_utc() - timestamp;
    age <= tolerance && -age <= tolerance
}
