//! Run-duration strings.
//!
//! Accepted form is `<integer><suffix>` with suffix one of `s m h d w M y`
//! (month = 30 days, year = 365 days). A bare integer is milliseconds.

use std::time::Duration;

use regex::Regex;

use crate::error::CoreError;

const SECOND_MS: u64 = 1_000;
const MINUTE_MS: u64 = 60 * SECOND_MS;
const HOUR_MS: u64 = 60 * MINUTE_MS;
const DAY_MS: u64 = 24 * HOUR_MS;

/// Parse a run-duration string such as `24h` or `2d`.
pub fn parse_run_duration(input: &str) -> Result<Duration, CoreError> {
    let invalid = |reason: &str| CoreError::Duration {
        input: input.to_string(),
        reason: reason.to_string(),
    };

    let pattern = Regex::new(r"^(\d+)([smhdwMy]?)$").map_err(|e| invalid(&e.to_string()))?;
    let caps = pattern
        .captures(input.trim())
        .ok_or_else(|| invalid("expected <integer> followed by one of s, m, h, d, w, M, y"))?;

    let value: u64 = caps[1]
        .parse()
        .map_err(|_| invalid("number out of range"))?;
    let unit_ms = match &caps[2] {
        "" => 1,
        "s" => SECOND_MS,
        "m" => MINUTE_MS,
        "h" => HOUR_MS,
        "d" => DAY_MS,
        "w" => 7 * DAY_MS,
        "M" => 30 * DAY_MS,
        "y" => 365 * DAY_MS,
        _ => return Err(invalid("unknown suffix")),
    };

    value
        .checked_mul(unit_ms)
        .map(Duration::from_millis)
        .ok_or_else(|| invalid("duration overflows"))
}

/// Absolute wait budget: `run_duration × intervals`.
pub fn wait_budget(run_duration: Duration, intervals: u32) -> Duration {
    run_duration.saturating_mul(intervals)
}
