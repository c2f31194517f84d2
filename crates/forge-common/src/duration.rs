//! Time-string parsing
//!
//! Descriptors express timeouts as short strings: a number followed by a
//! unit (`s`, `m`, `h`, case-insensitive), or a bare number of seconds.

use std::time::Duration;
use thiserror::Error;

/// Errors from parsing a time string
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TimeStringError {
    /// The string was empty or whitespace
    #[error("time string cannot be empty")]
    Empty,

    /// The string has no leading number or an unknown unit
    #[error("invalid time string '{0}', expected <number>[s|m|h]")]
    Invalid(String),
}

/// Parse a time string such as `"30m"`, `"1h"`, `"45s"` or `"3600"`.
pub fn parse_time_string(input: &str) -> Result<Duration, TimeStringError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(TimeStringError::Empty);
    }

    let split = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (digits, unit) = trimmed.split_at(split);

    let value: u64 = digits
        .parse()
        .map_err(|_| TimeStringError::Invalid(input.to_string()))?;

    let multiplier = match unit.to_ascii_lowercase().as_str() {
        "" | "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        _ => return Err(TimeStringError::Invalid(input.to_string())),
    };

    Ok(Duration::from_secs(value * multiplier))
}

/// Render a duration back into the shortest exact time string.
pub fn format_time_string(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs > 0 && secs % 3600 == 0 {
        format!("{}h", secs / 3600)
    } else if secs > 0 && secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{secs}s")
    }
}
