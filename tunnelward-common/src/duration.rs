//! Go-style duration strings (`300ms`, `5s`, `1m30s`, `1.5h`, `0`).
//!
//! Operators type these at the control prompt and in config files, so the
//! grammar matches what they already know from other tunnel tooling.

use std::fmt::Write as _;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DurationParseError {
    #[error("invalid duration \"{0}\": empty")]
    Empty(String),

    #[error("invalid duration \"{0}\": negative durations are not allowed")]
    Negative(String),

    #[error("invalid duration \"{0}\": expected a number")]
    InvalidNumber(String),

    #[error("missing unit in duration \"{0}\"")]
    MissingUnit(String),

    #[error("unknown unit \"{unit}\" in duration \"{input}\"")]
    UnknownUnit { unit: String, input: String },

    #[error("invalid duration \"{0}\": overflow")]
    Overflow(String),
}

const NANOS_PER_SEC: u128 = 1_000_000_000;

fn unit_nanos(unit: &str) -> Option<u128> {
    match unit {
        "ns" => Some(1),
        "us" | "µs" | "μs" => Some(1_000),
        "ms" => Some(1_000_000),
        "s" => Some(NANOS_PER_SEC),
        "m" => Some(60 * NANOS_PER_SEC),
        "h" => Some(3_600 * NANOS_PER_SEC),
        _ => None,
    }
}

/// Parse a duration such as `5s`, `250ms` or `1h15m`.
///
/// A bare `0` is accepted; any other number needs a unit.
pub fn parse_duration(input: &str) -> Result<Duration, DurationParseError> {
    let owned = || input.to_string();
    let s = input.strip_prefix('+').unwrap_or(input);
    if s.is_empty() {
        return Err(DurationParseError::Empty(owned()));
    }
    if s.starts_with('-') {
        return Err(DurationParseError::Negative(owned()));
    }
    if s == "0" {
        return Ok(Duration::ZERO);
    }

    let is_digit = |c: char| c.is_ascii_digit();
    let mut rest = s;
    let mut total: u128 = 0;

    while !rest.is_empty() {
        let int_end = rest.find(|c: char| !is_digit(c)).unwrap_or(rest.len());
        let (int_part, after) = rest.split_at(int_end);
        let (frac_part, after) = match after.strip_prefix('.') {
            Some(tail) => tail.split_at(tail.find(|c: char| !is_digit(c)).unwrap_or(tail.len())),
            None => ("", after),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(DurationParseError::InvalidNumber(owned()));
        }

        let unit_end = after
            .find(|c: char| is_digit(c) || c == '.')
            .unwrap_or(after.len());
        let (unit, tail) = after.split_at(unit_end);
        if unit.is_empty() {
            return Err(DurationParseError::MissingUnit(owned()));
        }
        let scale = unit_nanos(unit).ok_or_else(|| DurationParseError::UnknownUnit {
            unit: unit.to_string(),
            input: owned(),
        })?;

        let whole: u128 = if int_part.is_empty() {
            0
        } else {
            int_part
                .parse()
                .map_err(|_| DurationParseError::Overflow(owned()))?
        };
        let mut value = whole
            .checked_mul(scale)
            .ok_or_else(|| DurationParseError::Overflow(owned()))?;

        if !frac_part.is_empty() {
            // Digits past nanosecond precision cannot change the result.
            let digits = &frac_part[..frac_part.len().min(18)];
            let frac: u128 = digits
                .parse()
                .map_err(|_| DurationParseError::InvalidNumber(owned()))?;
            let denom = 10u128.pow(u32::try_from(digits.len()).unwrap_or(18));
            value += frac * scale / denom;
        }

        total = total
            .checked_add(value)
            .ok_or_else(|| DurationParseError::Overflow(owned()))?;
        rest = tail;
    }

    let nanos = u64::try_from(total).map_err(|_| DurationParseError::Overflow(owned()))?;
    Ok(Duration::from_nanos(nanos))
}

/// Render a duration the way [`parse_duration`] reads it (`1m30s`, `250ms`).
pub fn format_duration(d: Duration) -> String {
    let nanos = d.as_nanos();
    if nanos == 0 {
        return "0s".to_string();
    }
    if nanos < 1_000 {
        return format!("{nanos}ns");
    }
    if nanos < 1_000_000 {
        return format!("{}µs", trim_float(nanos as f64 / 1e3));
    }
    if nanos < NANOS_PER_SEC {
        return format!("{}ms", trim_float(nanos as f64 / 1e6));
    }

    let total_secs = d.as_secs();
    let hours = total_secs / 3_600;
    let minutes = (total_secs % 3_600) / 60;
    let secs = (total_secs % 60) as f64 + f64::from(d.subsec_nanos()) / 1e9;

    let mut out = String::new();
    if hours > 0 {
        let _ = write!(out, "{hours}h");
    }
    if hours > 0 || minutes > 0 {
        let _ = write!(out, "{minutes}m");
    }
    let _ = write!(out, "{}s", trim_float(secs));
    out
}

fn trim_float(value: f64) -> String {
    let text = format!("{value:.9}");
    text.trim_end_matches('0').trim_end_matches('.').to_string()
}

/// Serde adapter for `Duration` fields written as Go-style strings.
pub mod as_text {
    use super::{format_duration, parse_duration};
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format_duration(*value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        parse_duration(&text).map_err(serde::de::Error::custom)
    }
}
