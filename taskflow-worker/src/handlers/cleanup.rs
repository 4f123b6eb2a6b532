//! `cleanup` jobs: purge data of a target older than a cutoff.

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use taskflow::prelude::*;
use thiserror::Error;
use tracing::info;

/// Payload of a `cleanup` job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupPayload {
    /// What to clean, e.g. `sessions` or `uploads`.
    pub target: String,
    /// Age threshold such as `"24h"`, `"90m"` or `"1h30m"`.
    pub older_than: String,
    /// Report what would be removed without removing it.
    #[serde(default)]
    pub dry_run: bool,
}

impl CleanupPayload {
    /// Instant before which data is eligible, measured back from `now`.
    ///
    /// # Errors
    ///
    /// Returns an error if `older_than` does not parse or reaches past the
    /// representable range.
    pub fn cutoff(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>, HandlerError> {
        let age = parse_duration(&self.older_than)
            .map_err(|e| HandlerError::new(format!("invalid duration: {e}")))?;
        TimeDelta::from_std(age)
            .ok()
            .and_then(|age| now.checked_sub_signed(age))
            .ok_or_else(|| HandlerError::new(format!("duration '{}' is too large", self.older_than)))
    }
}

/// Error from [`parse_duration`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DurationError {
    /// Nothing to parse.
    #[error("empty duration")]
    Empty,
    /// Leading `-`.
    #[error("negative duration '{0}'")]
    Negative(String),
    /// A number with no unit after it.
    #[error("missing unit in duration '{0}'")]
    MissingUnit(String),
    /// A unit outside `ns`, `us`, `µs`, `ms`, `s`, `m`, `h`.
    #[error("unknown unit '{unit}' in duration '{input}'")]
    UnknownUnit {
        /// The unit as written.
        unit: String,
        /// The whole input.
        input: String,
    },
    /// Malformed number or out of range.
    #[error("invalid duration '{0}'")]
    Invalid(String),
}

fn unit_nanos(unit: &str) -> Option<u128> {
    Some(match unit {
        "ns" => 1,
        "us" | "µs" | "μs" => 1_000,
        "ms" => 1_000_000,
        "s" => 1_000_000_000,
        "m" => 60 * 1_000_000_000,
        "h" => 60 * 60 * 1_000_000_000,
        _ => return None,
    })
}

/// Parse a duration written as a sequence of decimal numbers with units,
/// such as `"300ms"`, `"1.5h"` or `"2h45m"`. A bare `"0"` is zero.
///
/// # Errors
///
/// Returns [`DurationError`] for empty, negative or malformed input.
pub fn parse_duration(input: &str) -> Result<Duration, DurationError> {
    let s = input.trim();
    let s = s.strip_prefix('+').unwrap_or(s);
    if s.is_empty() {
        return Err(DurationError::Empty);
    }
    if s.starts_with('-') {
        return Err(DurationError::Negative(input.to_string()));
    }
    if s == "0" {
        return Ok(Duration::ZERO);
    }

    let invalid = || DurationError::Invalid(input.to_string());
    let mut total: u128 = 0;
    let mut rest = s;

    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .unwrap_or(rest.len());
        let (number, tail) = rest.split_at(number_len);
        let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
        if whole.is_empty() && fraction.is_empty() {
            return Err(invalid());
        }

        let unit_len = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_len);
        if unit.is_empty() {
            return Err(DurationError::MissingUnit(input.to_string()));
        }
        let scale = unit_nanos(unit).ok_or_else(|| DurationError::UnknownUnit {
            unit: unit.to_string(),
            input: input.to_string(),
        })?;

        let whole: u128 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| invalid())?
        };
        let mut nanos = whole.checked_mul(scale).ok_or_else(invalid)?;

        // Digits past the 18th cannot change the result at nanosecond scale.
        let fraction = &fraction[..fraction.len().min(18)];
        if !fraction.is_empty() {
            let numerator: u128 = fraction.parse().map_err(|_| invalid())?;
            let denominator = 10u128.pow(u32::try_from(fraction.len()).map_err(|_| invalid())?);
            nanos = nanos
                .checked_add(numerator * scale / denominator)
                .ok_or_else(invalid)?;
        }

        total = total.checked_add(nanos).ok_or_else(invalid)?;
        rest = tail;
    }

    u64::try_from(total)
        .map(Duration::from_nanos)
        .map_err(|_| invalid())
}

/// Runs `cleanup` jobs.
#[derive(Debug, Clone, Copy, Default)]
pub struct CleanupHandler;

#[async_trait]
impl Handler for CleanupHandler {
    async fn handle(&self, _ctx: &CancellationToken, job: &Job) -> Result<(), HandlerError> {
        let payload: CleanupPayload = serde_json::from_value(job.payload.clone())?;
        let cutoff = payload.cutoff(Utc::now())?;

        if payload.dry_run {
            info!(resource = %payload.target, %cutoff, "Dry run: would clean entries older than cutoff");
        } else {
            info!(resource = %payload.target, %cutoff, "Cleaning entries older than cutoff");
        }
        Ok(())
    }
}
