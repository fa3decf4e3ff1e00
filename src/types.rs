//! Shared types for the trip budget tracker.
//!
//! Identifiers, day/trip classifications, boundary parsing of user-typed
//! amounts and dates, and the domain error type. Everything here is
//! dependency-free with respect to the rest of the crate so the engine,
//! store and session modules can all build on it.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Opaque identifier of a signed-in user, as handed over by the identity
/// provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Key of a trip record within one user's trips.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TripId(String);

impl TripId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh random key for a newly created trip.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TripId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl fmt::Display for TripId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Classifications
// ---------------------------------------------------------------------------

/// Per-day classification used for presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DayStatus {
    /// Nothing spent yet (no entry, or an explicit zero).
    Neutral,
    /// Spent less than the day's allowance.
    Under,
    /// Spent exactly the day's allowance.
    On,
    /// Spent more than the day's allowance.
    Over,
}

impl fmt::Display for DayStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DayStatus::Neutral => write!(f, "neutral"),
            DayStatus::Under => write!(f, "under"),
            DayStatus::On => write!(f, "on"),
            DayStatus::Over => write!(f, "over"),
        }
    }
}

/// Whole-trip signal derived from the cumulative budget difference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BudgetStatus {
    /// The trip has no days; nothing to compare against.
    NoDays,
    Under,
    OnTrack,
    Over,
}

impl BudgetStatus {
    /// Classify a cumulative difference (`spent - allowance` summed over
    /// days with spending). Positive means over.
    pub fn from_difference(difference: Decimal) -> Self {
        if difference > Decimal::ZERO {
            BudgetStatus::Over
        } else if difference < Decimal::ZERO {
            BudgetStatus::Under
        } else {
            BudgetStatus::OnTrack
        }
    }
}

impl fmt::Display for BudgetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BudgetStatus::NoDays => write!(f, "no days in trip"),
            BudgetStatus::Under => write!(f, "under budget"),
            BudgetStatus::OnTrack => write!(f, "on track"),
            BudgetStatus::Over => write!(f, "over budget"),
        }
    }
}

// ---------------------------------------------------------------------------
// Boundary parsing
// ---------------------------------------------------------------------------

/// Date layouts with a time component that stored date strings have been
/// seen to carry. Only the calendar date is kept.
const DATE_TIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"];

/// Parse a user-typed amount.
///
/// Returns `None` for empty, unparsable or negative text. Plain decimals
/// (`"40"`, `" 12.50 "`) and scientific notation (`"1e3"`) are accepted.
pub fn parse_amount(text: &str) -> Option<Decimal> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    let value = Decimal::from_str(text)
        .or_else(|_| Decimal::from_scientific(text))
        .ok()?;
    if value.is_sign_negative() && !value.is_zero() {
        return None;
    }
    Some(value)
}

/// Parse a typed total budget. Anything unusable counts as zero.
pub fn parse_budget(text: &str) -> Decimal {
    parse_amount(text).unwrap_or(Decimal::ZERO)
}

/// Parse a stored trip date into a calendar date.
///
/// `YYYY-MM-DD` is the canonical form. Strings carrying a time of day or an
/// offset are reduced to the calendar date as written, never shifted into
/// another zone, so a stray `T00:00:00` can't move the trip by a day.
pub fn parse_trip_date(text: &str) -> Result<NaiveDate, TripError> {
    let text = text.trim();
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Ok(date);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt.date_naive());
    }
    DATE_TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .map(|dt| dt.date())
        .ok_or_else(|| TripError::InvalidDate(text.to_string()))
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TripError {
    #[error("Invalid date range: end date {end} is before start date {start}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },

    #[error("Invalid date: {0:?}")]
    InvalidDate(String),

    #[error("Invalid trip: {0}")]
    InvalidTrip(String),

    #[error("Trip not found: {0}")]
    TripNotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
