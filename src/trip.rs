//! Trip records as stored by the document store.
//!
//! The stored shape is loosely typed: budgets may arrive as numbers or
//! strings, expenses as strings, numbers or nulls, keyed by stringified day
//! index (or as a plain array when the store collapses dense integer keys).
//! Everything is normalised here so the engine only ever sees decimals.

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::types::{parse_amount, parse_budget, parse_trip_date, TripError, TripId};

/// Name shown for a trip stored without one.
pub const DEFAULT_TRIP_NAME: &str = "My Trip";

// ---------------------------------------------------------------------------
// Trip record
// ---------------------------------------------------------------------------

/// One trip, exactly as persisted under `users/{uid}/trips/{tid}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripRecord {
    #[serde(default)]
    pub trip_name: String,
    /// `YYYY-MM-DD`
    pub start_date: String,
    /// `YYYY-MM-DD`, inclusive
    pub end_date: String,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub total_budget: Decimal,
    #[serde(default)]
    pub daily_expenses: DailyExpenses,
}

impl TripRecord {
    /// Trip name, falling back to a default for unnamed trips.
    pub fn display_name(&self) -> &str {
        let name = self.trip_name.trim();
        if name.is_empty() {
            DEFAULT_TRIP_NAME
        } else {
            name
        }
    }

    /// Apply a partial update. Only the budget and the expenses change;
    /// name and dates are never touched.
    pub fn apply(&mut self, update: TripUpdate) {
        self.total_budget = update.total_budget;
        self.daily_expenses = update.daily_expenses;
    }
}

/// Deserialize an amount that may be a number, a numeric string, null or
/// garbage. Anything unusable becomes zero.
fn lenient_amount<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => parse_budget(&n.to_string()),
        Some(Value::String(s)) => parse_budget(&s),
        _ => Decimal::ZERO,
    })
}

// ---------------------------------------------------------------------------
// Daily expenses
// ---------------------------------------------------------------------------

/// Sparse map of day index to the raw expense text the user entered.
///
/// A missing index means "never entered". On save, absent days are left out
/// and an explicit zero is written as `"0"`, so the two stay distinguishable
/// across a round trip.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DailyExpenses(BTreeMap<usize, String>);

impl DailyExpenses {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from already-parsed amounts.
    pub fn from_amounts<I>(amounts: I) -> Self
    where
        I: IntoIterator<Item = (usize, Decimal)>,
    {
        Self(
            amounts
                .into_iter()
                .map(|(day, amount)| (day, amount.to_string()))
                .collect(),
        )
    }

    /// Raw stored text for a day, if any.
    pub fn get(&self, day: usize) -> Option<&str> {
        self.0.get(&day).map(String::as_str)
    }

    /// Set or clear a day's entry.
    pub fn set(&mut self, day: usize, amount: Option<Decimal>) {
        match amount {
            Some(amount) => {
                self.0.insert(day, amount.to_string());
            }
            None => {
                self.0.remove(&day);
            }
        }
    }

    /// Entries whose text parses as an amount. Unparsable text is dropped,
    /// which the engine treats the same as "never entered".
    pub fn parsed(&self) -> BTreeMap<usize, Decimal> {
        self.0
            .iter()
            .filter_map(|(day, text)| parse_amount(text).map(|amount| (*day, amount)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn from_value(value: &Value) -> Self {
        let mut entries = BTreeMap::new();
        match value {
            Value::Object(map) => {
                for (key, entry) in map {
                    let Ok(day) = key.trim().parse::<usize>() else {
                        continue;
                    };
                    if let Some(text) = entry_text(entry) {
                        entries.insert(day, text);
                    }
                }
            }
            Value::Array(items) => {
                for (day, entry) in items.iter().enumerate() {
                    if let Some(text) = entry_text(entry) {
                        entries.insert(day, text);
                    }
                }
            }
            _ => {}
        }
        Self(entries)
    }
}

/// Stored entry text; null and blank strings mean "never entered".
fn entry_text(entry: &Value) -> Option<String> {
    match entry {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl Serialize for DailyExpenses {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|(day, text)| (day.to_string(), text)))
    }
}

impl<'de> Deserialize<'de> for DailyExpenses {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(Self::from_value(&value))
    }
}

// ---------------------------------------------------------------------------
// Partial update and listing
// ---------------------------------------------------------------------------

/// The fields a planner session writes back: budget and expenses only.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TripUpdate {
    pub total_budget: Decimal,
    pub daily_expenses: DailyExpenses,
}

/// One row of a user's trip list.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TripSummary {
    pub id: TripId,
    pub trip_name: String,
    pub start_date: String,
    pub end_date: String,
}

// ---------------------------------------------------------------------------
// Trip creation
// ---------------------------------------------------------------------------

/// Raw input of the "new trip" form.
#[derive(Debug, Clone, Default)]
pub struct NewTrip {
    pub trip_name: String,
    pub start_date: String,
    pub end_date: String,
    pub total_budget: String,
}

impl NewTrip {
    /// Check the form once and produce the record to store.
    pub fn validate(&self) -> Result<TripRecord, TripError> {
        let trip_name = self.trip_name.trim();
        if trip_name.is_empty() {
            return Err(TripError::InvalidTrip("trip name is required".into()));
        }
        let start = parse_trip_date(&self.start_date)?;
        let end = parse_trip_date(&self.end_date)?;
        let total_budget = parse_amount(&self.total_budget).ok_or_else(|| {
            TripError::InvalidTrip("total budget must be a non-negative number".into())
        })?;
        if end < start {
            return Err(TripError::InvalidRange { start, end });
        }

        Ok(TripRecord {
            trip_name: trip_name.to_string(),
            start_date: start.format("%Y-%m-%d").to_string(),
            end_date: end.format("%Y-%m-%d").to_string(),
            total_budget,
            daily_expenses: DailyExpenses::new(),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
