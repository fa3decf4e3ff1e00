//! Budget engine: owns one trip's ledger and derives snapshots from it.
//!
//! The engine is synchronous and does no I/O. Callers mutate a single day
//! (or the total budget) in response to user input and pull a fresh
//! [`TripSnapshot`] afterwards; persisting that snapshot is someone else's
//! job.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use super::ledger::DayLedger;
use super::snapshot::TripSnapshot;
use crate::trip::TripRecord;
use crate::types::{parse_trip_date, TripError};

// ---------------------------------------------------------------------------
// Trip metadata
// ---------------------------------------------------------------------------

/// Date range and budget of one trip.
#[derive(Debug, Clone, PartialEq)]
pub struct TripMetadata {
    pub start_date: NaiveDate,
    /// Inclusive.
    pub end_date: NaiveDate,
    pub total_budget: Decimal,
}

impl TripMetadata {
    pub fn new(start_date: NaiveDate, end_date: NaiveDate, total_budget: Decimal) -> Self {
        Self {
            start_date,
            end_date,
            total_budget,
        }
    }

    /// Parse the metadata out of a stored record. Unparsable dates fail.
    pub fn from_record(record: &TripRecord) -> Result<Self, TripError> {
        Ok(Self::new(
            parse_trip_date(&record.start_date)?,
            parse_trip_date(&record.end_date)?,
            record.total_budget,
        ))
    }
}

/// Every calendar day from `start` to `end`, inclusive, ascending.
///
/// Steps whole calendar days, so month and year lengths and daylight-saving
/// changes never skip or repeat a day.
pub fn enumerate_days(start: NaiveDate, end: NaiveDate) -> Result<Vec<NaiveDate>, TripError> {
    if end < start {
        return Err(TripError::InvalidRange { start, end });
    }
    Ok(start.iter_days().take_while(|day| *day <= end).collect())
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct BudgetEngine {
    metadata: TripMetadata,
    days: Vec<DayLedger>,
}

impl BudgetEngine {
    /// Build the ledger for a trip.
    ///
    /// `expenses` is sparse and keyed by day index; indexes past the end of
    /// the trip are ignored.
    pub fn initialize(
        metadata: TripMetadata,
        expenses: &BTreeMap<usize, Decimal>,
    ) -> Result<Self, TripError> {
        let days: Vec<DayLedger> = enumerate_days(metadata.start_date, metadata.end_date)?
            .into_iter()
            .enumerate()
            .map(|(index, date)| DayLedger::new(date, expenses.get(&index).copied()))
            .collect();

        let ignored = expenses.keys().filter(|i| **i >= days.len()).count();
        if ignored > 0 {
            warn!(ignored, days = days.len(), "Expense entries beyond the trip's last day ignored");
        }

        debug!(
            start = %metadata.start_date,
            end = %metadata.end_date,
            days = days.len(),
            total_budget = %metadata.total_budget,
            "Ledger initialised"
        );

        Ok(Self { metadata, days })
    }

    /// Build an engine straight from a stored trip record.
    pub fn from_record(record: &TripRecord) -> Result<Self, TripError> {
        let metadata = TripMetadata::from_record(record)?;
        Self::initialize(metadata, &record.daily_expenses.parsed())
    }

    /// Replace one day's raw expense. Returns `false`, leaving the ledger
    /// untouched, when `index` is out of range.
    pub fn set_day_expense(&mut self, index: usize, raw_expense: Option<Decimal>) -> bool {
        match self.days.get_mut(index) {
            Some(day) => {
                day.raw_expense = raw_expense;
                debug!(day = index, expense = ?raw_expense, "Day expense set");
                true
            }
            None => {
                warn!(day = index, days = self.days.len(), "Ignoring expense edit outside the trip");
                false
            }
        }
    }

    /// Replace the total budget. Allowances follow on the next snapshot;
    /// entered expenses are untouched.
    pub fn set_total_budget(&mut self, total_budget: Decimal) {
        debug!(old = %self.metadata.total_budget, new = %total_budget, "Total budget set");
        self.metadata.total_budget = total_budget;
    }

    /// Freshly derived figures for the current state.
    pub fn snapshot(&self) -> TripSnapshot {
        TripSnapshot::derive(self.metadata.total_budget, &self.days)
    }

    pub fn metadata(&self) -> &TripMetadata {
        &self.metadata
    }

    pub fn days(&self) -> &[DayLedger] {
        &self.days
    }

    pub fn number_of_days(&self) -> usize {
        self.days.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
