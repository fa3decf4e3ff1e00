//! Per-day ledger entry and its derived figures.

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::types::DayStatus;

/// One calendar day of a trip. Its position in the engine's ledger is its
/// identity; `raw_expense` keeps "never entered" (`None`) apart from an
/// explicit zero.
#[derive(Debug, Clone, PartialEq)]
pub struct DayLedger {
    pub date: NaiveDate,
    pub raw_expense: Option<Decimal>,
}

impl DayLedger {
    pub fn new(date: NaiveDate, raw_expense: Option<Decimal>) -> Self {
        Self { date, raw_expense }
    }

    /// Amount counted for this day: the entry, or zero if never entered.
    pub fn effective_expense(&self) -> Decimal {
        self.raw_expense.unwrap_or(Decimal::ZERO)
    }

    pub fn expense_entered(&self) -> bool {
        self.raw_expense.is_some()
    }

    /// Recorded spending strictly above zero.
    pub fn positive_expense(&self) -> Option<Decimal> {
        self.raw_expense.filter(|e| *e > Decimal::ZERO)
    }

    pub fn remaining_for_day(&self, allowance: Decimal) -> Decimal {
        allowance.saturating_sub(self.effective_expense())
    }

    /// Over/under classification against the day's allowance. Days with no
    /// entry or a zero entry stay neutral.
    pub fn classify(&self, allowance: Decimal) -> DayStatus {
        if self.positive_expense().is_none() {
            return DayStatus::Neutral;
        }
        let remaining = self.remaining_for_day(allowance);
        if remaining < Decimal::ZERO {
            DayStatus::Over
        } else if remaining.is_zero() {
            DayStatus::On
        } else {
            DayStatus::Under
        }
    }

    /// This day's share of the cumulative budget difference.
    pub fn budget_difference(&self, allowance: Decimal) -> Decimal {
        self.positive_expense()
            .map(|spent| spent.saturating_sub(allowance))
            .unwrap_or(Decimal::ZERO)
    }
}
