//! Immutable, fully recomputed view of a trip's budget figures.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;

use super::ledger::DayLedger;
use crate::trip::{DailyExpenses, TripUpdate};
use crate::types::{BudgetStatus, DayStatus};

// ---------------------------------------------------------------------------
// Per-day figures
// ---------------------------------------------------------------------------

/// Display-ready figures for one day.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DaySummary {
    pub index: usize,
    pub date: NaiveDate,
    pub allowance: Decimal,
    /// Allowance minus the effective expense. Equals the full allowance for
    /// days with no entry or a zero entry.
    pub remaining_for_day: Decimal,
    pub expense_entered: bool,
    pub expense: Option<Decimal>,
    pub status: DayStatus,
}

// ---------------------------------------------------------------------------
// Trip snapshot
// ---------------------------------------------------------------------------

/// Per-day figures plus trip totals at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TripSnapshot {
    pub total_budget: Decimal,
    pub number_of_days: usize,
    /// Each day's even share of the budget (zero for a trip with no days).
    pub allowance: Decimal,
    pub per_day: Vec<DaySummary>,
    pub total_expenses: Decimal,
    pub money_remaining: Decimal,
    /// Σ (expense - allowance) over days with a strictly positive expense.
    pub cumulative_budget_difference: Decimal,
    pub budget_status: BudgetStatus,
}

impl TripSnapshot {
    /// Derive every figure from the budget and the ledger.
    pub fn derive(total_budget: Decimal, days: &[DayLedger]) -> Self {
        let number_of_days = days.len();

        if number_of_days == 0 {
            return Self {
                total_budget,
                number_of_days,
                allowance: Decimal::ZERO,
                per_day: Vec::new(),
                total_expenses: Decimal::ZERO,
                money_remaining: total_budget,
                cumulative_budget_difference: Decimal::ZERO,
                budget_status: BudgetStatus::NoDays,
            };
        }

        let allowance = total_budget / Decimal::from(number_of_days);

        let per_day: Vec<DaySummary> = days
            .iter()
            .enumerate()
            .map(|(index, day)| DaySummary {
                index,
                date: day.date,
                allowance,
                remaining_for_day: day.remaining_for_day(allowance),
                expense_entered: day.expense_entered(),
                expense: day.raw_expense,
                status: day.classify(allowance),
            })
            .collect();

        // Totals saturate at the edge of the decimal range instead of
        // overflowing on absurdly large entries.
        let total_expenses = days
            .iter()
            .map(DayLedger::effective_expense)
            .fold(Decimal::ZERO, Decimal::saturating_add);
        let cumulative_budget_difference = days
            .iter()
            .map(|d| d.budget_difference(allowance))
            .fold(Decimal::ZERO, Decimal::saturating_add);

        Self {
            total_budget,
            number_of_days,
            allowance,
            per_day,
            total_expenses,
            money_remaining: total_budget.saturating_sub(total_expenses),
            cumulative_budget_difference,
            budget_status: BudgetStatus::from_difference(cumulative_budget_difference),
        }
    }

    /// Whether total spending has exceeded the whole trip budget.
    pub fn is_overspent(&self) -> bool {
        self.money_remaining < Decimal::ZERO
    }

    pub fn day(&self, index: usize) -> Option<&DaySummary> {
        self.per_day.get(index)
    }

    /// The partial record update that persists this snapshot.
    pub fn to_update(&self) -> TripUpdate {
        TripUpdate {
            total_budget: self.total_budget,
            daily_expenses: DailyExpenses::from_amounts(
                self.per_day
                    .iter()
                    .filter_map(|d| d.expense.map(|amount| (d.index, amount))),
            ),
        }
    }
}

impl fmt::Display for TripSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} days | budget=${:.2} | daily=${:.2} | spent=${:.2} | remaining=${:.2} | difference=${:.2} ({})",
            self.number_of_days,
            self.total_budget,
            self.allowance,
            self.total_expenses,
            self.money_remaining,
            self.cumulative_budget_difference,
            self.budget_status,
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
