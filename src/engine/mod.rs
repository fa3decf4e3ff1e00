//! Budget allocation and reconciliation engine.

pub mod ledger;
pub mod snapshot;
pub mod budget;

pub use budget::{enumerate_days, BudgetEngine, TripMetadata};
pub use ledger::DayLedger;
pub use snapshot::{DaySummary, TripSnapshot};
