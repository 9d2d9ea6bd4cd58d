//! Budget module - spending progress against per-category budgets.
//!
//! # Key Concepts
//! - Budget: spending limit for one category over a recurring period
//! - Progress: spent/remaining/percentage for the current period, recomputed on demand
//! - Status: severity tier derived from the percentage (75/90/100 thresholds)
//! - Alerts: threshold crossings with a per-budget cooldown

mod alerts;
mod models;
mod progress;

pub use alerts::{AlertKind, AlertMonitor, BudgetAlert, DEFAULT_ALERT_COOLDOWN_HOURS};
pub use models::{Budget, BudgetPeriod, PeriodParseError, Transaction};
pub use progress::{
    in_period, period_start, progress, progress_with_week_start, summarize, BudgetProgress,
    BudgetReport, BudgetStatus, Severity, APPROACHING_LIMIT_PERCENT, CAUTION_PERCENT,
    OVER_BUDGET_PERCENT, WARNING_PERCENT,
};
