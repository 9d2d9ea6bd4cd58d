//! Budget progress aggregation.

use chrono::{Datelike, NaiveDate, NaiveDateTime, Weekday};
use rust_decimal::Decimal;
use serde::Serialize;

use super::models::{Budget, BudgetPeriod, Transaction};

/// Percentage at which spending is flagged for caution.
pub const CAUTION_PERCENT: u32 = 75;
/// Percentage at which the remaining amount is called out.
pub const WARNING_PERCENT: u32 = 90;
/// Default percentage at which an approaching-limit alert is raised.
pub const APPROACHING_LIMIT_PERCENT: u32 = WARNING_PERCENT;
/// Percentage at which the budget counts as exceeded.
pub const OVER_BUDGET_PERCENT: u32 = 100;

/// How urgent a status is, for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Caution,
    Success,
}

/// Status tier of a budget. Tiers do not overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "tier", rename_all = "snake_case")]
pub enum BudgetStatus {
    /// `percentage >= 100`
    OverBudget { overspent: Decimal },
    /// `90 <= percentage < 100`
    Warning { remaining: Decimal },
    /// `75 <= percentage < 90`
    Caution,
    /// `percentage < 75`
    OnTrack,
}

impl BudgetStatus {
    fn from_percentage(percentage: Decimal, remaining: Decimal, overspent: Decimal) -> Self {
        if percentage >= Decimal::from(OVER_BUDGET_PERCENT) {
            Self::OverBudget { overspent }
        } else if percentage >= Decimal::from(WARNING_PERCENT) {
            Self::Warning { remaining }
        } else if percentage >= Decimal::from(CAUTION_PERCENT) {
            Self::Caution
        } else {
            Self::OnTrack
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::OverBudget { .. } => Severity::Error,
            Self::Warning { .. } => Severity::Warning,
            Self::Caution => Severity::Caution,
            Self::OnTrack => Severity::Success,
        }
    }

    /// User-facing message for a budget in `category`.
    pub fn message(&self, category: &str, percentage: Decimal) -> String {
        match self {
            Self::OverBudget { overspent } if overspent.is_zero() => {
                format!("You've used your entire {} budget", category)
            }
            Self::OverBudget { overspent } => {
                format!("Over budget by ${:.2} in {}", overspent, category)
            }
            Self::Warning { remaining } => {
                format!("Only ${:.2} left in your {} budget", remaining, category)
            }
            Self::Caution => format!(
                "{}% of your {} budget used",
                percentage.round_dp(0),
                category
            ),
            Self::OnTrack => format!("{} spending is on track", category),
        }
    }
}

/// Spending against a budget for its current period.
///
/// Derived on every call and never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BudgetProgress {
    pub spent: Decimal,
    /// Negative once the budget is exceeded.
    pub remaining: Decimal,
    pub percentage: Decimal,
    pub is_over_budget: bool,
    /// `max(spent - amount, 0)`
    pub overspent: Decimal,
    pub status: BudgetStatus,
}

/// First day of the period containing `today`.
///
/// Weeks start on `week_start`.
pub fn period_start(period: BudgetPeriod, today: NaiveDate, week_start: Weekday) -> NaiveDate {
    match period {
        BudgetPeriod::Weekly => {
            let offset = (7 + today.weekday().num_days_from_sunday()
                - week_start.num_days_from_sunday())
                % 7;
            today - chrono::Duration::days(i64::from(offset))
        }
        BudgetPeriod::Monthly => today.with_day(1).unwrap_or(today),
        BudgetPeriod::Yearly => today.with_ordinal(1).unwrap_or(today),
    }
}

/// Whether a transaction dated `date` counts toward `period` as of `now`.
///
/// - monthly: same calendar month and year as `now`
/// - weekly: from the start of `now`'s week through `now`
/// - yearly: same calendar year as `now`
pub fn in_period(date: NaiveDate, period: BudgetPeriod, now: NaiveDateTime, week_start: Weekday) -> bool {
    let today = now.date();
    match period {
        BudgetPeriod::Monthly => date.year() == today.year() && date.month() == today.month(),
        BudgetPeriod::Weekly => date >= period_start(period, today, week_start) && date <= today,
        BudgetPeriod::Yearly => date.year() == today.year(),
    }
}

/// Progress of `budget` as of `now`, with weeks starting on Sunday.
pub fn progress(budget: &Budget, transactions: &[Transaction], now: NaiveDateTime) -> BudgetProgress {
    progress_with_week_start(budget, transactions, now, Weekday::Sun)
}

/// Progress of `budget` as of `now`.
///
/// Budgets are expected to have `amount > 0`.
pub fn progress_with_week_start(
    budget: &Budget,
    transactions: &[Transaction],
    now: NaiveDateTime,
    week_start: Weekday,
) -> BudgetProgress {
    let spent: Decimal = transactions
        .iter()
        .filter(|t| t.category == budget.category)
        .filter(|t| in_period(t.date, budget.period, now, week_start))
        .fold(Decimal::ZERO, |total, t| total.saturating_add(t.amount));

    // Arithmetic saturates at the Decimal range instead of panicking.
    let remaining = budget.amount.saturating_sub(spent);
    // A zero limit is fully used by any spending.
    let percentage = spent
        .saturating_mul(Decimal::ONE_HUNDRED)
        .checked_div(budget.amount)
        .unwrap_or(if spent > Decimal::ZERO {
            Decimal::ONE_HUNDRED
        } else {
            Decimal::ZERO
        });
    let overspent = spent.saturating_sub(budget.amount).max(Decimal::ZERO);

    BudgetProgress {
        spent,
        remaining,
        percentage,
        is_over_budget: spent > budget.amount,
        overspent,
        status: BudgetStatus::from_percentage(percentage, remaining, overspent),
    }
}

/// A budget together with its current progress.
#[derive(Debug, Clone, Serialize)]
pub struct BudgetReport<'a> {
    pub budget: &'a Budget,
    pub progress: BudgetProgress,
}

impl BudgetReport<'_> {
    pub fn message(&self) -> String {
        self.progress
            .status
            .message(&self.budget.category, self.progress.percentage)
    }
}

/// Progress for every active budget, in input order.
pub fn summarize<'a>(
    budgets: &'a [Budget],
    transactions: &[Transaction],
    now: NaiveDateTime,
    week_start: Weekday,
) -> Vec<BudgetReport<'a>> {
    budgets
        .iter()
        .filter(|b| b.is_active)
        .map(|budget| BudgetReport {
            budget,
            progress: progress_with_week_start(budget, transactions, now, week_start),
        })
        .collect()
}
