//! Threshold alerts with per-budget cooldown.

use std::collections::HashMap;

use chrono::{NaiveDateTime, Weekday};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::debug;

use super::models::{Budget, BudgetPeriod, Transaction};
use super::progress::{self, BudgetProgress, APPROACHING_LIMIT_PERCENT, OVER_BUDGET_PERCENT};

/// Hours before the same alert fires again for a budget.
pub const DEFAULT_ALERT_COOLDOWN_HOURS: i64 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    ApproachingLimit,
    OverBudget,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BudgetAlert {
    pub budget_id: String,
    pub category: String,
    pub period: BudgetPeriod,
    pub kind: AlertKind,
    pub progress: BudgetProgress,
    pub message: String,
}

/// Remembers which alerts were raised so they are not repeated within the
/// cooldown window.
#[derive(Debug)]
pub struct AlertMonitor {
    cooldown: chrono::Duration,
    week_start: Weekday,
    approaching_percent: u32,
    last_sent: HashMap<(String, AlertKind), NaiveDateTime>,
}

impl AlertMonitor {
    pub fn new() -> Self {
        Self::with_cooldown(chrono::Duration::hours(DEFAULT_ALERT_COOLDOWN_HOURS))
    }

    pub fn with_cooldown(cooldown: chrono::Duration) -> Self {
        Self {
            cooldown,
            week_start: Weekday::Sun,
            approaching_percent: APPROACHING_LIMIT_PERCENT,
            last_sent: HashMap::new(),
        }
    }

    pub fn week_start(mut self, week_start: Weekday) -> Self {
        self.week_start = week_start;
        self
    }

    /// Percentage from which `ApproachingLimit` is raised. Values at or
    /// above the over-budget threshold disable it.
    pub fn approaching_limit_at(mut self, percent: u32) -> Self {
        self.approaching_percent = percent;
        self
    }

    fn kind_for(&self, progress: &BudgetProgress) -> Option<AlertKind> {
        if progress.percentage >= Decimal::from(OVER_BUDGET_PERCENT) {
            Some(AlertKind::OverBudget)
        } else if progress.percentage >= Decimal::from(self.approaching_percent) {
            Some(AlertKind::ApproachingLimit)
        } else {
            None
        }
    }

    /// Alerts due for the active budgets as of `now`.
    ///
    /// `bypass_cooldown` is for checks the user triggered explicitly: every
    /// alert that applies is returned, and the cooldown restarts from `now`.
    pub fn check(
        &mut self,
        budgets: &[Budget],
        transactions: &[Transaction],
        now: NaiveDateTime,
        bypass_cooldown: bool,
    ) -> Vec<BudgetAlert> {
        let mut alerts = Vec::new();

        for report in progress::summarize(budgets, transactions, now, self.week_start) {
            let Some(kind) = self.kind_for(&report.progress) else {
                continue;
            };

            let key = (report.budget.id.clone(), kind);
            let cooling_down = self
                .last_sent
                .get(&key)
                .is_some_and(|sent| now - *sent < self.cooldown);
            if cooling_down && !bypass_cooldown {
                debug!(budget_id = %report.budget.id, ?kind, "Alert suppressed by cooldown");
                continue;
            }

            self.last_sent.insert(key, now);
            alerts.push(BudgetAlert {
                budget_id: report.budget.id.clone(),
                category: report.budget.category.clone(),
                period: report.budget.period,
                kind,
                message: report.message(),
                progress: report.progress,
            });
        }

        alerts
    }

    /// Forget every recorded alert.
    pub fn reset(&mut self) {
        self.last_sent.clear();
    }
}

impl Default for AlertMonitor {
    fn default() -> Self {
        Self::new()
    }
}
