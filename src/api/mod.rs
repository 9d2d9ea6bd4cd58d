//! HTTP access to the Budgetly REST API.
//!
//! ## Endpoints used
//!
//! - `GET /budgets` - Budgets of the signed-in user
//! - `GET /expenses` - Expenses of the signed-in user
//! - `POST /expenses` - Record an expense
//!
//! GET requests are retried with backoff and may be served from the
//! response cache. Writes are sent once.

mod client;
mod error;

pub use client::{ApiClient, ClientConfig, NewExpense, RequestOptions};
pub use error::ApiError;

use async_trait::async_trait;
use chrono::{NaiveDateTime, Weekday};

use crate::budget::{self, Budget, BudgetReport, Transaction};
use crate::cache::CacheOptions;

/// Anything that can supply budgets and expenses.
#[async_trait]
pub trait BudgetSource: Send + Sync {
    async fn budgets(&self) -> Result<Vec<Budget>, ApiError>;

    async fn expenses(&self) -> Result<Vec<Transaction>, ApiError>;
}

#[async_trait]
impl BudgetSource for ApiClient {
    async fn budgets(&self) -> Result<Vec<Budget>, ApiError> {
        self.fetch_budgets(&CacheOptions::default()).await
    }

    async fn expenses(&self) -> Result<Vec<Transaction>, ApiError> {
        self.fetch_expenses(&CacheOptions::default()).await
    }
}

/// Budgets and expenses fetched together.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub budgets: Vec<Budget>,
    pub transactions: Vec<Transaction>,
}

impl Snapshot {
    /// Fetch both collections concurrently.
    pub async fn load(source: &dyn BudgetSource) -> Result<Self, ApiError> {
        let (budgets, transactions) =
            futures::future::try_join(source.budgets(), source.expenses()).await?;
        tracing::debug!(
            budgets = budgets.len(),
            transactions = transactions.len(),
            "Loaded snapshot"
        );
        Ok(Self {
            budgets,
            transactions,
        })
    }

    pub fn reports(&self, now: NaiveDateTime, week_start: Weekday) -> Vec<BudgetReport<'_>> {
        budget::summarize(&self.budgets, &self.transactions, now, week_start)
    }
}
