//! `budgetly` prints the progress of every active budget and any alerts due.
//!
//! Usage: `budgetly [--category NAME] [--refresh] [--alerts] [--verbose]`

use anyhow::{bail, Context};
use chrono::Local;

use budgetly::api::Snapshot;
use budgetly::budget::{AlertMonitor, Severity};
use budgetly::cache::CacheOptions;
use budgetly::{ApiClient, ClientConfig, Config};

#[derive(Debug, Default)]
struct Args {
    category: Option<String>,
    refresh: bool,
    alerts: bool,
    verbose: bool,
}

impl Args {
    fn parse<I: Iterator<Item = String>>(mut args: I) -> anyhow::Result<Self> {
        let mut parsed = Self::default();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--category" | "-c" => {
                    parsed.category = Some(args.next().context("--category needs a value")?);
                }
                "--refresh" => parsed.refresh = true,
                "--alerts" => parsed.alerts = true,
                "--verbose" | "-v" => parsed.verbose = true,
                other => bail!("Unknown argument: {}", other),
            }
        }
        Ok(parsed)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse(std::env::args().skip(1))?;
    budgetly::init_tracing(if args.verbose { "debug" } else { "info" })?;

    let config = Config::from_env().context("Invalid configuration")?;
    let client = ApiClient::init(ClientConfig::from(&config))?;

    let result = run(&client, &config, &args).await;
    client.teardown().await;
    result
}

async fn run(client: &ApiClient, config: &Config, args: &Args) -> anyhow::Result<()> {
    let snapshot = if args.refresh {
        let options = CacheOptions::refresh();
        let (budgets, transactions) = futures::future::try_join(
            client.fetch_budgets(&options),
            client.fetch_expenses(&options),
        )
        .await?;
        Snapshot {
            budgets,
            transactions,
        }
    } else {
        Snapshot::load(client).await?
    };

    let now = Local::now().naive_local();
    for report in snapshot.reports(now, config.week_start) {
        if let Some(category) = &args.category {
            if !report.budget.category.eq_ignore_ascii_case(category) {
                continue;
            }
        }
        let marker = match report.progress.status.severity() {
            Severity::Error => "!!",
            Severity::Warning => "! ",
            Severity::Caution => "~ ",
            Severity::Success => "  ",
        };
        println!(
            "{} {:<20} {:>10} / {:<10} {:>6}%  {}",
            marker,
            report.budget.category,
            report.progress.spent.round_dp(2).to_string(),
            report.budget.amount.round_dp(2).to_string(),
            report.progress.percentage.round_dp(0).to_string(),
            report.message()
        );
    }

    if args.alerts {
        let mut monitor = AlertMonitor::new().week_start(config.week_start);
        for alert in monitor.check(&snapshot.budgets, &snapshot.transactions, now, true) {
            tracing::warn!(budget_id = %alert.budget_id, kind = ?alert.kind, "{}", alert.message);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> anyhow::Result<Args> {
        Args::parse(args.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_parse_args() {
        let args = parse(&["--category", "Food & Dining", "--alerts"]).unwrap();
        assert_eq!(args.category.as_deref(), Some("Food & Dining"));
        assert!(args.alerts);
        assert!(!args.refresh);
    }

    #[test]
    fn test_parse_args_rejects_unknown() {
        assert!(parse(&["--bogus"]).is_err());
        assert!(parse(&["--category"]).is_err());
    }
}
