//! Budgetly client core.
//!
//! - [`retry`] runs fallible async operations with exponential backoff.
//! - [`cancel`] groups in-flight operations so they can be aborted together.
//! - [`cache`] keeps API responses in memory with TTL and stale fallback.
//! - [`budget`] turns budgets and expenses into progress, status and alerts.
//! - [`api`] ties these together into a REST client.

pub mod api;
pub mod budget;
pub mod cache;
pub mod cancel;
pub mod config;
pub mod retry;

pub use api::{ApiClient, ApiError, ClientConfig};
pub use config::Config;

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `default_level`.
pub fn init_tracing(default_level: &str) -> anyhow::Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    fmt()
        .compact()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {}", e))
}
