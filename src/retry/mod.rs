//! Retry module - bounded retries with exponential backoff.
//!
//! # Key Concepts
//! - Backoff: exponential delay with jitter between attempts
//! - Policy: named presets bounding attempts and delays
//! - Classification: which failures are worth another attempt
//! - Observer: retry events for logging or telemetry

mod backoff;
mod classify;
mod executor;
mod policy;

pub use backoff::{delay, delay_with_jitter, JITTER_FRACTION};
pub use classify::{classify_status, Classify, ErrorClass, RETRYABLE_STATUSES};
pub use executor::{
    execute, execute_observed, NoopObserver, RetryEvent, RetryObserver, TracingObserver,
};
pub use policy::{PolicyParseError, RetryPolicy};
