//! Exponential backoff with additive jitter.

use std::time::Duration;

use rand::Rng;

/// Upper bound of the jitter, as a fraction of the clamped delay.
pub const JITTER_FRACTION: f64 = 0.3;

/// Delay before retrying after the given (zero-based) attempt.
///
/// `base * 2^attempt`, clamped to `max`, plus a uniform jitter in
/// `[0, 0.3 * clamped)`.
pub fn delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let sample: f64 = rand::thread_rng().gen_range(0.0..1.0);
    delay_with_jitter(attempt, base, max, sample)
}

/// Same as [`delay`] with the random sample supplied by the caller.
///
/// `sample` is expected in `[0, 1)`; values outside are clamped into it.
pub fn delay_with_jitter(attempt: u32, base: Duration, max: Duration, sample: f64) -> Duration {
    let clamped = exponential(attempt, base).min(max);
    let sample = sample.clamp(0.0, 1.0 - f64::EPSILON);
    let jitter_ms = (clamped.as_millis() as f64 * JITTER_FRACTION * sample) as u64;
    clamped + Duration::from_millis(jitter_ms)
}

fn exponential(attempt: u32, base: Duration) -> Duration {
    let base_ms = base.as_millis().min(u64::MAX as u128) as u64;
    let factor = 2u64.saturating_pow(attempt);
    Duration::from_millis(base_ms.saturating_mul(factor))
}
