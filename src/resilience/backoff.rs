//! Exponential backoff with optional jitter.

use rand::Rng;
use std::time::Duration;

/// Delay to wait after the `attempt`-th failed attempt.
///
/// `initial × multiplier^(attempt − 1)`, capped at `max`. With `jitter`, up to 10%
/// of the capped delay is added on top.
pub fn calculate_backoff(
    attempt: u32,
    initial: Duration,
    multiplier: f64,
    max: Duration,
    jitter: bool,
) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
    let delay_ms = initial.as_millis() as f64 * multiplier.powi(exponent);
    let capped_ms = delay_ms.min(max.as_millis() as f64) as u64;

    let jitter_range = capped_ms / 10;
    let jitter_ms = if jitter && jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped_ms + jitter_ms)
}
