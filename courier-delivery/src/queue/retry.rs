//! Exponential backoff with optional jitter

use std::time::Duration;

use rand::Rng;

/// Delay before the next attempt of an item that has failed `attempt` times.
///
/// # Formula
/// `delay = min(base * 2^(attempt - 1), max_delay) * (1 ± jitter)`
///
/// # Arguments
/// * `attempt` - Failed attempts so far (1-indexed; 0 is treated as 1)
/// * `base_delay_secs` - Delay after the first failure
/// * `max_delay_secs` - Upper bound before jitter
/// * `jitter_factor` - Jitter factor (e.g., 0.2 for ±20%)
pub fn backoff_delay(
    attempt: u32,
    base_delay_secs: u64,
    max_delay_secs: u64,
    jitter_factor: f64,
) -> Duration {
    let exponent = attempt.saturating_sub(1);
    let delay = if exponent >= 63 {
        max_delay_secs
    } else {
        let multiplier = 1u64 << exponent;
        base_delay_secs
            .saturating_mul(multiplier)
            .min(max_delay_secs)
    };

    if jitter_factor <= 0.0 || delay == 0 {
        return Duration::from_secs(delay);
    }

    #[allow(clippy::cast_precision_loss)]
    let delay = delay as f64;
    let jitter_range = delay * jitter_factor;
    let jitter: f64 = rand::rng().random_range(-jitter_range..=jitter_range);

    Duration::from_secs_f64((delay + jitter).max(0.0))
}
