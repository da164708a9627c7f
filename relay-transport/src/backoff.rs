//! Reconnect backoff with exponential growth and jitter

use std::time::Duration;

use rand::Rng;

/// Delay before reconnect attempt `attempt` (1-indexed)
///
/// # Formula
/// `delay = min(base * 2^(attempt - 1), max_delay) * (1 ± jitter)`
pub fn reconnect_delay(
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

    #[allow(clippy::cast_precision_loss)]
    let delay = delay as f64;
    let jitter_range = delay * jitter_factor.clamp(0.0, 1.0);
    let jitter = if jitter_range > 0.0 {
        rand::rng().random_range(-jitter_range..=jitter_range)
    } else {
        0.0
    };

    Duration::from_secs_f64((delay + jitter).max(0.0))
}
