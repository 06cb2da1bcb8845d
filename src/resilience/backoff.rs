//! Exponential backoff with jitter.

use rand::Rng;
use std::time::Duration;

/// Delay before the attempt following `attempt` (1-based):
/// `base * 2^(attempt-1)` capped at `max_ms`, plus uniform jitter in `[0, jitter_ms]`.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64, jitter_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::from_millis(0);
    }

    let exponential_base = 2u64.saturating_pow(attempt - 1);
    let delay_ms = base_ms.saturating_mul(exponential_base);
    let capped_delay = delay_ms.min(max_ms);

    let jitter = if jitter_ms > 0 {
        rand::thread_rng().gen_range(0..=jitter_ms)
    } else {
        0
    };

    Duration::from_millis(capped_delay.saturating_add(jitter))
}
