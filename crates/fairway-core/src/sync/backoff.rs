use std::time::Duration;

use rand::Rng;

pub const BASE_BACKOFF: Duration = Duration::from_secs(2);
pub const MAX_BACKOFF: Duration = Duration::from_secs(5 * 60);

/// Delay before retrying after `consecutive_failures` failed cycles.
///
/// Doubles from [`BASE_BACKOFF`] with up to 20% jitter, capped at
/// [`MAX_BACKOFF`].
pub fn backoff_delay(consecutive_failures: u32) -> Duration {
    let base_ms = u64::try_from(BASE_BACKOFF.as_millis()).unwrap_or(u64::MAX);
    let max_ms = u64::try_from(MAX_BACKOFF.as_millis()).unwrap_or(u64::MAX);

    let exp = consecutive_failures.saturating_sub(1).min(16);
    let backoff = base_ms.saturating_mul(1_u64 << exp).min(max_ms);
    let jitter = rand::thread_rng().gen_range(0..=(backoff / 5).max(1));
    Duration::from_millis(backoff.saturating_add(jitter).min(max_ms))
}
