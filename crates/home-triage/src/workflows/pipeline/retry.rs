use crate::config::RetryConfig;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Delay before retry number `attempt` (1-based): `base * 2^(attempt-1)`, capped at the
/// configured maximum, plus up to `jitter` of noise.
pub fn backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
    exponential(config, attempt).saturating_add(jitter(config.jitter))
}

fn exponential(config: &RetryConfig, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(31);
    config
        .base_delay
        .checked_mul(1_u32 << exponent)
        .unwrap_or(config.max_delay)
        .min(config.max_delay)
}

fn jitter(max: Duration) -> Duration {
    let max_nanos = max.as_nanos();
    if max_nanos == 0 {
        return Duration::ZERO;
    }
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_nanos(0))
        .subsec_nanos();
    let offset = u128::from(nanos) % max_nanos;
    Duration::from_nanos(u64::try_from(offset).unwrap_or(u64::MAX))
}
