//! Simple jitter utility for polling loops
//!
//! Provides lightweight jitter generation using system time instead of external random crates.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Generate jitter using system time as pseudo-randomness
///
/// Returns a value between 0 and `max_jitter_ms` (inclusive).
///
/// # Examples
/// ```
/// use company_id_resolver::utils::jitter::generate_jitter_ms;
///
/// let jitter = generate_jitter_ms(100);
/// assert!(jitter <= 100);
/// ```
pub fn generate_jitter_ms(max_jitter_ms: u64) -> u64 {
    if max_jitter_ms == 0 {
        return 0;
    }

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    (nanos % (max_jitter_ms as u128 + 1)) as u64
}

/// Base interval plus up to `jitter_percent` percent of it, so that several
/// workers polling the same queue drift apart
pub fn jittered_interval(base: Duration, jitter_percent: u8) -> Duration {
    if jitter_percent == 0 || base.is_zero() {
        return base;
    }
    let base_ms = base.as_millis().min(u64::MAX as u128) as u64;
    let max_jitter = base_ms.saturating_mul(jitter_percent as u64) / 100;
    base + Duration::from_millis(generate_jitter_ms(max_jitter))
}
