//! Leaky-bucket arithmetic.
//!
//! These functions take simulated time as plain seconds and never look at a
//! clock. Refill rates are expressed in tokens per simulated minute.

pub const SECONDS_PER_MINUTE: f64 = 60.0;

/// Minutes elapsed between two simulated timestamps, clamped at zero so a
/// clock that steps backwards never drains a bucket.
#[inline]
pub fn elapsed_minutes(last_refill_time: f64, sim_time: f64) -> f64 {
    ((sim_time - last_refill_time) / SECONDS_PER_MINUTE).max(0.0)
}

/// Token balance after `elapsed_minutes` of refill, capped at `capacity`.
///
/// ```
/// use traffic_shaper::admission::bucket::refill;
///
/// assert_eq!(refill(5.0, 2.0, 1.0, 10.0), 7.0);
/// assert_eq!(refill(5.0, 20.0, 1.0, 10.0), 10.0);
/// ```
#[inline]
pub fn refill(tokens: f64, elapsed_minutes: f64, refill_rate: f64, capacity: f64) -> f64 {
    (tokens + elapsed_minutes * refill_rate).min(capacity)
}

#[inline]
pub fn can_consume(tokens: f64) -> bool {
    tokens >= 1.0
}

/// Simulated minute a timestamp falls into.
#[inline]
pub fn minute_index(sim_time: f64) -> i64 {
    (sim_time / SECONDS_PER_MINUTE).floor() as i64
}
