//! Exponential backoff with jitter, adapted from the fast xorshift64 PRNG
//! pattern used for session reconnect backoff elsewhere in this codebase.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

pub struct BackoffCalculator {
    rng_state: AtomicU64,
}

impl BackoffCalculator {
    pub fn new() -> Self {
        let seed = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0x9E3779B97F4A7C15)
            | 1;
        Self { rng_state: AtomicU64::new(seed) }
    }

    /// `delay = min(max_ms, base_ms * 2^(attempt-1))`, jittered by ±`jitter_factor`
    /// and never below `base_ms` (spec §4.5).
    pub fn next_delay(&self, attempt: u32, base_ms: u64, max_ms: u64, jitter_factor: f64) -> Duration {
        let exponent = attempt.saturating_sub(1).min(20);
        let base = (base_ms as f64) * 2f64.powi(exponent as i32);
        let capped = base.min(max_ms as f64);

        let jitter_range = capped * jitter_factor;
        let r = self.next_random();
        let jitter = (r * 2.0 - 1.0) * jitter_range;
        let final_ms = (capped + jitter).max(base_ms as f64);

        Duration::from_millis(final_ms as u64)
    }

    /// Fast PRNG for jitter (xorshift64), lock-free via atomic CAS.
    fn next_random(&self) -> f64 {
        loop {
            let current = self.rng_state.load(Ordering::Relaxed);
            let mut x = current;
            x ^= x << 13;
            x ^= x >> 7;
            x ^= x << 17;
            if self
                .rng_state
                .compare_exchange(current, x, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                return (x as f64) / (u64::MAX as f64);
            }
        }
    }
}

impl Default for BackoffCalculator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_with_attempt_and_respects_cap() {
        let calc = BackoffCalculator::new();
        let d1 = calc.next_delay(1, 1000, 30_000, 0.0);
        let d2 = calc.next_delay(2, 1000, 30_000, 0.0);
        assert_eq!(d1.as_millis(), 1000);
        assert_eq!(d2.as_millis(), 2000);

        let capped = calc.next_delay(10, 1000, 30_000, 0.0);
        assert_eq!(capped.as_millis(), 30_000);
    }

    #[test]
    fn jitter_stays_within_bound_and_above_base() {
        let calc = BackoffCalculator::new();
        for attempt in 1..8 {
            let d = calc.next_delay(attempt, 1000, 30_000, 0.2);
            assert!(d.as_millis() >= 1000);
            assert!(d.as_millis() <= 30_000 + (30_000 / 5));
        }
    }
}
