//! Sliding-window throttle for the analysis client
//!
//! At most `max_calls` dispatches per window; `acquire` blocks until a
//! slot frees up. Owned by the orchestrator and passed by reference, so
//! a future concurrent redesign shares one window across workers.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

pub struct RateLimiter {
    max_calls: usize,
    window: Duration,
    calls: VecDeque<Instant>,
}

impl RateLimiter {
    pub fn new(max_calls: u32, window: Duration) -> Self {
        Self {
            max_calls: max_calls.max(1) as usize,
            window,
            calls: VecDeque::new(),
        }
    }

    /// Calls per minute, the configuration's native unit.
    pub fn per_minute(max_calls: u32) -> Self {
        Self::new(max_calls, Duration::from_secs(60))
    }

    /// Block until a call slot is free, then claim it.
    pub async fn acquire(&mut self) {
        loop {
            let now = Instant::now();
            let delay = self.delay_until_slot(now);
            if delay.is_zero() {
                self.record(now);
                return;
            }
            tokio::time::sleep(delay).await;
        }
    }

    /// How long a caller must wait at `now` before dispatching.
    fn delay_until_slot(&self, now: Instant) -> Duration {
        let in_window = self
            .calls
            .iter()
            .filter(|t| now.duration_since(**t) < self.window)
            .count();
        if in_window < self.max_calls {
            return Duration::ZERO;
        }

        // Oldest call still inside the window decides when a slot opens.
        self.calls
            .iter()
            .find(|t| now.duration_since(**t) < self.window)
            .map(|oldest| self.window - now.duration_since(*oldest))
            .unwrap_or(Duration::ZERO)
    }

    fn record(&mut self, now: Instant) {
        while let Some(front) = self.calls.front() {
            if now.duration_since(*front) >= self.window {
                self.calls.pop_front();
            } else {
                break;
            }
        }
        self.calls.push_back(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slots_free_until_limit() {
        let mut limiter = RateLimiter::new(2, Duration::from_secs(60));
        let t0 = Instant::now();
        assert_eq!(limiter.delay_until_slot(t0), Duration::ZERO);
        limiter.record(t0);
        assert_eq!(limiter.delay_until_slot(t0), Duration::ZERO);
        limiter.record(t0);
    }

    #[test]
    fn test_third_call_waits_out_the_window() {
        // With 2 calls per 60s issued back to back, the 3rd dispatch must
        // land >= 60s after the 1st.
        let mut limiter = RateLimiter::new(2, Duration::from_secs(60));
        let t0 = Instant::now();
        limiter.record(t0);
        limiter.record(t0 + Duration::from_millis(5));

        let delay = limiter.delay_until_slot(t0 + Duration::from_millis(10));
        let dispatch_offset = Duration::from_millis(10) + delay;
        assert!(dispatch_offset >= Duration::from_secs(60));
    }

    #[test]
    fn test_slot_opens_when_oldest_expires() {
        let mut limiter = RateLimiter::new(1, Duration::from_secs(60));
        let t0 = Instant::now();
        limiter.record(t0);
        assert_eq!(
            limiter.delay_until_slot(t0 + Duration::from_secs(61)),
            Duration::ZERO
        );
    }

    #[test]
    fn test_record_prunes_expired_entries() {
        let mut limiter = RateLimiter::new(2, Duration::from_secs(60));
        let t0 = Instant::now();
        limiter.record(t0);
        limiter.record(t0 + Duration::from_secs(61));
        assert_eq!(limiter.calls.len(), 1);
    }
}
